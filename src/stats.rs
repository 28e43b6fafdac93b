//! `list` and `stats`: what is indexed and how the remote sees it.
//!
//! `list` only reads the state file. `stats` also asks the remote for the
//! index's status and usage, giving confidence that syncs are landing.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::remote::RemoteIndex;
use crate::state::{load_state, IndexState};

fn require_state(state_path: &Path) -> Result<IndexState> {
    match load_state(state_path)? {
        Some(state) => Ok(state),
        None => bail!("No index found. Run `agentic-search init <folder>` first."),
    }
}

/// Print the persisted relative paths, numbered.
pub fn run_list(state_path: &Path) -> Result<()> {
    let state = require_state(state_path)?;
    if state.files.is_empty() {
        println!("No documents indexed.");
        return Ok(());
    }
    for (i, path) in state.files.keys().enumerate() {
        println!("{:>4}. {}", i + 1, path);
    }
    Ok(())
}

/// Print local and remote statistics for the index.
pub fn run_stats<R, F>(state_path: &Path, connect: F) -> Result<()>
where
    R: RemoteIndex,
    F: FnOnce() -> Result<R>,
{
    let state = require_state(state_path)?;
    let remote = connect()?;
    let info = remote
        .index_info(&state.index_id)
        .with_context(|| format!("Failed to retrieve index {}", state.index_id))?;

    println!("Agentic Search Index Stats");
    println!("==========================");
    println!();
    println!("  Index:       {}", info.id);
    println!("  Status:      {}", info.status);
    println!("  Usage:       {}", format_bytes(info.usage_bytes));
    println!("  Folder:      {}", state.folder.display());
    println!("  Last sync:   {}", format_relative(state.updated_at, Utc::now()));
    println!();
    println!("  Documents:   {}", state.files.len());
    println!("  Completed:   {}", info.counts.completed);
    println!("  In progress: {}", info.counts.in_progress);
    println!("  Failed:      {}", info.counts.failed);
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" style age of `at`, relative to `now`.
fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - at).num_seconds();
    if delta < 0 {
        return at.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        at.format("%Y-%m-%d %H:%M").to_string()
    }
}
