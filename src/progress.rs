//! Init and sync progress reporting.
//!
//! Reports what is being scanned, uploaded and removed, and how far the remote
//! has got with indexing, so users can follow a long `init` or `sync`.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::models::BatchStatus;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Walking the folder; total unknown.
    Scanning { folder: String },
    /// Uploading file `n` of `total`.
    Uploading { n: u64, total: u64, path: String },
    /// Removing file `n` of `total` from the index.
    Removing { n: u64, total: u64, path: String },
    /// Snapshot taken after one status poll.
    Indexing(BatchStatus),
}

/// Receives progress events. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "uploading  12 / 1,234  docs/guide.md".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Scanning { folder } => format!("scanning {}...\n", folder),
            ProgressEvent::Uploading { n, total, path } => format!(
                "uploading  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                path
            ),
            ProgressEvent::Removing { n, total, path } => format!(
                "removing  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                path
            ),
            ProgressEvent::Indexing(status) => format!(
                "Indexing status: {} completed, {} failed, {} in progress\n",
                format_number(status.completed),
                format_number(status.failed),
                format_number(status.in_progress)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Scanning { folder } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "folder": folder
            }),
            ProgressEvent::Uploading { n, total, path } => serde_json::json!({
                "event": "progress",
                "phase": "uploading",
                "n": n,
                "total": total,
                "path": path
            }),
            ProgressEvent::Removing { n, total, path } => serde_json::json!({
                "event": "progress",
                "phase": "removing",
                "n": n,
                "total": total,
                "path": path
            }),
            ProgressEvent::Indexing(status) => serde_json::json!({
                "event": "progress",
                "phase": "indexing",
                "completed": status.completed,
                "in_progress": status.in_progress,
                "failed": status.failed,
                "failed_items": status.failed_items
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
