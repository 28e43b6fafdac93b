//! Tear down a remote index and forget it locally.

use anyhow::Result;
use std::path::Path;

use crate::prompt::confirm;
use crate::remote::{ignore_not_found, RemoteIndex};
use crate::state::{load_state, remove_state, IndexState};

/// Delete the index and every recorded file.
///
/// Failures are logged and returned as messages; `NotFound` is not a failure.
pub fn remove_index(remote: &dyn RemoteIndex, state: &IndexState) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Err(e) = ignore_not_found(remote.delete_index(&state.index_id)) {
        tracing::warn!(index_id = %state.index_id, "could not delete index: {}", e);
        warnings.push(format!("could not delete index {}: {}", state.index_id, e));
    }

    for (path, file_id) in &state.files {
        if let Err(e) = ignore_not_found(remote.delete_file(file_id)) {
            tracing::warn!(path = %path, file_id = %file_id, "could not delete file: {}", e);
            warnings.push(format!("could not delete {} ({}): {}", path, file_id, e));
        }
    }

    warnings
}

/// `cleanup`: confirm, delete the remote index and files, remove the state file.
pub fn run_cleanup<R, F>(state_path: &Path, assume_yes: bool, connect: F) -> Result<()>
where
    R: RemoteIndex,
    F: FnOnce() -> Result<R>,
{
    let Some(state) = load_state(state_path)? else {
        println!("Nothing to clean up.");
        return Ok(());
    };

    let question = format!(
        "Delete index {} and its {} files?",
        state.index_id,
        state.files.len()
    );
    if !confirm(&question, assume_yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let remote = connect()?;
    let warnings = remove_index(&remote, &state);
    for warning in &warnings {
        eprintln!("Warning: {}", warning);
    }

    remove_state(state_path)?;
    println!("cleanup");
    println!("  index deleted: {}", state.index_id);
    println!("  files deleted: {}", state.files.len());
    if !warnings.is_empty() {
        println!("  warnings: {}", warnings.len());
    }
    println!("ok");
    Ok(())
}
