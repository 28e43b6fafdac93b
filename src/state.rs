//! Persisted index state.
//!
//! Records which remote index the folder was synced to and the file set it
//! holds. The state file is read once at the start of a command and written
//! once after the indexing wait ends. Writes go to a sibling temporary file
//! that is then renamed over the target, so a reader sees either the previous
//! state or the new one, never a partial file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::models::FileSet;

/// Default state file name, created in the working directory.
pub const DEFAULT_STATE_FILE: &str = ".agentic_search_config.json";

/// What the local side knows about the remote index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexState {
    #[serde(rename = "vector_store_id")]
    pub index_id: String,
    /// Absolute path of the folder last synced.
    pub folder: PathBuf,
    #[serde(rename = "file_id_map", default)]
    pub files: FileSet,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl IndexState {
    pub fn new(index_id: impl Into<String>, folder: impl Into<PathBuf>, files: FileSet) -> Self {
        Self {
            index_id: index_id.into(),
            folder: folder.into(),
            files,
            updated_at: Utc::now(),
        }
    }
}

/// Load the state at `path`; `Ok(None)` when no state file exists.
pub fn load_state(path: &Path) -> Result<Option<IndexState>, StateError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StateError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Replace the state at `path` in one atomic rename.
pub fn save_state(path: &Path, state: &IndexState) -> Result<(), StateError> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let bytes = serde_json::to_vec_pretty(state).map_err(|source| StateError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

/// Delete the state file; a missing file is not an error.
pub fn remove_state(path: &Path) -> Result<(), StateError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
