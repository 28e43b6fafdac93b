//! Core data types shared by the reconciliation engine.
//!
//! These types describe what is known about the remote index: which local
//! paths it holds, under which remote file ids, and how far it has got with
//! indexing them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relative path (slash-separated) to remote file id.
///
/// Iteration order is byte-wise path order, which is also the order the
/// scanner produces, so a file set stored after a sync keeps scan order.
pub type FileSet = BTreeMap<String, String>;

/// One entry of a [`FileSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub file_id: String,
}

/// Progress counts for one submitted batch, as reported by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub completed: u64,
    pub in_progress: u64,
    pub failed: u64,
    /// Remote file ids that failed to index, when the remote lists them.
    #[serde(default)]
    pub failed_items: Vec<String>,
}

impl BatchStatus {
    /// No item is still being processed.
    pub fn is_settled(&self) -> bool {
        self.in_progress == 0
    }
}

/// Handle for polling the indexing progress of submitted files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchRef {
    /// Files submitted while creating the index; progress is the index's.
    Index { index_id: String },
    /// Files attached to an existing index in one batch.
    FileBatch { index_id: String, batch_id: String },
}

/// Summary of a remote index, used by `stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub id: String,
    pub status: String,
    pub usage_bytes: u64,
    pub counts: BatchStatus,
}
