//! In-memory [`RemoteIndex`] implementation for tests and offline runs.
//!
//! Files, indexes and batches live in maps behind a `Mutex`. Indexing
//! progress is simulated: a batch reports every file as in progress for a
//! configurable number of polls, then settles with the files marked through
//! [`MemoryIndex::fail_indexing`] counted as failed.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::error::RemoteError;
use crate::models::{BatchRef, BatchStatus, IndexInfo};

use super::RemoteIndex;

struct StoredFile {
    name: String,
    bytes: Vec<u8>,
}

struct StoredBatch {
    file_ids: Vec<String>,
    polls_remaining: u32,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    files: BTreeMap<String, StoredFile>,
    indexes: BTreeMap<String, Vec<String>>,
    batches: BTreeMap<String, StoredBatch>,
    settle_after: u32,
    rejected_uploads: HashSet<String>,
    failed_indexing: HashSet<String>,
    failing_removals: HashSet<String>,
    fail_attach: bool,
    status_errors: VecDeque<RemoteError>,
    polls: u32,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn check_files(&self, file_ids: &[String]) -> Result<(), RemoteError> {
        match file_ids.iter().find(|id| !self.files.contains_key(*id)) {
            Some(missing) => Err(RemoteError::Permanent {
                status: 400,
                message: format!("unknown file id {}", missing),
            }),
            None => Ok(()),
        }
    }

    fn is_failed(&self, file_id: &str) -> bool {
        self.files
            .get(file_id)
            .map(|f| self.failed_indexing.contains(&f.name))
            .unwrap_or(false)
    }
}

/// In-memory remote index.
pub struct MemoryIndex {
    state: Mutex<MemoryState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Report batches as in progress for `polls` status calls before settling.
    pub fn settle_after(self, polls: u32) -> Self {
        self.state.lock().unwrap().settle_after = polls;
        self
    }

    /// Reject uploads of `name` with a permanent error.
    pub fn reject_upload(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected_uploads
            .insert(name.to_string());
        self
    }

    /// Accept uploads of `name` but report them as failed once indexed.
    pub fn fail_indexing(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failed_indexing
            .insert(name.to_string());
        self
    }

    /// Reject removals of `file_id` with a permanent error.
    pub fn fail_removal(self, file_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_removals
            .insert(file_id.to_string());
        self
    }

    /// Make every `attach_files` call fail with a transient error.
    pub fn fail_attach(self) -> Self {
        self.state.lock().unwrap().fail_attach = true;
        self
    }

    /// Queue an error to be returned by the next status poll.
    pub fn push_status_error(&self, error: RemoteError) {
        self.state.lock().unwrap().status_errors.push_back(error);
    }

    /// Names of every stored file, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.files.values().map(|f| f.name.clone()).collect();
        names.sort();
        names
    }

    /// Names of the files attached to `index_id`, sorted.
    pub fn indexed_names(&self, index_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .indexes
            .get(index_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.files.get(id).map(|f| f.name.clone()))
            .collect();
        names.sort();
        names
    }

    pub fn index_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().indexes.keys().cloned().collect()
    }

    /// Number of `batch_status` calls made so far, failed ones included.
    pub fn poll_count(&self) -> u32 {
        self.state.lock().unwrap().polls
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteIndex for MemoryIndex {
    fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String, RemoteError> {
        let mut state = self.state.lock().unwrap();
        if state.rejected_uploads.contains(name) {
            return Err(RemoteError::Permanent {
                status: 400,
                message: format!("unsupported file {}", name),
            });
        }
        let id = state.next_id("file");
        state.files.insert(
            id.clone(),
            StoredFile {
                name: name.to_string(),
                bytes,
            },
        );
        Ok(id)
    }

    fn create_index(&self, _name: &str, file_ids: &[String]) -> Result<String, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.check_files(file_ids)?;
        let id = state.next_id("vs");
        let polls_remaining = state.settle_after;
        state.indexes.insert(id.clone(), file_ids.to_vec());
        state.batches.insert(
            id.clone(),
            StoredBatch {
                file_ids: file_ids.to_vec(),
                polls_remaining,
            },
        );
        Ok(id)
    }

    fn attach_files(&self, index_id: &str, file_ids: &[String]) -> Result<BatchRef, RemoteError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_attach {
            return Err(RemoteError::Transient("attach failed".to_string()));
        }
        if !state.indexes.contains_key(index_id) {
            return Err(RemoteError::NotFound(index_id.to_string()));
        }
        state.check_files(file_ids)?;
        let batch_id = state.next_id("batch");
        let polls_remaining = state.settle_after;
        if let Some(attached) = state.indexes.get_mut(index_id) {
            attached.extend(file_ids.iter().cloned());
        }
        state.batches.insert(
            batch_id.clone(),
            StoredBatch {
                file_ids: file_ids.to_vec(),
                polls_remaining,
            },
        );
        Ok(BatchRef::FileBatch {
            index_id: index_id.to_string(),
            batch_id,
        })
    }

    fn batch_status(&self, batch: &BatchRef) -> Result<BatchStatus, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        if let Some(error) = state.status_errors.pop_front() {
            return Err(error);
        }

        let key = match batch {
            BatchRef::Index { index_id } => index_id,
            BatchRef::FileBatch { batch_id, .. } => batch_id,
        };
        let stored = state
            .batches
            .get_mut(key)
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))?;

        let total = stored.file_ids.len() as u64;
        if stored.polls_remaining > 0 {
            stored.polls_remaining -= 1;
            return Ok(BatchStatus {
                in_progress: total,
                ..BatchStatus::default()
            });
        }

        let file_ids = stored.file_ids.clone();
        let failed_items: Vec<String> = file_ids
            .into_iter()
            .filter(|id| state.is_failed(id))
            .collect();
        Ok(BatchStatus {
            completed: total - failed_items.len() as u64,
            in_progress: 0,
            failed: failed_items.len() as u64,
            failed_items,
        })
    }

    fn remove_file(&self, index_id: &str, file_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_removals.contains(file_id) {
            return Err(RemoteError::Permanent {
                status: 400,
                message: format!("cannot remove {}", file_id),
            });
        }
        let attached = state
            .indexes
            .get_mut(index_id)
            .ok_or_else(|| RemoteError::NotFound(index_id.to_string()))?;
        let before = attached.len();
        attached.retain(|id| id != file_id);
        let detached = attached.len() != before;
        let deleted = state.files.remove(file_id).is_some();
        if detached || deleted {
            Ok(())
        } else {
            Err(RemoteError::NotFound(file_id.to_string()))
        }
    }

    fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        match state.files.remove(file_id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(file_id.to_string())),
        }
    }

    fn delete_index(&self, index_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        match state.indexes.remove(index_id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(index_id.to_string())),
        }
    }

    fn index_info(&self, index_id: &str) -> Result<IndexInfo, RemoteError> {
        let state = self.state.lock().unwrap();
        let attached = state
            .indexes
            .get(index_id)
            .ok_or_else(|| RemoteError::NotFound(index_id.to_string()))?;

        let mut counts = BatchStatus::default();
        let mut usage_bytes = 0u64;
        for id in attached {
            if let Some(file) = state.files.get(id) {
                usage_bytes += file.bytes.len() as u64;
            }
            if state.is_failed(id) {
                counts.failed += 1;
                counts.failed_items.push(id.clone());
            } else {
                counts.completed += 1;
            }
        }

        Ok(IndexInfo {
            id: index_id.to_string(),
            status: "completed".to_string(),
            usage_bytes,
            counts,
        })
    }
}
