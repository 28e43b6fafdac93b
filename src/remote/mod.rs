//! Remote index abstraction.
//!
//! The [`RemoteIndex`] trait covers every call the engine makes against the
//! document-indexing service: uploading file content, grouping uploaded
//! files into an index, polling indexing progress and removing files. It is
//! passed explicitly to the plan executor and the indexing wait, so tests can
//! substitute [`memory::MemoryIndex`] for the real client.
//!
//! Implementations classify failures as [`RemoteError::Transient`],
//! [`RemoteError::Permanent`] or [`RemoteError::NotFound`]. Removal calls
//! treat `NotFound` as success.

pub mod memory;
pub mod openai;

use crate::error::RemoteError;
use crate::models::{BatchRef, BatchStatus, IndexInfo};

/// Operations against the remote document index.
pub trait RemoteIndex {
    /// Upload one file's content and return its remote file id.
    ///
    /// `name` is the file's relative path in the scanned folder.
    fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String, RemoteError>;

    /// Create a new index holding `file_ids` and return its id.
    fn create_index(&self, name: &str, file_ids: &[String]) -> Result<String, RemoteError>;

    /// Attach already uploaded files to an existing index as one batch.
    fn attach_files(&self, index_id: &str, file_ids: &[String]) -> Result<BatchRef, RemoteError>;

    /// Current indexing progress of a submitted batch.
    fn batch_status(&self, batch: &BatchRef) -> Result<BatchStatus, RemoteError>;

    /// Detach a file from the index and delete its content.
    fn remove_file(&self, index_id: &str, file_id: &str) -> Result<(), RemoteError>;

    /// Delete an uploaded file that is not (or no longer) attached.
    fn delete_file(&self, file_id: &str) -> Result<(), RemoteError>;

    /// Delete the whole index.
    fn delete_index(&self, index_id: &str) -> Result<(), RemoteError>;

    /// Status and usage of an index.
    fn index_info(&self, index_id: &str) -> Result<IndexInfo, RemoteError>;
}

impl<T: RemoteIndex + ?Sized> RemoteIndex for &T {
    fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String, RemoteError> {
        (**self).upload(name, bytes)
    }
    fn create_index(&self, name: &str, file_ids: &[String]) -> Result<String, RemoteError> {
        (**self).create_index(name, file_ids)
    }
    fn attach_files(&self, index_id: &str, file_ids: &[String]) -> Result<BatchRef, RemoteError> {
        (**self).attach_files(index_id, file_ids)
    }
    fn batch_status(&self, batch: &BatchRef) -> Result<BatchStatus, RemoteError> {
        (**self).batch_status(batch)
    }
    fn remove_file(&self, index_id: &str, file_id: &str) -> Result<(), RemoteError> {
        (**self).remove_file(index_id, file_id)
    }
    fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        (**self).delete_file(file_id)
    }
    fn delete_index(&self, index_id: &str) -> Result<(), RemoteError> {
        (**self).delete_index(index_id)
    }
    fn index_info(&self, index_id: &str) -> Result<IndexInfo, RemoteError> {
        (**self).index_info(index_id)
    }
}

/// Map `NotFound` to success for idempotent removals.
pub fn ignore_not_found(result: Result<(), RemoteError>) -> Result<(), RemoteError> {
    match result {
        Err(RemoteError::NotFound(_)) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_not_found() {
        assert_eq!(
            ignore_not_found(Err(RemoteError::NotFound("file-1".into()))),
            Ok(())
        );
        assert_eq!(
            ignore_not_found(Err(RemoteError::Transient("reset".into()))),
            Err(RemoteError::Transient("reset".into()))
        );
        assert_eq!(ignore_not_found(Ok(())), Ok(()));
    }
}
