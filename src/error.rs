//! Error types shared by the reconciliation engine.
//!
//! Pattern and enumeration problems are recoverable: the offending line or
//! directory entry is skipped and reported. Remote errors carry enough
//! classification for callers to decide between retrying, itemizing the
//! failure, or treating the call as already done.

use std::path::PathBuf;
use thiserror::Error;

/// A single ignore pattern that could not be compiled.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("malformed ignore pattern '{pattern}': {source}")]
    Malformed {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// A directory entry the enumerator had to skip.
#[derive(Error, Debug)]
pub enum ScanIssue {
    #[error("unreadable entry under {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("skipping non UTF-8 path: {}", path.display())]
    NonUtf8Path { path: PathBuf },
}

/// Failure of a call against the remote index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure, rate limiting or a 5xx response.
    #[error("transient remote error: {0}")]
    Transient(String),

    /// The remote rejected the request (4xx other than 404/429).
    #[error("remote rejected request ({status}): {message}")]
    Permanent { status: u16, message: String },

    /// The resource no longer exists remotely.
    #[error("remote resource not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// Reading or writing the persisted index state failed.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to access state file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
