//! [`RemoteIndex`] backed by the OpenAI Files and Vector Stores API.
//!
//! Uses a blocking `reqwest` client. Every request goes through the same
//! retry loop:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - network errors → retry
//! - HTTP 404 → [`RemoteError::NotFound`], no retry
//! - other HTTP 4xx → [`RemoteError::Permanent`], no retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Once retries are exhausted the last transient error is returned.

use anyhow::{bail, Result};
use reqwest::blocking::{multipart, Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::models::{BatchRef, BatchStatus, IndexInfo};

use super::{ignore_not_found, RemoteIndex};

/// Page size used when listing failed files of a batch.
const FAILED_LIST_LIMIT: u32 = 100;

pub struct OpenAiIndex {
    client: Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAiIndex {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key variable named by
    /// `remote.api_key_env` is not set, or the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request built by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt since request bodies are consumed.
    fn send<F>(&self, what: &str, build: F) -> Result<Value, RemoteError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying {}", what);
                std::thread::sleep(delay);
            }

            let resp = build(&self.client)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("OpenAI-Beta", "assistants=v2")
                .send();

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().map_err(|e| {
                            RemoteError::Transient(format!("{}: invalid response body: {}", what, e))
                        });
                    }

                    let body_text = response.text().unwrap_or_default();
                    let error = classify_status(status.as_u16(), what, &body_text);
                    if !error.is_transient() {
                        return Err(error);
                    }
                    last_err = Some(error);
                }
                Err(e) => {
                    last_err = Some(RemoteError::Transient(format!("{}: {}", what, e)));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RemoteError::Transient(format!("{} failed after retries", what))))
    }

    fn list_failed(&self, path: &str) -> Vec<String> {
        let url = self.url(&format!("{}?filter=failed&limit={}", path, FAILED_LIST_LIMIT));
        match self.send("list failed files", |c| c.get(&url)) {
            Ok(json) => parse_id_list(&json),
            Err(e) => {
                tracing::debug!("could not list failed files: {}", e);
                Vec::new()
            }
        }
    }
}

impl RemoteIndex for OpenAiIndex {
    fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String, RemoteError> {
        let file_name = name.rsplit('/').next().unwrap_or(name).to_string();
        let url = self.url("files");
        let json = self.send("upload file", |c| {
            let part = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
            let form = multipart::Form::new()
                .text("purpose", "assistants")
                .part("file", part);
            c.post(&url).multipart(form)
        })?;
        parse_id(&json, "upload file")
    }

    fn create_index(&self, name: &str, file_ids: &[String]) -> Result<String, RemoteError> {
        let url = self.url("vector_stores");
        let body = serde_json::json!({
            "name": name,
            "file_ids": file_ids,
        });
        let json = self.send("create vector store", |c| c.post(&url).json(&body))?;
        parse_id(&json, "create vector store")
    }

    fn attach_files(&self, index_id: &str, file_ids: &[String]) -> Result<BatchRef, RemoteError> {
        let url = self.url(&format!("vector_stores/{}/file_batches", index_id));
        let body = serde_json::json!({ "file_ids": file_ids });
        let json = self.send("create file batch", |c| c.post(&url).json(&body))?;
        Ok(BatchRef::FileBatch {
            index_id: index_id.to_string(),
            batch_id: parse_id(&json, "create file batch")?,
        })
    }

    fn batch_status(&self, batch: &BatchRef) -> Result<BatchStatus, RemoteError> {
        let path = match batch {
            BatchRef::Index { index_id } => format!("vector_stores/{}", index_id),
            BatchRef::FileBatch { index_id, batch_id } => {
                format!("vector_stores/{}/file_batches/{}", index_id, batch_id)
            }
        };
        let url = self.url(&path);
        let json = self.send("poll indexing status", |c| c.get(&url))?;
        let mut status = parse_file_counts(&json);
        if status.failed > 0 {
            status.failed_items = self.list_failed(&format!("{}/files", path));
        }
        Ok(status)
    }

    fn remove_file(&self, index_id: &str, file_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("vector_stores/{}/files/{}", index_id, file_id));
        ignore_not_found(self.send("detach file", |c| c.delete(&url)).map(|_| ()))?;
        self.delete_file(file_id)
    }

    fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("files/{}", file_id));
        ignore_not_found(self.send("delete file", |c| c.delete(&url)).map(|_| ()))
    }

    fn delete_index(&self, index_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("vector_stores/{}", index_id));
        self.send("delete vector store", |c| c.delete(&url)).map(|_| ())
    }

    fn index_info(&self, index_id: &str) -> Result<IndexInfo, RemoteError> {
        let url = self.url(&format!("vector_stores/{}", index_id));
        let json = self.send("retrieve vector store", |c| c.get(&url))?;
        Ok(IndexInfo {
            id: json
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(index_id)
                .to_string(),
            status: json
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            usage_bytes: json.get("usage_bytes").and_then(Value::as_u64).unwrap_or(0),
            counts: parse_file_counts(&json),
        })
    }
}

/// Map a non-success HTTP status to a [`RemoteError`].
fn classify_status(status: u16, what: &str, body: &str) -> RemoteError {
    match status {
        404 => RemoteError::NotFound(format!("{}: {}", what, body)),
        429 | 500..=599 => RemoteError::Transient(format!("{}: HTTP {}: {}", what, status, body)),
        _ => RemoteError::Permanent {
            status,
            message: format!("{}: {}", what, body),
        },
    }
}

fn parse_id(json: &Value, what: &str) -> Result<String, RemoteError> {
    json.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::Transient(format!("{}: response is missing an id", what)))
}

/// Extract `file_counts` from a vector store or file batch object.
fn parse_file_counts(json: &Value) -> BatchStatus {
    let counts = json.get("file_counts");
    let count = |field: &str| {
        counts
            .and_then(|c| c.get(field))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    BatchStatus {
        completed: count("completed"),
        in_progress: count("in_progress"),
        failed: count("failed"),
        failed_items: Vec::new(),
    }
}

fn parse_id_list(json: &Value) -> Vec<String> {
    json.get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(404, "delete file", ""),
            RemoteError::NotFound(_)
        ));
        assert!(classify_status(429, "upload", "slow down").is_transient());
        assert!(classify_status(503, "upload", "").is_transient());
        assert!(matches!(
            classify_status(400, "upload", "bad file"),
            RemoteError::Permanent { status: 400, .. }
        ));
    }

    #[test]
    fn test_parse_file_counts() {
        let json = json!({
            "id": "vs_1",
            "status": "in_progress",
            "file_counts": {"in_progress": 2, "completed": 5, "failed": 1, "cancelled": 0, "total": 8}
        });
        let status = parse_file_counts(&json);
        assert_eq!(status.completed, 5);
        assert_eq!(status.in_progress, 2);
        assert_eq!(status.failed, 1);
        assert!(status.failed_items.is_empty());
    }

    #[test]
    fn test_parse_file_counts_missing() {
        assert_eq!(parse_file_counts(&json!({})), BatchStatus::default());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(&json!({"id": "file-abc"}), "upload").unwrap(), "file-abc");
        assert!(parse_id(&json!({}), "upload").unwrap_err().is_transient());
    }

    #[test]
    fn test_parse_id_list() {
        let json = json!({"data": [{"id": "file-1"}, {"id": "file-2"}, {"object": "x"}]});
        assert_eq!(parse_id_list(&json), vec!["file-1", "file-2"]);
        assert!(parse_id_list(&json!({})).is_empty());
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = RemoteConfig {
            api_key_env: "AGENTIC_SEARCH_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..RemoteConfig::default()
        };
        assert!(OpenAiIndex::new(&config).is_err());
    }
}
