//! Apply a reconciliation plan to the remote index.
//!
//! Removals run first, then uploads. Every item is attempted independently:
//! one failed removal or upload is recorded and the rest carry on. All
//! successful uploads are attached to the index as a single batch so the
//! indexing wait has exactly one thing to poll.

use std::fmt;

use crate::models::{BatchRef, FileRecord, FileSet};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::reconcile::ReconciliationPlan;
use crate::remote::{ignore_not_found, RemoteIndex};
use crate::scanner::Scan;

/// Which step failed for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    Read,
    Upload,
    Attach,
    Remove,
}

impl fmt::Display for ItemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemAction::Read => "read",
            ItemAction::Upload => "upload",
            ItemAction::Attach => "attach",
            ItemAction::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// One item that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub path: String,
    pub action: ItemAction,
    pub reason: String,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.path, self.reason)
    }
}

/// Uploads made for `init`, before an index exists.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: Vec<FileRecord>,
    pub failures: Vec<ItemFailure>,
}

impl UploadReport {
    pub fn file_ids(&self) -> Vec<String> {
        self.uploaded.iter().map(|r| r.file_id.clone()).collect()
    }

    pub fn file_set(&self) -> FileSet {
        self.uploaded
            .iter()
            .map(|r| (r.path.clone(), r.file_id.clone()))
            .collect()
    }
}

/// Result of applying a plan.
#[derive(Debug)]
pub struct AppliedPlan {
    /// Prior records minus successful removals plus attached uploads.
    pub files: FileSet,
    /// Batch to wait on; `None` when nothing was attached.
    pub batch: Option<BatchRef>,
    pub failures: Vec<ItemFailure>,
}

pub struct PlanExecutor<'a> {
    remote: &'a dyn RemoteIndex,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(remote: &'a dyn RemoteIndex) -> Self {
        Self { remote }
    }

    /// Apply `plan` against index `index_id`, starting from the `prior` file set.
    pub fn execute(
        &self,
        index_id: &str,
        plan: &ReconciliationPlan,
        scan: &Scan,
        prior: &FileSet,
        progress: &dyn ProgressReporter,
    ) -> AppliedPlan {
        let mut files = prior.clone();
        let mut failures = Vec::new();

        let total = plan.to_remove.len() as u64;
        for (i, record) in plan.to_remove.iter().enumerate() {
            progress.report(ProgressEvent::Removing {
                n: i as u64 + 1,
                total,
                path: record.path.clone(),
            });
            match ignore_not_found(self.remote.remove_file(index_id, &record.file_id)) {
                Ok(()) => {
                    files.remove(&record.path);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %record.path,
                        file_id = %record.file_id,
                        "remove failed: {}",
                        e
                    );
                    failures.push(ItemFailure {
                        path: record.path.clone(),
                        action: ItemAction::Remove,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let report = self.upload_paths(&plan.to_add, scan, progress);
        failures.extend(report.failures.iter().cloned());

        let batch = if report.uploaded.is_empty() {
            None
        } else {
            match self.remote.attach_files(index_id, &report.file_ids()) {
                Ok(batch) => {
                    files.extend(report.file_set());
                    Some(batch)
                }
                Err(e) => {
                    tracing::warn!("attaching {} files failed: {}", report.uploaded.len(), e);
                    for record in &report.uploaded {
                        let cleanup = self.remote.delete_file(&record.file_id);
                        if let Err(cleanup) = ignore_not_found(cleanup) {
                            tracing::warn!(
                                file_id = %record.file_id,
                                "could not delete orphaned upload: {}",
                                cleanup
                            );
                        }
                        failures.push(ItemFailure {
                            path: record.path.clone(),
                            action: ItemAction::Attach,
                            reason: e.to_string(),
                        });
                    }
                    None
                }
            }
        };

        AppliedPlan {
            files,
            batch,
            failures,
        }
    }

    /// Upload every scanned file, for a freshly created index.
    pub fn upload_all(&self, scan: &Scan, progress: &dyn ProgressReporter) -> UploadReport {
        let paths = scan.relative_paths();
        self.upload_paths(&paths, scan, progress)
    }

    fn upload_paths(
        &self,
        paths: &[String],
        scan: &Scan,
        progress: &dyn ProgressReporter,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        let total = paths.len() as u64;

        for (i, path) in paths.iter().enumerate() {
            progress.report(ProgressEvent::Uploading {
                n: i as u64 + 1,
                total,
                path: path.clone(),
            });

            let bytes = match scan.get(path) {
                Some(file) => std::fs::read(&file.path).map_err(|e| e.to_string()),
                None => Err("not present in scan".to_string()),
            };
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(reason) => {
                    tracing::warn!(path = %path, "skipping unreadable file: {}", reason);
                    report.failures.push(ItemFailure {
                        path: path.clone(),
                        action: ItemAction::Read,
                        reason,
                    });
                    continue;
                }
            };

            match self.remote.upload(path, bytes) {
                Ok(file_id) => {
                    tracing::debug!(path = %path, file_id = %file_id, "uploaded");
                    report.uploaded.push(FileRecord {
                        path: path.clone(),
                        file_id,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path, "upload failed: {}", e);
                    report.failures.push(ItemFailure {
                        path: path.clone(),
                        action: ItemAction::Upload,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore_rules::RuleSet;
    use crate::progress::NoProgress;
    use crate::reconcile::reconcile;
    use crate::remote::memory::MemoryIndex;
    use crate::scanner::scan_folder;
    use crate::state::DEFAULT_STATE_FILE;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn folder(files: &[&str]) -> (TempDir, Scan) {
        let tmp = TempDir::new().unwrap();
        for f in files {
            let path = tmp.path().join(f);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, format!("content of {}", f)).unwrap();
        }
        let scan = scan_folder(tmp.path(), &RuleSet::builtin(DEFAULT_STATE_FILE)).unwrap();
        (tmp, scan)
    }

    /// An index holding `paths`, returned with its file set.
    fn seeded(remote: &MemoryIndex, paths: &[&str]) -> (String, FileSet) {
        let mut files = FileSet::new();
        for p in paths {
            let id = remote.upload(p, p.as_bytes().to_vec()).unwrap();
            files.insert(p.to_string(), id);
        }
        let ids: Vec<String> = files.values().cloned().collect();
        let index = remote.create_index("docs", &ids).unwrap();
        (index, files)
    }

    #[test]
    fn test_upload_all() {
        let (_tmp, scan) = folder(&["a.md", "docs/b.md"]);
        let remote = MemoryIndex::new();
        let report = PlanExecutor::new(&remote).upload_all(&scan, &NoProgress);

        assert!(report.failures.is_empty());
        assert_eq!(
            report.file_set().keys().cloned().collect::<Vec<_>>(),
            vec!["a.md", "docs/b.md"]
        );
        assert_eq!(remote.file_names(), vec!["a.md", "docs/b.md"]);
    }

    #[test]
    fn test_upload_failures_are_itemized() {
        let (_tmp, scan) = folder(&["a.md", "huge.bin", "c.md"]);
        let remote = MemoryIndex::new().reject_upload("huge.bin");
        let report = PlanExecutor::new(&remote).upload_all(&scan, &NoProgress);

        assert_eq!(report.uploaded.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "huge.bin");
        assert_eq!(report.failures[0].action, ItemAction::Upload);
    }

    #[test]
    fn test_execute_adds_and_removes() {
        let remote = MemoryIndex::new();
        let (index, prior) = seeded(&remote, &["a.md", "old.md"]);
        let (_tmp, scan) = folder(&["a.md", "new.md"]);
        let plan = reconcile(&scan.relative_paths(), &prior);

        let applied =
            PlanExecutor::new(&remote).execute(&index, &plan, &scan, &prior, &NoProgress);

        assert!(applied.failures.is_empty());
        assert!(matches!(applied.batch, Some(BatchRef::FileBatch { .. })));
        assert_eq!(
            applied.files.keys().cloned().collect::<Vec<_>>(),
            vec!["a.md", "new.md"]
        );
        assert_eq!(remote.indexed_names(&index), vec!["a.md", "new.md"]);
    }

    #[test]
    fn test_removal_only_submits_no_batch() {
        let remote = MemoryIndex::new();
        let (index, prior) = seeded(&remote, &["a.md", "old.md"]);
        let (_tmp, scan) = folder(&["a.md"]);
        let plan = reconcile(&scan.relative_paths(), &prior);

        let applied =
            PlanExecutor::new(&remote).execute(&index, &plan, &scan, &prior, &NoProgress);

        assert!(applied.batch.is_none());
        assert_eq!(applied.files.len(), 1);
    }

    #[test]
    fn test_already_deleted_remote_file_counts_as_removed() {
        let remote = MemoryIndex::new();
        let (index, mut prior) = seeded(&remote, &["a.md"]);
        prior.insert("gone.md".to_string(), "file-999".to_string());
        let (_tmp, scan) = folder(&["a.md"]);
        let plan = reconcile(&scan.relative_paths(), &prior);

        let applied =
            PlanExecutor::new(&remote).execute(&index, &plan, &scan, &prior, &NoProgress);

        assert!(applied.failures.is_empty());
        assert!(!applied.files.contains_key("gone.md"));
    }

    #[test]
    fn test_failed_removal_keeps_record() {
        let remote = MemoryIndex::new();
        let (index, prior) = seeded(&remote, &["a.md", "old.md", "older.md"]);
        let stuck = prior["old.md"].clone();
        let remote = remote.fail_removal(&stuck);
        let (_tmp, scan) = folder(&["a.md"]);
        let plan = reconcile(&scan.relative_paths(), &prior);

        let applied =
            PlanExecutor::new(&remote).execute(&index, &plan, &scan, &prior, &NoProgress);

        assert_eq!(applied.failures.len(), 1);
        assert_eq!(applied.failures[0].action, ItemAction::Remove);
        assert_eq!(applied.files.get("old.md"), Some(&stuck));
        assert!(!applied.files.contains_key("older.md"));
    }

    #[test]
    fn test_failed_attach_deletes_orphans() {
        let remote = MemoryIndex::new();
        let (index, prior) = seeded(&remote, &["a.md"]);
        let remote = remote.fail_attach();
        let (_tmp, scan) = folder(&["a.md", "b.md", "c.md"]);
        let plan = reconcile(&scan.relative_paths(), &prior);

        let applied =
            PlanExecutor::new(&remote).execute(&index, &plan, &scan, &prior, &NoProgress);

        assert!(applied.batch.is_none());
        assert_eq!(applied.files, prior);
        assert_eq!(applied.failures.len(), 2);
        assert!(applied.failures.iter().all(|f| f.action == ItemAction::Attach));
        assert_eq!(remote.file_names(), vec!["a.md"]);
    }

    #[test]
    fn test_failure_display() {
        let failure = ItemFailure {
            path: "docs/a.md".to_string(),
            action: ItemAction::Upload,
            reason: "too large".to_string(),
        };
        assert_eq!(failure.to_string(), "upload docs/a.md: too large");
    }
}
