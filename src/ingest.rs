//! `init` and `sync` orchestration.
//!
//! Both commands follow the same flow: resolve ignore rules for the target
//! folder, enumerate it, change the remote index, wait for indexing to reach
//! a terminal state, then persist the resulting file set exactly once.
//!
//! The library entry points ([`init_index`], [`sync_index`]) take the remote
//! explicitly and never prompt or print. The `run_*` functions wrap them with
//! confirmation, output and state persistence for the CLI.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::apply::{ItemFailure, PlanExecutor};
use crate::cleanup::remove_index;
use crate::config::Config;
use crate::ignore_rules;
use crate::models::BatchRef;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::prompt::confirm;
use crate::reconcile::{reconcile, ReconciliationPlan};
use crate::remote::{ignore_not_found, RemoteIndex};
use crate::scanner::{scan_folder, Scan};
use crate::state::{load_state, save_state, IndexState};
use crate::wait::{IndexingWait, WaitConfig, WaitOutcome};

/// Shared inputs of every command.
pub struct Session<'a> {
    pub config: &'a Config,
    pub state_path: &'a Path,
    pub progress: &'a dyn ProgressReporter,
}

/// Flags accepted by `init` and `sync`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides `indexing.timeout_secs`; `0` waits indefinitely.
    pub index_timeout: Option<u64>,
    pub assume_yes: bool,
    pub dry_run: bool,
}

/// Result of one init or sync, ready to be persisted.
#[derive(Debug)]
pub struct IndexRun {
    pub state: IndexState,
    pub failures: Vec<ItemFailure>,
    /// `None` when nothing was submitted for indexing.
    pub outcome: Option<WaitOutcome>,
}

impl IndexRun {
    /// Paths the remote reported as failed to index.
    pub fn failed_paths(&self) -> Vec<String> {
        let Some(status) = self.outcome.as_ref().and_then(WaitOutcome::last_status) else {
            return Vec::new();
        };
        status
            .failed_items
            .iter()
            .map(|id| {
                self.state
                    .files
                    .iter()
                    .find(|(_, file_id)| *file_id == id)
                    .map(|(path, _)| path.clone())
                    .unwrap_or_else(|| id.clone())
            })
            .collect()
    }

    /// Fail for wait outcomes that must end the command with an error.
    pub fn check(&self) -> Result<()> {
        match &self.outcome {
            Some(WaitOutcome::TimedOut { elapsed, .. }) => bail!(
                "Indexing did not finish within {}s. State was saved; run sync again later.",
                elapsed.as_secs()
            ),
            Some(WaitOutcome::FailedFatal { error, .. }) => bail!(
                "Indexing status could not be checked: {}. State was saved; run sync again later.",
                error
            ),
            _ => Ok(()),
        }
    }
}

/// Canonicalize `folder`, resolve its ignore rules and enumerate it.
pub fn scan_target(
    folder: &Path,
    config: &Config,
    progress: &dyn ProgressReporter,
) -> Result<(PathBuf, Scan)> {
    if !folder.is_dir() {
        bail!("Folder '{}' does not exist.", folder.display());
    }
    let folder = folder
        .canonicalize()
        .with_context(|| format!("Failed to resolve folder: {}", folder.display()))?;

    progress.report(ProgressEvent::Scanning {
        folder: folder.display().to_string(),
    });

    let rules = ignore_rules::resolve(&folder, &config.state.file_name());
    let scan = scan_folder(&folder, &rules)?;
    tracing::debug!(
        folder = %folder.display(),
        files = scan.len(),
        patterns = rules.pattern_count(),
        "scan complete"
    );
    Ok((folder, scan))
}

/// Upload every scanned file into a new index and wait for it to be indexed.
pub fn init_index(
    remote: &dyn RemoteIndex,
    config: &Config,
    folder: &Path,
    scan: &Scan,
    wait: WaitConfig,
    progress: &dyn ProgressReporter,
) -> Result<IndexRun> {
    if scan.is_empty() {
        bail!("No files found in '{}'.", folder.display());
    }

    let report = PlanExecutor::new(remote).upload_all(scan, progress);
    if report.uploaded.is_empty() {
        bail!(
            "No files were uploaded ({} failed).",
            report.failures.len()
        );
    }

    let index_id = match remote.create_index(&config.remote.index_name, &report.file_ids()) {
        Ok(id) => id,
        Err(e) => {
            for record in &report.uploaded {
                if let Err(cleanup) = ignore_not_found(remote.delete_file(&record.file_id)) {
                    tracing::warn!(file_id = %record.file_id, "could not delete upload: {}", cleanup);
                }
            }
            return Err(e).context("Failed to create index");
        }
    };
    tracing::debug!(index_id = %index_id, files = report.uploaded.len(), "index created");

    let batch = BatchRef::Index {
        index_id: index_id.clone(),
    };
    let outcome = IndexingWait::new(remote, wait).run(&batch, progress);

    Ok(IndexRun {
        state: IndexState::new(index_id, folder, report.file_set()),
        failures: report.failures,
        outcome: Some(outcome),
    })
}

/// Apply `plan` to the index recorded in `previous` and wait for the batch.
pub fn sync_index(
    remote: &dyn RemoteIndex,
    previous: &IndexState,
    folder: &Path,
    plan: &ReconciliationPlan,
    scan: &Scan,
    wait: WaitConfig,
    progress: &dyn ProgressReporter,
) -> IndexRun {
    let applied = PlanExecutor::new(remote).execute(
        &previous.index_id,
        plan,
        scan,
        &previous.files,
        progress,
    );
    let outcome = applied
        .batch
        .as_ref()
        .map(|batch| IndexingWait::new(remote, wait).run(batch, progress));

    IndexRun {
        state: IndexState::new(previous.index_id.clone(), folder, applied.files),
        failures: applied.failures,
        outcome,
    }
}

/// `init <folder>`.
pub fn run_init<R, F>(session: &Session, folder: &Path, opts: &RunOptions, connect: F) -> Result<()>
where
    R: RemoteIndex,
    F: FnOnce() -> Result<R>,
{
    if !folder.is_dir() {
        bail!("Folder '{}' does not exist.", folder.display());
    }

    let previous = load_state(session.state_path)?;
    if let Some(previous) = &previous {
        let question = format!(
            "An index ({}, {} files) already exists. Delete it and start over?",
            previous.index_id,
            previous.files.len()
        );
        if !confirm(&question, opts.assume_yes)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let (folder, scan) = scan_target(folder, session.config, session.progress)?;
    if scan.is_empty() {
        bail!("No files found in '{}'.", folder.display());
    }

    let remote = connect()?;
    let wait = session.config.indexing.wait_config(opts.index_timeout);
    let run = init_index(
        &remote,
        session.config,
        &folder,
        &scan,
        wait,
        session.progress,
    )?;
    save_state(session.state_path, &run.state)?;

    // The state file names the new index before the old one goes away.
    if let Some(previous) = &previous {
        for warning in remove_index(&remote, previous) {
            eprintln!("Warning: {}", warning);
        }
    }

    println!("init {}", folder.display());
    println!("  files found: {}", scan.len());
    print_skipped(&scan);
    println!("  uploaded: {}", run.state.files.len());
    if let Some(previous) = &previous {
        println!("  replaced index: {}", previous.index_id);
    }
    print_outcome(&run);
    print_failures(&run);
    run.check()?;
    println!("ok");
    Ok(())
}

/// `sync <folder>`.
pub fn run_sync<R, F>(session: &Session, folder: &Path, opts: &RunOptions, connect: F) -> Result<()>
where
    R: RemoteIndex,
    F: FnOnce() -> Result<R>,
{
    let Some(previous) = load_state(session.state_path)? else {
        bail!(
            "No index found ({} is missing). Run `agentic-search init <folder>` first.",
            session.state_path.display()
        );
    };

    let (folder, scan) = scan_target(folder, session.config, session.progress)?;
    if folder != previous.folder {
        tracing::warn!(
            recorded = %previous.folder.display(),
            target = %folder.display(),
            "syncing a different folder than the one recorded in the state file"
        );
    }

    let plan = reconcile(&scan.relative_paths(), &previous.files);
    println!("sync {}{}", folder.display(), if opts.dry_run { " (dry-run)" } else { "" });
    print_skipped(&scan);
    print_plan(&plan);

    if plan.is_empty() {
        println!("No changes needed.");
        return Ok(());
    }
    if opts.dry_run {
        return Ok(());
    }

    let question = format!(
        "Upload {} and remove {} files?",
        plan.to_add.len(),
        plan.to_remove.len()
    );
    if !confirm(&question, opts.assume_yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let remote = connect()?;
    let wait = session.config.indexing.wait_config(opts.index_timeout);
    let run = sync_index(
        &remote,
        &previous,
        &folder,
        &plan,
        &scan,
        wait,
        session.progress,
    );
    save_state(session.state_path, &run.state)?;

    println!("  indexed files: {}", run.state.files.len());
    print_outcome(&run);
    print_failures(&run);
    run.check()?;
    println!("ok");
    Ok(())
}

fn print_skipped(scan: &Scan) {
    if !scan.issues.is_empty() {
        println!("  skipped entries: {}", scan.issues.len());
    }
}

fn print_plan(plan: &ReconciliationPlan) {
    println!("  unchanged: {}", plan.unchanged);
    println!("  to add: {}", plan.to_add.len());
    for path in &plan.to_add {
        println!("    + {}", path);
    }
    println!("  to remove: {}", plan.to_remove.len());
    for record in &plan.to_remove {
        println!("    - {}", record.path);
    }
}

fn print_outcome(run: &IndexRun) {
    let line = match &run.outcome {
        None => "nothing submitted".to_string(),
        Some(WaitOutcome::Settled { status, polls }) => format!(
            "settled after {} poll{} ({} completed, {} failed)",
            polls,
            if *polls == 1 { "" } else { "s" },
            status.completed,
            status.failed
        ),
        Some(WaitOutcome::TimedOut { last, elapsed }) => format!(
            "timed out after {}s ({} still in progress)",
            elapsed.as_secs(),
            last.as_ref().map(|s| s.in_progress).unwrap_or(0)
        ),
        Some(WaitOutcome::FailedFatal { error, .. }) => format!("polling failed: {}", error),
    };
    println!("  indexing: {}", line);
}

fn print_failures(run: &IndexRun) {
    for failure in &run.failures {
        eprintln!("Warning: {}", failure);
    }
    for path in run.failed_paths() {
        eprintln!("Warning: failed to index {}", path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchStatus, FileSet};
    use crate::progress::NoProgress;
    use crate::remote::memory::MemoryIndex;
    use crate::wait::{BackoffSchedule, Deadline, WaitState};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn quick_wait(deadline: Deadline) -> WaitConfig {
        WaitConfig {
            schedule: BackoffSchedule::new(Duration::from_millis(1), Duration::from_millis(1)),
            deadline,
            max_poll_errors: 0,
        }
    }

    fn docs(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for f in files {
            let path = tmp.path().join(f);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, "text").unwrap();
        }
        tmp
    }

    #[test]
    fn test_scan_target_missing_folder() {
        let tmp = TempDir::new().unwrap();
        let err = scan_target(&tmp.path().join("nope"), &Config::default(), &NoProgress)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_init_index_settles() {
        let dir = docs(&["a.md", "b.md"]);
        let config = Config::default();
        let (folder, scan) = scan_target(dir.path(), &config, &NoProgress).unwrap();
        let remote = MemoryIndex::new().settle_after(2);

        let run = init_index(
            &remote,
            &config,
            &folder,
            &scan,
            quick_wait(Deadline::Unlimited),
            &NoProgress,
        )
        .unwrap();

        assert_eq!(run.state.files.len(), 2);
        assert_eq!(
            run.outcome.as_ref().map(WaitOutcome::state),
            Some(WaitState::Settled)
        );
        assert!(run.check().is_ok());
        assert_eq!(remote.poll_count(), 3);
    }

    #[test]
    fn test_init_index_empty_folder() {
        let dir = docs(&[]);
        let config = Config::default();
        let (folder, scan) = scan_target(dir.path(), &config, &NoProgress).unwrap();
        let remote = MemoryIndex::new();

        let err = init_index(
            &remote,
            &config,
            &folder,
            &scan,
            quick_wait(Deadline::Unlimited),
            &NoProgress,
        )
        .unwrap_err();
        assert!(err.to_string().contains("No files found"));
        assert!(remote.index_ids().is_empty());
    }

    #[test]
    fn test_init_index_nothing_uploaded() {
        let dir = docs(&["a.bin"]);
        let config = Config::default();
        let (folder, scan) = scan_target(dir.path(), &config, &NoProgress).unwrap();
        let remote = MemoryIndex::new().reject_upload("a.bin");

        let err = init_index(
            &remote,
            &config,
            &folder,
            &scan,
            quick_wait(Deadline::Unlimited),
            &NoProgress,
        )
        .unwrap_err();
        assert!(err.to_string().contains("No files were uploaded"));
    }

    #[test]
    fn test_timed_out_run_keeps_files_and_fails_check() {
        let dir = docs(&["a.md"]);
        let config = Config::default();
        let (folder, scan) = scan_target(dir.path(), &config, &NoProgress).unwrap();
        let remote = MemoryIndex::new().settle_after(100);

        let run = init_index(
            &remote,
            &config,
            &folder,
            &scan,
            quick_wait(Deadline::After(Duration::ZERO)),
            &NoProgress,
        )
        .unwrap();

        assert_eq!(
            run.outcome.as_ref().map(WaitOutcome::state),
            Some(WaitState::TimedOut)
        );
        assert_eq!(run.state.files.len(), 1);
        assert!(run.check().is_err());
    }

    #[test]
    fn test_sync_index_without_additions_skips_wait() {
        let dir = docs(&["a.md"]);
        let config = Config::default();
        let (folder, scan) = scan_target(dir.path(), &config, &NoProgress).unwrap();
        let remote = MemoryIndex::new();

        let mut files = FileSet::new();
        for name in ["a.md", "old.md"] {
            files.insert(name.to_string(), remote.upload(name, vec![]).unwrap());
        }
        let ids: Vec<String> = files.values().cloned().collect();
        let index = remote.create_index("docs", &ids).unwrap();
        let previous = IndexState::new(index, &folder, files);

        let plan = reconcile(&scan.relative_paths(), &previous.files);
        let run = sync_index(
            &remote,
            &previous,
            &folder,
            &plan,
            &scan,
            quick_wait(Deadline::Unlimited),
            &NoProgress,
        );

        assert!(run.outcome.is_none());
        assert_eq!(run.state.files.keys().collect::<Vec<_>>(), vec!["a.md"]);
        assert_eq!(remote.poll_count(), 0);
    }

    #[test]
    fn test_failed_paths_maps_ids_to_paths() {
        let mut files = FileSet::new();
        files.insert("bad.pdf".to_string(), "file-2".to_string());
        let run = IndexRun {
            state: IndexState::new("vs-1", "/docs", files),
            failures: Vec::new(),
            outcome: Some(WaitOutcome::Settled {
                status: BatchStatus {
                    completed: 1,
                    in_progress: 0,
                    failed: 2,
                    failed_items: vec!["file-2".to_string(), "file-9".to_string()],
                },
                polls: 1,
            }),
        };
        assert_eq!(run.failed_paths(), vec!["bad.pdf", "file-9"]);
        assert!(run.check().is_ok());
    }
}
