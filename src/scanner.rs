//! Local file enumeration.
//!
//! Walks a folder depth-first with [`walkdir`], pruning every directory the
//! [`RuleSet`] excludes so ignored subtrees (dependency caches, build output)
//! are never descended into. Symbolic links are not followed and are not
//! reported as files. Entries that cannot be read are skipped and recorded as
//! [`ScanIssue`]s rather than failing the walk.
//!
//! The result is sorted byte-wise by relative path, so two walks of an
//! unchanged folder produce identical output on every platform.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ScanIssue;
use crate::ignore_rules::RuleSet;

/// A file selected for the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Slash-separated path relative to the scanned folder.
    pub relative_path: String,
    /// Location on disk.
    pub path: PathBuf,
}

/// Outcome of one enumeration run.
#[derive(Debug, Default)]
pub struct Scan {
    pub files: Vec<LocalFile>,
    pub issues: Vec<ScanIssue>,
}

impl Scan {
    /// Relative paths in enumeration order.
    pub fn relative_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.relative_path.clone()).collect()
    }

    pub fn get(&self, relative_path: &str) -> Option<&LocalFile> {
        self.files
            .binary_search_by(|f| f.relative_path.as_str().cmp(relative_path))
            .ok()
            .map(|i| &self.files[i])
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Enumerate every file under `root` that `rules` does not exclude.
///
/// Each call re-walks the tree; nothing is cached between calls.
pub fn scan_folder(root: &Path, rules: &RuleSet) -> Result<Scan> {
    if !root.is_dir() {
        bail!("Folder '{}' does not exist.", root.display());
    }

    let mut scan = Scan::default();
    if rules.is_folder_excluded() {
        return Ok(scan);
    }

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(source) => {
                let issue = ScanIssue::Unreadable {
                    path: source.path().unwrap_or(root).to_path_buf(),
                    source,
                };
                tracing::warn!("{}", issue);
                scan.issues.push(issue);
                continue;
            }
        };

        let file_type = entry.file_type();
        let Some(relative_path) = relative_path(root, entry.path()) else {
            let issue = ScanIssue::NonUtf8Path {
                path: entry.path().to_path_buf(),
            };
            tracing::warn!("{}", issue);
            scan.issues.push(issue);
            if file_type.is_dir() {
                walker.skip_current_dir();
            }
            continue;
        };

        if file_type.is_dir() {
            if rules.is_ignored(&relative_path, true) {
                tracing::debug!(path = %relative_path, "pruning ignored directory");
                walker.skip_current_dir();
            }
            continue;
        }

        if !file_type.is_file() || rules.is_ignored(&relative_path, false) {
            continue;
        }

        scan.files.push(LocalFile {
            relative_path,
            path: entry.into_path(),
        });
    }

    // Sort for deterministic ordering
    scan.files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(scan)
}

/// `path` relative to `root`, joined with `/`; `None` when a component is
/// not valid UTF-8.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        parts.push(component.as_os_str().to_str()?);
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const STATE: &str = ".agentic_search_config.json";

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    #[test]
    fn test_ignored_extension_excluded() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.txt");
        touch(tmp.path(), "b.log");

        let rules = RuleSet::from_lines(STATE, ["*.log"]);
        let scan = scan_folder(tmp.path(), &rules).unwrap();
        assert_eq!(scan.relative_paths(), vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_byte_wise_order() {
        let tmp = TempDir::new().unwrap();
        for rel in ["b.txt", "C.txt", "a/b.txt", "a.b", "a-c/x.md"] {
            touch(tmp.path(), rel);
        }

        let rules = RuleSet::builtin(STATE);
        let scan = scan_folder(tmp.path(), &rules).unwrap();
        assert_eq!(
            scan.relative_paths(),
            vec!["C.txt", "a-c/x.md", "a.b", "a/b.txt", "b.txt"]
        );
    }

    #[test]
    fn test_repeat_scan_is_identical() {
        let tmp = TempDir::new().unwrap();
        for rel in ["z.md", "docs/one.md", "docs/deep/two.md", ".hidden/notes.md"] {
            touch(tmp.path(), rel);
        }

        let rules = RuleSet::builtin(STATE);
        let first = scan_folder(tmp.path(), &rules).unwrap();
        let second = scan_folder(tmp.path(), &rules).unwrap();
        assert_eq!(first.files, second.files);
    }

    #[test]
    fn test_hidden_files_included_but_builtins_excluded() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), ".hidden.md");
        touch(tmp.path(), ".env");
        touch(tmp.path(), ".git/HEAD");
        touch(tmp.path(), STATE);
        touch(tmp.path(), "doc.md");

        let rules = RuleSet::builtin(STATE);
        let scan = scan_folder(tmp.path(), &rules).unwrap();
        assert_eq!(scan.relative_paths(), vec![".hidden.md", "doc.md"]);
    }

    #[test]
    fn test_ignored_directory_pruned() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "node_modules/pkg/index.js");
        touch(tmp.path(), "node_modules/keep.js");
        touch(tmp.path(), "src/main.js");

        let rules = RuleSet::from_lines(STATE, ["node_modules/", "!node_modules/keep.js"]);
        let scan = scan_folder(tmp.path(), &rules).unwrap();
        assert_eq!(scan.relative_paths(), vec!["src/main.js"]);
    }

    #[test]
    fn test_get_by_relative_path() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.md");
        touch(tmp.path(), "sub/b.md");

        let scan = scan_folder(tmp.path(), &RuleSet::builtin(STATE)).unwrap();
        let file = scan.get("sub/b.md").unwrap();
        assert_eq!(file.path, tmp.path().join("sub").join("b.md"));
        assert!(scan.get("missing.md").is_none());
    }

    #[test]
    fn test_missing_folder_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = scan_folder(&tmp.path().join("nope"), &RuleSet::builtin(STATE));
        assert!(result.is_err());
    }

    #[test]
    fn test_folder_excluded_by_repository_rules_is_empty() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::write(repo.join(".gitignore"), "docs/\n").unwrap();
        touch(&repo, "docs/secret.md");
        touch(&repo, "readme.md");

        let docs = repo.join("docs");
        let scan = scan_folder(&docs, &crate::ignore_rules::resolve(&docs, STATE)).unwrap();
        assert!(scan.is_empty());

        let scan = scan_folder(&repo, &crate::ignore_rules::resolve(&repo, STATE)).unwrap();
        assert_eq!(scan.relative_paths(), vec![".gitignore", "readme.md"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_recorded_and_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.md");
        touch(tmp.path(), "locked/hidden.md");
        touch(tmp.path(), "z/b.md");
        let locked = tmp.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits are not enforced for privileged users.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let scan = scan_folder(tmp.path(), &RuleSet::builtin(STATE)).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(scan.relative_paths(), vec!["a.md", "z/b.md"]);
        assert_eq!(scan.issues.len(), 1);
        assert!(matches!(
            &scan.issues[0],
            ScanIssue::Unreadable { path, .. } if path == &locked
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_recorded_and_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.md");
        let odd = tmp.path().join(OsStr::from_bytes(b"bad\xff.md"));
        // Some filesystems refuse names that are not valid UTF-8.
        if fs::write(&odd, "x").is_err() {
            return;
        }

        let scan = scan_folder(tmp.path(), &RuleSet::builtin(STATE)).unwrap();
        assert_eq!(scan.relative_paths(), vec!["a.md"]);
        assert_eq!(scan.issues.len(), 1);
        assert!(matches!(&scan.issues[0], ScanIssue::NonUtf8Path { path } if path == &odd));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "real/file.md");
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(
            tmp.path().join("real/file.md"),
            tmp.path().join("link.md"),
        )
        .unwrap();

        let scan = scan_folder(tmp.path(), &RuleSet::builtin(STATE)).unwrap();
        assert_eq!(scan.relative_paths(), vec!["real/file.md"]);
    }
}
