//! Ignore-rule resolution.
//!
//! Merges the built-in exclusions with every discovered ignore file into one
//! [`RuleSet`]. Sources are consulted in a fixed order, later sources
//! overriding earlier ones on conflicting matches:
//!
//! 1. built-in names (`.git/`, `.env`, the project ignore file, the state file)
//! 2. `.gitignore` at the repository root
//! 3. `.agentic_search_ignore` at the repository root
//! 4. `.agentic_search_ignore` in the target folder, when it is not the root
//!
//! Built-in names are checked before any user pattern and cannot be
//! re-included with `!`. Without a repository (no `.git` marker above the
//! folder) step 2 is skipped and step 3 reads from the folder itself.
//!
//! Repository-scoped patterns also see the folder's own location inside the
//! repository: when they exclude the folder or one of its ancestors, every
//! path under it is excluded.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::error::PatternError;
use crate::pattern::{self, Pattern};

/// Version-control marker used to detect the repository root.
pub const VCS_MARKER: &str = ".git";
/// Repository-wide ignore file.
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";
/// Project-specific ignore file, read at the repository root and in the folder.
pub const IGNORE_FILE_NAME: &str = ".agentic_search_ignore";
/// Credentials file that must never leave the machine.
pub const ENV_FILE_NAME: &str = ".env";

/// Where a pattern's paths are rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Paths are relative to the repository root.
    Repository,
    /// Paths are relative to the target folder.
    Folder,
}

/// A name excluded in every rule set, whatever the ignore files say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinName {
    pub name: String,
    pub dir_only: bool,
}

impl BuiltinName {
    fn file(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dir_only: false,
        }
    }

    fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dir_only: true,
        }
    }
}

/// An ignore-file line that was dropped because it could not be compiled.
#[derive(Debug)]
pub struct SkippedPattern {
    pub source: PathBuf,
    pub line: usize,
    pub error: PatternError,
}

#[derive(Debug, Clone)]
struct ScopedPattern {
    pattern: Pattern,
    scope: Scope,
    /// Folder path relative to the pattern's base, with a trailing `/`,
    /// or empty when the base is the folder itself.
    prefix: String,
}

impl ScopedPattern {
    fn is_match(&self, relative_path: &str, is_dir: bool) -> bool {
        let candidate: Cow<'_, str> = if self.prefix.is_empty() {
            Cow::Borrowed(relative_path)
        } else {
            Cow::Owned(format!("{}{}", self.prefix, relative_path))
        };
        self.pattern.is_match(&candidate, is_dir)
    }
}

/// Folder layout the pattern sources are located from.
#[derive(Debug, Clone)]
struct SourceLayout {
    folder: PathBuf,
    repo_root: Option<PathBuf>,
}

impl SourceLayout {
    fn project_root(&self) -> &Path {
        self.repo_root.as_deref().unwrap_or(&self.folder)
    }
}

type SourceLocator = fn(&SourceLayout) -> Option<(PathBuf, Scope)>;

/// Pattern sources in precedence order (later overrides earlier).
const PATTERN_SOURCES: [SourceLocator; 3] =
    [repo_gitignore, repo_project_ignore, folder_project_ignore];

fn repo_gitignore(layout: &SourceLayout) -> Option<(PathBuf, Scope)> {
    let root = layout.repo_root.as_ref()?;
    Some((root.join(GITIGNORE_FILE_NAME), Scope::Repository))
}

fn repo_project_ignore(layout: &SourceLayout) -> Option<(PathBuf, Scope)> {
    Some((layout.project_root().join(IGNORE_FILE_NAME), Scope::Repository))
}

fn folder_project_ignore(layout: &SourceLayout) -> Option<(PathBuf, Scope)> {
    match &layout.repo_root {
        Some(root) if root != &layout.folder => {
            Some((layout.folder.join(IGNORE_FILE_NAME), Scope::Folder))
        }
        _ => None,
    }
}

/// The compiled, precedence-ordered ignore rules for one enumeration run.
#[derive(Debug)]
pub struct RuleSet {
    builtins: Vec<BuiltinName>,
    patterns: Vec<ScopedPattern>,
    skipped: Vec<SkippedPattern>,
    repo_root: Option<PathBuf>,
    folder_excluded: bool,
}

impl RuleSet {
    /// Rule set holding only the built-in exclusions plus `state_file_name`.
    pub fn builtin(state_file_name: &str) -> Self {
        let mut builtins = vec![
            BuiltinName::dir(VCS_MARKER),
            BuiltinName::file(ENV_FILE_NAME),
            BuiltinName::file(IGNORE_FILE_NAME),
        ];
        if !state_file_name.is_empty() && builtins.iter().all(|b| b.name != state_file_name) {
            builtins.push(BuiltinName::file(state_file_name));
        }
        Self {
            builtins,
            patterns: Vec::new(),
            skipped: Vec::new(),
            repo_root: None,
            folder_excluded: false,
        }
    }

    /// Built-in rules followed by in-memory pattern lines rooted at the folder.
    ///
    /// Malformed lines are skipped exactly as they are for ignore files.
    pub fn from_lines<'a>(
        state_file_name: &str,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut rules = Self::builtin(state_file_name);
        let text = lines.into_iter().collect::<Vec<_>>().join("\n");
        rules.push_source(Path::new("<inline>"), &text, Scope::Folder, String::new());
        rules
    }

    /// Compile every line of `text` and append it with the given path prefix.
    fn push_source(&mut self, source: &Path, text: &str, scope: Scope, prefix: String) {
        for (index, line) in text.lines().enumerate() {
            match pattern::compile(line) {
                Ok(Some(pattern)) => self.patterns.push(ScopedPattern {
                    pattern,
                    scope,
                    prefix: prefix.clone(),
                }),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        source = %source.display(),
                        line = index + 1,
                        "skipping ignore pattern: {}",
                        error
                    );
                    self.skipped.push(SkippedPattern {
                        source: source.to_path_buf(),
                        line: index + 1,
                        error,
                    });
                }
            }
        }
    }

    /// Decide whether a path relative to the target folder is excluded.
    ///
    /// A path is excluded when the folder itself is excluded, when a
    /// built-in name appears in it, when any of its parent directories is
    /// excluded, or when the last matching pattern for the path itself is
    /// not negated.
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        let components: Vec<&str> = relative_path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        if components.is_empty() {
            return false;
        }
        if self.folder_excluded {
            return true;
        }

        if self.matches_builtin(&components, is_dir) {
            return true;
        }

        let mut prefix = String::with_capacity(relative_path.len());
        for (i, component) in components.iter().enumerate() {
            if i > 0 {
                prefix.push('/');
            }
            prefix.push_str(component);
            let last = i + 1 == components.len();
            if self.verdict(&prefix, if last { is_dir } else { true }) == Some(true) {
                return true;
            }
        }
        false
    }

    fn matches_builtin(&self, components: &[&str], is_dir: bool) -> bool {
        let last = components.len() - 1;
        components.iter().enumerate().any(|(i, component)| {
            self.builtins.iter().any(|builtin| {
                builtin.name == *component && (!builtin.dir_only || i < last || is_dir)
            })
        })
    }

    /// Last-match-wins over the user patterns: `Some(true)` excluded,
    /// `Some(false)` re-included, `None` when nothing matched.
    fn verdict(&self, path: &str, is_dir: bool) -> Option<bool> {
        self.patterns
            .iter()
            .rev()
            .find(|scoped| scoped.is_match(path, is_dir))
            .map(|scoped| !scoped.pattern.is_negated())
    }

    /// Whether a repository-scoped pattern excludes `repo_prefix` (the
    /// folder's path inside the repository) or one of its ancestors.
    fn excludes_prefix(&self, repo_prefix: &str) -> bool {
        let mut ancestor = String::with_capacity(repo_prefix.len());
        for component in repo_prefix.split('/').filter(|c| !c.is_empty()) {
            if !ancestor.is_empty() {
                ancestor.push('/');
            }
            ancestor.push_str(component);
            let verdict = self
                .patterns
                .iter()
                .rev()
                .filter(|scoped| scoped.scope == Scope::Repository)
                .find(|scoped| scoped.pattern.is_match(&ancestor, true))
                .map(|scoped| !scoped.pattern.is_negated());
            if verdict == Some(true) {
                return true;
            }
        }
        false
    }

    /// `true` when the ignore rules exclude the target folder as a whole.
    pub fn is_folder_excluded(&self) -> bool {
        self.folder_excluded
    }

    /// Number of compiled user patterns across all sources.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn skipped(&self) -> &[SkippedPattern] {
        &self.skipped
    }

    pub fn repo_root(&self) -> Option<&Path> {
        self.repo_root.as_deref()
    }
}

/// Walk upward from `start` looking for a [`VCS_MARKER`] entry.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| candidate.join(VCS_MARKER).exists())
        .map(Path::to_path_buf)
}

/// Resolve the rule set for `target_folder`, detecting the repository root.
pub fn resolve(target_folder: &Path, state_file_name: &str) -> RuleSet {
    let folder = absolute(target_folder);
    let repo_root = find_repo_root(&folder);
    resolve_with_root(&folder, repo_root.as_deref(), state_file_name)
}

/// Resolve the rule set for `target_folder` against an explicit repository
/// root (or none).
///
/// Missing ignore files are empty sources. Unreadable ones are skipped with a
/// warning.
pub fn resolve_with_root(
    target_folder: &Path,
    repo_root: Option<&Path>,
    state_file_name: &str,
) -> RuleSet {
    let folder = absolute(target_folder);
    let repo_root = repo_root.map(absolute);
    let layout = SourceLayout {
        folder: folder.clone(),
        repo_root: repo_root.clone(),
    };

    let repo_prefix = match &repo_root {
        Some(root) => folder_prefix(&folder, root),
        None => String::new(),
    };

    let mut rules = RuleSet::builtin(state_file_name);
    rules.repo_root = repo_root;

    for locate in PATTERN_SOURCES {
        let Some((path, scope)) = locate(&layout) else {
            continue;
        };
        let Some(text) = read_pattern_text(&path) else {
            continue;
        };
        let prefix = match scope {
            Scope::Repository => repo_prefix.clone(),
            Scope::Folder => String::new(),
        };
        tracing::debug!(source = %path.display(), "loading ignore patterns");
        rules.push_source(&path, &text, scope, prefix);
    }

    rules.folder_excluded = rules.excludes_prefix(&repo_prefix);
    if rules.folder_excluded {
        tracing::warn!(
            folder = %folder.display(),
            "target folder is excluded by repository ignore rules"
        );
    }

    rules
}

fn read_pattern_text(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(source = %path.display(), "ignoring unreadable ignore file: {}", e);
            None
        }
    }
}

/// `folder` relative to `root` as a slash-separated prefix ending in `/`,
/// or empty when they are the same directory.
fn folder_prefix(folder: &Path, root: &Path) -> String {
    let Ok(relative) = folder.strip_prefix(root) else {
        return String::new();
    };
    let mut prefix = String::new();
    for component in relative.components() {
        prefix.push_str(&component.as_os_str().to_string_lossy());
        prefix.push('/');
    }
    prefix
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
