//! Gitignore-style pattern compilation.
//!
//! Translates one line of ignore-file text into a [`Pattern`] backed by a
//! [`globset::GlobMatcher`]. The translation follows gitignore rules:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `*`, `?`, `[..]` | wildcards confined to one path segment |
//! | `**` | matches across segment boundaries |
//! | trailing `/` | matches directories only |
//! | leading `!` | re-includes a previously excluded path |
//! | leading `/` or an inner `/` | anchored to the source's base directory |
//! | `#...`, blank | ignored |
//! | `{`, `}`, `,` | literal characters, no alternation |
//!
//! Patterns without a slash match at any depth (`*.log` becomes `**/*.log`).

use globset::{GlobBuilder, GlobMatcher};
use std::borrow::Cow;

use crate::error::PatternError;

/// A compiled ignore rule.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    matcher: GlobMatcher,
    negated: bool,
    dir_only: bool,
    anchored: bool,
}

impl Pattern {
    /// The line this pattern was compiled from, without the trailing newline.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `true` for `!`-prefixed patterns that re-include matching paths.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// `true` when the pattern carried a trailing `/`.
    pub fn is_dir_only(&self) -> bool {
        self.dir_only
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Test a slash-separated path relative to the pattern's base directory.
    ///
    /// Directory-only patterns never match plain files, whatever their name.
    pub fn is_match(&self, relative_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        self.matcher.is_match(relative_path)
    }
}

/// Compile one line of ignore-file text.
///
/// Returns `Ok(None)` for blank lines and comments, and
/// [`PatternError::Malformed`] when the glob cannot be parsed (for example an
/// unterminated character class).
pub fn compile(line: &str) -> Result<Option<Pattern>, PatternError> {
    let raw = line.trim_end_matches(['\n', '\r']);
    let mut text = trim_unescaped_trailing_spaces(raw);

    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }

    let mut negated = false;
    if let Some(rest) = text.strip_prefix('!') {
        negated = true;
        text = rest;
    } else if text.starts_with("\\!") || text.starts_with("\\#") {
        text = &text[1..];
    }

    let mut dir_only = false;
    while let Some(rest) = text.strip_suffix('/') {
        dir_only = true;
        text = rest;
    }

    let (body, anchored) = match text.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (text, text.contains('/')),
    };

    if body.is_empty() {
        return Ok(None);
    }

    let body = escape_braces(body);
    let glob_text = if anchored || body.starts_with("**/") {
        body.into_owned()
    } else {
        format!("**/{body}")
    };

    let glob = GlobBuilder::new(&glob_text)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|source| PatternError::Malformed {
            pattern: raw.to_string(),
            source,
        })?;

    Ok(Some(Pattern {
        raw: raw.to_string(),
        matcher: glob.compile_matcher(),
        negated,
        dir_only,
        anchored,
    }))
}

/// Escape `{` and `}` outside character classes so globset matches them
/// literally.
fn escape_braces(body: &str) -> Cow<'_, str> {
    if !body.contains(['{', '}']) {
        return Cow::Borrowed(body);
    }

    let mut out = String::with_capacity(body.len() + 4);
    let mut chars = body.chars();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '{' | '}' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn trim_unescaped_trailing_spaces(line: &str) -> &str {
    let mut end = line.len();
    let bytes = line.as_bytes();
    while end > 0 && bytes[end - 1] == b' ' {
        if end >= 2 && bytes[end - 2] == b'\\' {
            break;
        }
        end -= 1;
    }
    &line[..end]
}
