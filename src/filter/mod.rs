//! Include/exclude filtering of discovered files
//!
//! Every raw pattern is anchored twice: once at the source root and once at
//! the destination root. Both sets are checked against the entry's source
//! path, in declaration order, and the last matching pattern decides.

use crate::config::Parameters;
use crate::paths::{absolute_path, split_bucket_key, PathFormatter};
use crate::types::{FileStats, PathKind, SyncError};
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, MAIN_SEPARATOR};

/// Whether a matching pattern keeps or drops the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Include,
    Exclude,
}

/// One `--include`/`--exclude` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPattern {
    pub kind: FilterKind,
    pub pattern: String,
}

impl FilterPattern {
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            kind: FilterKind::Include,
            pattern: pattern.into(),
        }
    }

    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            kind: FilterKind::Exclude,
            pattern: pattern.into(),
        }
    }
}

/// A compiled pattern in both separator flavours.
#[derive(Debug, Clone)]
struct Rule {
    kind: FilterKind,
    pattern: String,
    local: GlobMatcher,
    remote: GlobMatcher,
}

impl Rule {
    fn new(kind: FilterKind, pattern: String) -> Result<Self, SyncError> {
        let local = compile(&pattern.replace('/', &MAIN_SEPARATOR.to_string()))?;
        let remote = compile(&pattern.replace(MAIN_SEPARATOR, "/"))?;
        Ok(Self {
            kind,
            pattern,
            local,
            remote,
        })
    }

    /// `Some(include?)` when the rule matches.
    fn evaluate(&self, stats: &FileStats) -> Option<bool> {
        let matcher = match stats.src_type {
            PathKind::Local => &self.local,
            PathKind::Remote => &self.remote,
        };
        if !matcher.is_match(&stats.src) {
            return None;
        }
        tracing::debug!(path = %stats.src, pattern = %self.pattern, kind = ?self.kind, "filter matched");
        Some(self.kind == FilterKind::Include)
    }
}

fn compile(pattern: &str) -> Result<GlobMatcher, SyncError> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|err| SyncError::Pattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
}

/// Root-anchored include/exclude rules.
#[derive(Debug, Clone)]
pub struct Filter {
    src_rules: Vec<Rule>,
    dest_rules: Vec<Rule>,
}

impl Filter {
    /// Anchor `patterns` at the two roots.
    ///
    /// # Arguments
    /// * `patterns` - Raw patterns in declaration order
    /// * `src_root` - Directory (or `bucket/prefix`) the source patterns hang off
    /// * `dest_root` - Same for the destination
    ///
    /// # Errors
    /// * `SyncError::Pattern` if a glob does not compile
    pub fn new(patterns: &[FilterPattern], src_root: &str, dest_root: &str) -> Result<Self, SyncError> {
        let anchor = |root: &str| -> Result<Vec<Rule>, SyncError> {
            patterns
                .iter()
                .map(|p| Rule::new(p.kind, join_pattern(root, &p.pattern)))
                .collect()
        };
        Ok(Self {
            src_rules: anchor(src_root)?,
            dest_rules: anchor(dest_root)?,
        })
    }

    /// Build the filter for a command, `None` when no pattern was given.
    pub fn from_parameters(params: &Parameters) -> Result<Option<Self>, SyncError> {
        if params.filters.is_empty() {
            return Ok(None);
        }
        let src_root = root_dir(&params.src, params.dir_op)?;
        let dest_root = root_dir(&params.dest, params.dir_op)?;
        Self::new(&params.filters, &src_root, &dest_root).map(Some)
    }

    /// Evaluate every rule pair; the last match wins, no match includes.
    pub fn should_include(&self, stats: &FileStats) -> bool {
        let mut include = true;
        for (src_rule, dest_rule) in self.src_rules.iter().zip(&self.dest_rules) {
            if let Some(verdict) = src_rule.evaluate(stats) {
                include = verdict;
            }
            if let Some(verdict) = dest_rule.evaluate(stats) {
                include = verdict;
            }
        }
        tracing::debug!(path = %stats.src, include, "final filter status");
        include
    }

    /// Drop excluded entries from a listing. Errors pass through untouched.
    pub fn apply<I>(self, entries: I) -> impl Iterator<Item = Result<FileStats, SyncError>>
    where
        I: Iterator<Item = Result<FileStats, SyncError>>,
    {
        entries.filter(move |entry| match entry {
            Ok(stats) => self.should_include(stats),
            Err(_) => true,
        })
    }
}

/// Directory the patterns of `path` are relative to.
///
/// Remote: `bucket/prefix`, dropping the last key segment of a single-object
/// path. Local: the absolute path for directory operations, its parent
/// otherwise.
fn root_dir(path: &str, dir_op: bool) -> Result<String, SyncError> {
    let (kind, stripped) = PathFormatter::identify_type(path);
    match kind {
        PathKind::Remote => {
            let (bucket, mut key) = split_bucket_key(&stripped);
            if !dir_op && !key.ends_with('/') {
                key = match key.rfind('/') {
                    Some(pos) => key[..pos].to_string(),
                    None => String::new(),
                };
            }
            Ok(format!("{}/{}", bucket, key))
        }
        PathKind::Local => {
            let absolute = absolute_path(Path::new(path))?;
            let root = if dir_op {
                absolute
            } else {
                absolute.parent().map(Path::to_path_buf).unwrap_or(absolute)
            };
            Ok(root.to_string_lossy().into_owned())
        }
    }
}

/// `root` joined with `pattern`; absolute patterns are used as given.
fn join_pattern(root: &str, pattern: &str) -> String {
    if Path::new(pattern).is_absolute() {
        return pattern.to_string();
    }
    let root = globset::escape(root);
    if root.is_empty() || root.ends_with('/') || root.ends_with(MAIN_SEPARATOR) {
        format!("{}{}", root, pattern)
    } else {
        format!("{}{}{}", root, MAIN_SEPARATOR, pattern)
    }
}
