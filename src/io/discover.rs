//! Selecting which files to review.
//!
//! Patterns use glob syntax: `**` spans directories, `*` and `?` stay within
//! one path segment, `{a,b}` picks alternatives and `[...]` is a character
//! class. Matching is done on root-relative paths with `/` separators.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

/// A set of compiled glob patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    globs: GlobSet,
}

impl PatternSet {
    /// Compile every pattern; fails on the first invalid one.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid file pattern '{}'", pattern))?;
            builder.add(glob);
        }

        let globs = builder.build().context("failed to compile file patterns")?;
        Ok(Self { globs })
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.globs.len()
    }

    /// Whether `path` matches any pattern.
    pub fn is_match(&self, path: &str) -> bool {
        self.globs.is_match(path)
    }
}

/// Split a comma-separated pattern list, skipping empty entries.
pub fn patterns_from_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// List files under `root` matching `patterns`, as sorted root-relative paths.
pub fn discover(root: &Path, patterns: &PatternSet) -> Result<Vec<String>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(root) {
            Ok(relative) => relative,
            Err(_) => continue,
        };

        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if patterns.is_match(&name) {
            files.push(name);
        }
    }

    files.sort();
    tracing::debug!("{} files under {} matched the patterns", files.len(), root.display());

    Ok(files)
}
