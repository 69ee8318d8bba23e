//! Error types for the review pipeline.
//!
//! Item-level failures ([`FileError`]) travel inside each [`FileResult`](super::FileResult).
//! Pipeline-level failures ([`ReviewError`]) are collected into an [`ErrorList`]
//! that never hides one cause behind another.

use std::fmt;
use thiserror::Error;

/// The two worker pools of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Reader,
    Reviewer,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Reader => "reader",
            PoolKind::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the worker pool itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("invalid pool size {size}, expected a value between 1 and {max}")]
    InvalidSize { size: usize, max: usize },

    #[error("pool is saturated")]
    Saturated,

    #[error("pool has been released")]
    Released,
}

/// Failure of a single file, stored in its result.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to read file: {0:#}")]
    Read(anyhow::Error),

    #[error("failed to review file: {0:#}")]
    Review(anyhow::Error),
}

impl FileError {
    /// The error returned by the capability, without the stage prefix.
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            FileError::Read(e) | FileError::Review(e) => e,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, FileError::Read(_))
    }

    pub fn is_review(&self) -> bool {
        matches!(self, FileError::Review(_))
    }
}

/// Pipeline-level failures.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// A pool could not be created; no work was performed.
    #[error("failed to create {pool} pool: {source}")]
    PoolSetup {
        pool: PoolKind,
        #[source]
        source: PoolError,
    },

    /// A task could not be handed to a pool; the batch kept going.
    #[error("failed to submit a task to {pool} pool: {source}")]
    Submit {
        pool: PoolKind,
        #[source]
        source: PoolError,
    },

    /// A stage task panicked or was cancelled before closing its outputs.
    #[error("{stage} stage terminated abnormally: {reason}")]
    StageFailed { stage: PoolKind, reason: String },

    #[error(transparent)]
    Joined(ErrorList),
}

/// Ordered collection of pipeline errors.
///
/// `Display` prints one cause per line, in the order they were received.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<ReviewError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ReviewError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReviewError> {
        self.errors.iter()
    }

    /// `Ok(())` when empty, otherwise every cause wrapped in [`ReviewError::Joined`].
    pub fn into_result(self) -> Result<(), ReviewError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ReviewError::Joined(self))
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.errors.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

impl Extend<ReviewError> for ErrorList {
    fn extend<T: IntoIterator<Item = ReviewError>>(&mut self, iter: T) {
        self.errors.extend(iter);
    }
}

impl IntoIterator for ErrorList {
    type Item = ReviewError;
    type IntoIter = std::vec::IntoIter<ReviewError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ReviewError;
    type IntoIter = std::slice::Iter<'a, ReviewError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
