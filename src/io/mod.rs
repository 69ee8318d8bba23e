//! File discovery and reading.

mod discover;
mod reader;

pub use discover::{discover, patterns_from_csv, PatternSet};
pub use reader::{LocalReader, ReadFile};
