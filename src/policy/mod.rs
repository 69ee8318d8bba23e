//! Policy evaluation.
//!
//! The pipeline only depends on [`Evaluate`]; [`RulePolicy`] is the built-in
//! implementation used by the CLI.

mod rules;

pub use rules::{RulePolicy, Verdict, Violation};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Evaluates file content and returns a serialized verdict.
#[async_trait]
pub trait Evaluate: Send + Sync {
    async fn evaluate(&self, content: &[u8]) -> Result<Bytes>;
}
