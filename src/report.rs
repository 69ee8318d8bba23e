//! Serializable summary of a review run, printed by the CLI.

use crate::pipeline::{FileResult, ReviewOutcome};
use serde::Serialize;

/// One line of the report per reviewed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub file: String,

    /// Evaluator output; parsed as JSON when possible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FileResult> for ReportEntry {
    fn from(result: &FileResult) -> Self {
        let output = result.output().map(|bytes| {
            serde_json::from_slice(bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            })
        });

        Self {
            file: result.name.clone(),
            output,
            error: result.error().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,

    /// Sorted by file name
    pub results: Vec<ReportEntry>,

    /// Pipeline errors, in the order they were received
    pub errors: Vec<String>,
}

impl ReviewReport {
    pub fn from_outcome(outcome: &ReviewOutcome) -> Self {
        let mut results: Vec<ReportEntry> = outcome.results.iter().map(ReportEntry::from).collect();
        results.sort_by(|a, b| a.file.cmp(&b.file));

        let succeeded = results.iter().filter(|r| r.error.is_none()).count();

        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            errors: outcome.errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn has_pipeline_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
