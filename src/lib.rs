//! Policy Review Pipeline
//!
//! Concurrent two-stage pipeline that reads a batch of files and evaluates each
//! one against a policy, returning one result per file.
//!
//! # Architecture
//!
//! - **I/O**: File discovery by glob pattern and the [`ReadFile`] capability
//! - **Policy**: The [`Evaluate`] capability and a rule-based implementation
//! - **Pipeline**: Bounded reader and reviewer pools joined by channels, with metrics
//! - **Report**: JSON summary of a run
//!
//! # Usage
//!
//! ```no_run
//! use policy_review::{Config, run_review};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"config.yaml".into())?;
//!     let report = run_review(config).await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod io;
pub mod pipeline;
pub mod policy;
pub mod report;

pub use config::{Config, PipelineConfig};
pub use io::{LocalReader, PatternSet, ReadFile};
pub use pipeline::{FileResult, Metrics, ReviewError, ReviewOutcome, ReviewService};
pub use policy::{Evaluate, RulePolicy};
pub use report::ReviewReport;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Discover the configured files and review them with the configured rules.
pub async fn run_review(config: Config) -> Result<ReviewReport> {
    config.validate()?;

    tracing::info!("Starting policy review");

    let patterns = PatternSet::new(&config.input.patterns)?;
    let paths = io::discover(&config.input.root, &patterns)?;

    if paths.is_empty() {
        tracing::info!("no files matched the provided patterns");
        return Ok(ReviewReport::default());
    }
    tracing::info!(
        "Found {} files under {}",
        paths.len(),
        config.input.root.display()
    );

    let policy = RulePolicy::new(&config.policy)?;
    tracing::info!("Loaded {} policy rules", policy.rule_count());

    let metrics = Metrics::new();
    let service = ReviewService::with_metrics(
        Arc::new(policy),
        config.pipeline.clone(),
        metrics.clone(),
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let reporter_handle = if config.processing.enable_metrics {
        let reporter = pipeline::MetricsReporter::new(
            metrics.clone(),
            config.processing.metrics_interval_secs,
            paths.len() as u64,
        );
        Some(tokio::spawn(reporter.run(shutdown_rx)))
    } else {
        drop(shutdown_rx);
        None
    };

    let reader = Arc::new(LocalReader::new(config.input.root.clone()));
    let outcome = service.review(reader, paths).await;

    let _ = shutdown_tx.send(()).await;
    if let Some(handle) = reporter_handle {
        let _ = handle.await;
    }

    let outcome = outcome?;

    if let Some(path) = &config.processing.metrics_output_path {
        if let Err(e) = metrics.snapshot().save_to_file(path) {
            tracing::warn!("Failed to save metrics to {}: {}", path, e);
        }
    }

    let report = ReviewReport::from_outcome(&outcome);
    tracing::info!(
        "Review complete: {} succeeded, {} failed, {} pipeline errors",
        report.succeeded,
        report.failed,
        report.errors.len()
    );

    Ok(report)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
