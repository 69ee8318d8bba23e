//! Review service: wires the read and review stages and collects results.

use crate::config::PipelineConfig;
use crate::io::ReadFile;
use crate::pipeline::error::{ErrorList, PoolKind, ReviewError};
use crate::pipeline::stages::{self, File, FileResult};
use crate::pipeline::Metrics;
use crate::policy::Evaluate;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

/// Stage task owned by one `review` call; aborted if the call is dropped.
struct StageTask {
    stage: PoolKind,
    handle: JoinHandle<()>,
}

impl StageTask {
    fn spawn<F>(stage: PoolKind, stage_future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            stage,
            handle: tokio::spawn(stage_future),
        }
    }

    async fn join(mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }
}

impl Drop for StageTask {
    fn drop(&mut self) {
        // No-op once the task finished
        self.handle.abort();
    }
}

/// Results of one review call.
///
/// `errors` only holds pipeline problems (submission failures, a crashed
/// stage). Read and evaluation failures are reported per file in `results`.
#[derive(Debug, Default)]
pub struct ReviewOutcome {
    /// One entry per reviewed path, in completion order
    pub results: Vec<FileResult>,

    pub errors: ErrorList,
}

impl ReviewOutcome {
    /// True when the pipeline itself reported no errors.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &FileResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Results, or the joined pipeline error when there is one.
    pub fn into_result(self) -> Result<Vec<FileResult>, ReviewError> {
        self.errors.into_result()?;
        Ok(self.results)
    }
}

/// Reviews batches of files with a fixed evaluator.
pub struct ReviewService {
    evaluator: Arc<dyn Evaluate>,
    config: PipelineConfig,
    metrics: Arc<Metrics>,
}

impl ReviewService {
    /// Create a service; pool sizes are taken from `config` on every call.
    pub fn new(evaluator: Arc<dyn Evaluate>, config: PipelineConfig) -> Self {
        Self::with_metrics(evaluator, config, Metrics::new())
    }

    /// Create a service recording into shared `metrics`.
    ///
    /// Counters are never reset, so they accumulate over every `review` call
    /// on this service. Create a service per batch for per-batch numbers.
    pub fn with_metrics(
        evaluator: Arc<dyn Evaluate>,
        config: PipelineConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            evaluator,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Totals across all calls so far.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Read and evaluate every path.
    ///
    /// Fails only when a worker pool cannot be created, in which case no work
    /// is performed. Every other problem is reported in the outcome.
    ///
    /// Dropping the returned future (for example when a `tokio::time::timeout`
    /// around it expires) aborts both stages. Their pools go with them, which
    /// cancels every read and evaluation still in flight.
    pub async fn review(
        &self,
        reader: Arc<dyn ReadFile>,
        paths: Vec<String>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let total = paths.len();
        let buffer = self.config.channel_buffer.max(1);

        let (file_tx, file_rx) = mpsc::channel::<File>(buffer);
        let (result_tx, mut result_rx) = mpsc::channel::<FileResult>(buffer);
        let (error_tx, mut error_rx) = mpsc::channel::<ReviewError>(buffer);

        // A pool created before a failure is released when dropped here.
        let reader_pool = stages::reader_pool(
            self.config.reader_pool_size,
            self.config.nonblocking,
            reader,
            file_tx,
            result_tx.clone(),
            self.metrics.clone(),
        )
        .map_err(|source| ReviewError::PoolSetup {
            pool: PoolKind::Reader,
            source,
        })?;

        let reviewer_pool = stages::reviewer_pool(
            self.config.reviewer_pool_size,
            self.config.nonblocking,
            self.evaluator.clone(),
            result_tx,
            self.metrics.clone(),
        )
        .map_err(|source| ReviewError::PoolSetup {
            pool: PoolKind::Reviewer,
            source,
        })?;

        tracing::info!(
            "Reviewing {} files ({} readers, {} reviewers)",
            total,
            reader_pool.size(),
            reviewer_pool.size()
        );

        let read_task = StageTask::spawn(
            PoolKind::Reader,
            stages::run_read_stage(reader_pool, paths, error_tx.clone(), self.metrics.clone()),
        );
        let review_task = StageTask::spawn(
            PoolKind::Reviewer,
            stages::run_review_stage(reviewer_pool, file_rx, error_tx, self.metrics.clone()),
        );

        let mut results = Vec::with_capacity(total);
        let mut errors = ErrorList::new();
        let mut results_open = true;
        let mut errors_open = true;

        // Both channels are drained to the end so no error is lost.
        while results_open || errors_open {
            tokio::select! {
                result = result_rx.recv(), if results_open => match result {
                    Some(result) => results.push(result),
                    None => results_open = false,
                },
                error = error_rx.recv(), if errors_open => match error {
                    Some(error) => errors.push(error),
                    None => errors_open = false,
                },
            }
        }

        for task in [read_task, review_task] {
            let stage = task.stage;
            if let Err(e) = task.join().await {
                tracing::warn!("{} stage failed: {}", stage, e);
                errors.push(ReviewError::StageFailed {
                    stage,
                    reason: e.to_string(),
                });
            }
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(
            "Review complete: {} results ({} failed), {} pipeline errors",
            results.len(),
            failed,
            errors.len()
        );

        Ok(ReviewOutcome { results, errors })
    }
}
