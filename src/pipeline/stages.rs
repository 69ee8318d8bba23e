//! Read and review stages of the pipeline.
//!
//! ```text
//! ┌─────────────┐  file_rx  ┌──────────────┐  result_rx
//! │ Read Stage  │──────────▶│ Review Stage │──────────▶ collector
//! └─────────────┘           └──────────────┘
//!        │ read failures go straight to result_rx
//!        └─────────────────────────────────────────────▶
//! ```
//!
//! Each stage owns its worker pool. A stage closes its outputs by dropping the
//! pool (whose task function holds the senders) once every task finished, so
//! the item channel closes before the review stage closes the result and
//! error channels.

use crate::io::ReadFile;
use crate::pipeline::error::{FileError, PoolError, PoolKind, ReviewError};
use crate::pipeline::pool::WorkerPool;
use crate::pipeline::Metrics;
use crate::policy::Evaluate;
use bytes::Bytes;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Content read successfully, waiting for review.
#[derive(Debug, Clone)]
pub struct File {
    pub name: String,
    pub content: Bytes,
}

/// Terminal outcome for one input path.
#[derive(Debug)]
pub struct FileResult {
    pub name: String,
    pub outcome: Result<Bytes, FileError>,
}

impl FileResult {
    pub fn success(name: impl Into<String>, output: Bytes) -> Self {
        Self {
            name: name.into(),
            outcome: Ok(output),
        }
    }

    pub fn failure(name: impl Into<String>, error: FileError) -> Self {
        Self {
            name: name.into(),
            outcome: Err(error),
        }
    }

    pub fn output(&self) -> Option<&Bytes> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FileError> {
        self.outcome.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Build the reader pool: each task reads one path and forwards the content
/// or reports the failure.
pub(crate) fn reader_pool(
    size: usize,
    nonblocking: bool,
    reader: Arc<dyn ReadFile>,
    file_tx: mpsc::Sender<File>,
    result_tx: mpsc::Sender<FileResult>,
    metrics: Arc<Metrics>,
) -> Result<WorkerPool<String>, PoolError> {
    let pool = WorkerPool::new(PoolKind::Reader, size, move |path: String| {
        let reader = reader.clone();
        let file_tx = file_tx.clone();
        let result_tx = result_tx.clone();
        let metrics = metrics.clone();

        async move {
            tracing::debug!("reading file from {}", path);

            let start = Instant::now();
            let read = catch_panic(reader.read(&path), "reader").await;
            metrics.add_read_time(start.elapsed());

            match read {
                Ok(content) => {
                    metrics.add_file_read(content.len() as u64);
                    let file = File {
                        name: path,
                        content,
                    };
                    if file_tx.send(file).await.is_err() {
                        tracing::debug!("Review stage dropped, discarding read content");
                    }
                }
                Err(e) => {
                    tracing::debug!("failed to read {}: {:#}", path, e);
                    metrics.add_read_failure();
                    let result = FileResult::failure(path, FileError::Read(e));
                    if result_tx.send(result).await.is_err() {
                        tracing::debug!("Result receiver dropped");
                    }
                }
            }
        }
    })?;

    Ok(pool.with_nonblocking(nonblocking))
}

/// Build the reviewer pool: each task evaluates one file and emits its result.
pub(crate) fn reviewer_pool(
    size: usize,
    nonblocking: bool,
    evaluator: Arc<dyn Evaluate>,
    result_tx: mpsc::Sender<FileResult>,
    metrics: Arc<Metrics>,
) -> Result<WorkerPool<File>, PoolError> {
    let pool = WorkerPool::new(PoolKind::Reviewer, size, move |file: File| {
        let evaluator = evaluator.clone();
        let result_tx = result_tx.clone();
        let metrics = metrics.clone();

        async move {
            tracing::debug!("reviewing file {}", file.name);

            let start = Instant::now();
            let verdict = catch_panic(evaluator.evaluate(&file.content), "evaluator").await;
            metrics.add_review_time(start.elapsed());

            let result = match verdict {
                Ok(output) => {
                    metrics.add_file_reviewed();
                    FileResult::success(file.name, output)
                }
                Err(e) => {
                    tracing::debug!("failed to review {}: {:#}", file.name, e);
                    metrics.add_review_failure();
                    FileResult::failure(file.name, FileError::Review(e))
                }
            };

            if result_tx.send(result).await.is_err() {
                tracing::debug!("Result receiver dropped");
            }
        }
    })?;

    Ok(pool.with_nonblocking(nonblocking))
}

/// Submit every path to the reader pool, then wait and close the item channel.
pub(crate) async fn run_read_stage(
    mut pool: WorkerPool<String>,
    paths: Vec<String>,
    error_tx: mpsc::Sender<ReviewError>,
    metrics: Arc<Metrics>,
) {
    for path in paths {
        if let Err(source) = pool.invoke(path).await {
            report_submit_failure(&error_tx, &metrics, PoolKind::Reader, source).await;
        }
    }

    pool.wait().await;
    pool.release();
    // Dropping the pool drops the last item sender
    drop(pool);
    tracing::debug!("read stage finished");
}

/// Submit every item until the read stage closes its output, then wait.
///
/// Returning drops the last result and error senders.
pub(crate) async fn run_review_stage(
    mut pool: WorkerPool<File>,
    mut file_rx: mpsc::Receiver<File>,
    error_tx: mpsc::Sender<ReviewError>,
    metrics: Arc<Metrics>,
) {
    while let Some(file) = file_rx.recv().await {
        if let Err(source) = pool.invoke(file).await {
            report_submit_failure(&error_tx, &metrics, PoolKind::Reviewer, source).await;
        }
    }

    pool.wait().await;
    pool.release();
    drop(pool);
    tracing::debug!("review stage finished");
}

async fn report_submit_failure(
    error_tx: &mpsc::Sender<ReviewError>,
    metrics: &Metrics,
    pool: PoolKind,
    source: PoolError,
) {
    let error = ReviewError::Submit { pool, source };
    tracing::warn!("{}", error);
    metrics.add_submit_failure();

    if error_tx.send(error).await.is_err() {
        tracing::debug!("Error receiver dropped");
    }
}

/// Turn a panic inside a capability into an ordinary error so the item still
/// gets its result.
async fn catch_panic<T, F>(future: F, capability: &str) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!("{} panicked: {}", capability, message);
            Err(anyhow::anyhow!("{} panicked: {}", capability, message))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_result_accessors() {
        let ok = FileResult::success("a.yaml", Bytes::from_static(b"ok"));
        assert!(ok.is_success());
        assert_eq!(ok.output().map(|b| &b[..]), Some(&b"ok"[..]));
        assert!(ok.error().is_none());

        let failed = FileResult::failure("b.yaml", FileError::Read(anyhow::anyhow!("denied")));
        assert!(!failed.is_success());
        assert!(failed.output().is_none());
        assert!(failed.error().unwrap().is_read());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_catch_panic_converts_to_error() {
        let result: anyhow::Result<()> = catch_panic(
            async {
                if true {
                    panic!("boom");
                }
                Ok(())
            },
            "evaluator",
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "evaluator panicked: boom");
    }

    #[tokio::test]
    async fn test_catch_panic_passes_results_through() {
        let result = catch_panic(async { Ok::<_, anyhow::Error>(7) }, "reader").await;
        assert_eq!(result.unwrap(), 7);
    }
}
