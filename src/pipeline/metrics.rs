//! Throughput monitoring and metrics collection.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for the review pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Files read successfully
    pub files_read: AtomicU64,

    /// Files whose read failed
    pub read_failures: AtomicU64,

    /// Files evaluated successfully
    pub files_reviewed: AtomicU64,

    /// Files whose evaluation failed
    pub review_failures: AtomicU64,

    /// Tasks that could not be submitted to a pool
    pub submit_failures: AtomicU64,

    /// Total bytes read
    pub bytes_read: AtomicU64,

    /// Start time
    start_time: Option<Instant>,

    /// Time spent in the reader capability (microseconds)
    pub read_us: AtomicU64,

    /// Time spent in the evaluator (microseconds)
    pub review_us: AtomicU64,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// Record a successful read of `bytes` bytes.
    pub fn add_file_read(&self, bytes: u64) {
        self.files_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_file_reviewed(&self) {
        self.files_reviewed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_review_failure(&self) {
        self.review_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_submit_failure(&self) {
        self.submit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent reading (in microseconds).
    pub fn add_read_time(&self, duration: Duration) {
        self.read_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record time spent evaluating (in microseconds).
    pub fn add_review_time(&self, duration: Duration) {
        self.review_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Files that reached a terminal result, successful or not.
    pub fn files_completed(&self) -> u64 {
        self.files_reviewed.load(Ordering::Relaxed)
            + self.review_failures.load(Ordering::Relaxed)
            + self.read_failures.load(Ordering::Relaxed)
    }

    /// Get completed files per second.
    pub fn files_per_second(&self) -> f64 {
        let files = self.files_completed();
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            files as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_read: self.files_read.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            files_reviewed: self.files_reviewed.load(Ordering::Relaxed),
            review_failures: self.review_failures.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            files_per_second: self.files_per_second(),
            read_secs: self.read_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            review_secs: self.review_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub files_read: u64,
    pub read_failures: u64,
    pub files_reviewed: u64,
    pub review_failures: u64,
    pub submit_failures: u64,
    pub bytes_read: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub files_per_second: f64,
    /// Total time spent reading (seconds, summed across workers)
    pub read_secs: f64,
    /// Total time spent evaluating (seconds, summed across workers)
    pub review_secs: f64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total_time = self.read_secs + self.review_secs;
        let (read_pct, review_pct) = if total_time > 0.0 {
            (
                self.read_secs / total_time * 100.0,
                self.review_secs / total_time * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        write!(
            f,
            "Files: {} read, {} reviewed | Failures: read {}, review {}, submit {} | \
             Read: {:.2} MB | Rate: {:.1} files/s | Elapsed: {:.1}s | \
             Time: read {:.0}% | review {:.0}%",
            self.files_read,
            self.files_reviewed,
            self.read_failures,
            self.review_failures,
            self.submit_failures,
            self.bytes_read as f64 / (1024.0 * 1024.0),
            self.files_per_second,
            self.elapsed.as_secs_f64(),
            read_pct,
            review_pct,
        )
    }
}

/// Periodic metrics reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
    total_files: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64, total_files: u64) -> Self {
        Self {
            metrics,
            interval_secs,
            total_files,
        }
    }

    /// Start the periodic reporter.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    tracing::info!("[{:.1}%] {}", self.progress(&snapshot), snapshot);
                }
                _ = shutdown.recv() => {
                    let snapshot = self.metrics.snapshot();
                    tracing::info!("Final: {}", snapshot);
                    break;
                }
            }
        }
    }

    fn progress(&self, snapshot: &MetricsSnapshot) -> f64 {
        if self.total_files > 0 {
            (snapshot.files_reviewed + snapshot.review_failures + snapshot.read_failures) as f64
                / self.total_files as f64
                * 100.0
        } else {
            0.0
        }
    }
}
