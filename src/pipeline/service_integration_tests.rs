//! Integration tests for ReviewService across both stages.
//!
//! Tests cover:
//! 1. Successful, read-failing and review-failing files in one batch
//! 2. One result per path for large batches with small pools and buffers
//! 3. Concurrency bound of the reviewer pool
//! 4. Pool setup failures and empty batches
//! 5. Submission failures from saturated non-blocking pools
//! 6. Panicking capabilities
//! 7. Cancellation when the caller drops a review

use crate::config::PipelineConfig;
use crate::io::ReadFile;
use crate::pipeline::{PoolError, PoolKind, ReviewError, ReviewOutcome, ReviewService};
use crate::policy::Evaluate;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Returns the path itself as content, failing for paths containing `fail_on`.
#[derive(Default)]
struct FakeReader {
    fail_on: Option<&'static str>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

#[async_trait]
impl ReadFile for FakeReader {
    async fn read(&self, path: &str) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(pattern) = self.fail_on {
            if path.contains(pattern) {
                anyhow::bail!("access denied");
            }
        }
        Ok(Bytes::from(path.to_string()))
    }
}

/// Answers "ok", fails on "invalid_review" content and panics on "panic" content.
/// Tracks how many evaluations run at the same time.
#[derive(Default)]
struct FakeEvaluator {
    delay: Option<Duration>,
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Evaluate for FakeEvaluator {
    async fn evaluate(&self, content: &[u8]) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        let content = String::from_utf8_lossy(content);
        if content.contains("panic") {
            panic!("evaluator exploded");
        }
        if content.contains("invalid_review") {
            anyhow::bail!("invalid");
        }
        Ok(Bytes::from_static(b"ok"))
    }
}

fn pipeline_config(readers: usize, reviewers: usize) -> PipelineConfig {
    PipelineConfig {
        reader_pool_size: readers,
        reviewer_pool_size: reviewers,
        ..PipelineConfig::default()
    }
}

fn paths(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn find<'a>(outcome: &'a ReviewOutcome, name: &str) -> &'a crate::pipeline::FileResult {
    outcome
        .results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result for {}", name))
}

/// Test 1: every file succeeds
#[tokio::test]
async fn test_all_files_reviewed() {
    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), pipeline_config(2, 2));
    let reader = Arc::new(FakeReader::default());

    let outcome = service
        .review(reader, paths(&["a.yaml", "b.yaml"]))
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.results.len(), 2);
    for result in &outcome.results {
        assert_eq!(result.output().map(|b| &b[..]), Some(&b"ok"[..]));
        assert!(result.error().is_none());
    }
}

/// Test 2: a failed read does not affect other files or the batch error
#[tokio::test]
async fn test_read_failure_is_isolated() {
    let evaluator = Arc::new(FakeEvaluator::default());
    let service = ReviewService::new(evaluator.clone(), pipeline_config(2, 2));
    let reader = Arc::new(FakeReader {
        fail_on: Some("bad"),
        ..Default::default()
    });

    let outcome = service
        .review(reader, paths(&["a.yaml", "bad.yaml"]))
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.results.len(), 2);

    let good = find(&outcome, "a.yaml");
    assert_eq!(good.output().map(|b| &b[..]), Some(&b"ok"[..]));

    let bad = find(&outcome, "bad.yaml");
    let error = bad.error().unwrap();
    assert!(error.is_read());
    assert!(error.to_string().contains("read"));

    // The unreadable file never reached the evaluator
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);

    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.files_read, 1);
    assert_eq!(snapshot.read_failures, 1);
    assert_eq!(snapshot.files_reviewed, 1);
}

/// Test 3: read and review failures carry distinguishable messages
#[tokio::test]
async fn test_mixed_failures_with_single_workers() {
    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), pipeline_config(1, 1));
    let reader = Arc::new(FakeReader {
        fail_on: Some("invalid_read"),
        ..Default::default()
    });

    let outcome = service
        .review(
            reader,
            paths(&["file_1", "invalid_read_file_2", "invalid_review_file_3"]),
        )
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.succeeded().count(), 1);
    assert_eq!(outcome.failed().count(), 2);

    assert!(find(&outcome, "file_1").is_success());
    assert_eq!(
        find(&outcome, "invalid_read_file_2").error().unwrap().to_string(),
        "failed to read file: access denied"
    );
    assert_eq!(
        find(&outcome, "invalid_review_file_3").error().unwrap().to_string(),
        "failed to review file: invalid"
    );
}

/// Test 4: large batch through tiny pools and buffers, one result per path
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_path_gets_exactly_one_result() {
    let config = PipelineConfig {
        reader_pool_size: 3,
        reviewer_pool_size: 4,
        channel_buffer: 1,
        nonblocking: false,
    };
    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), config);
    let reader = Arc::new(FakeReader {
        fail_on: Some("unreadable"),
        ..Default::default()
    });

    let names: Vec<String> = (0..200)
        .map(|i| match (i % 7, i % 5) {
            (0, _) => format!("unreadable_{}.yaml", i),
            (_, 0) => format!("invalid_review_{}.yaml", i),
            _ => format!("file_{}.yaml", i),
        })
        .collect();

    let outcome = service.review(reader, names.clone()).await.unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.results.len(), names.len());

    let returned: HashSet<&str> = outcome.results.iter().map(|r| r.name.as_str()).collect();
    let expected: HashSet<&str> = names.iter().map(String::as_str).collect();
    assert_eq!(returned, expected);

    for result in &outcome.results {
        if result.name.starts_with("unreadable") {
            assert!(result.error().unwrap().is_read());
        } else if result.name.starts_with("invalid_review") {
            assert!(result.error().unwrap().is_review());
        } else {
            assert!(result.is_success());
        }
    }
}

/// Test 5: the reviewer pool never runs more evaluations than its size
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_reviewer_concurrency_is_bounded() {
    let evaluator = Arc::new(FakeEvaluator {
        delay: Some(Duration::from_millis(5)),
        ..Default::default()
    });
    let service = ReviewService::new(evaluator.clone(), pipeline_config(16, 4));
    let names: Vec<String> = (0..60).map(|i| format!("file_{}.yaml", i)).collect();

    let outcome = service
        .review(Arc::new(FakeReader::default()), names)
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 60);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 60);

    let peak = evaluator.peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak concurrency {} exceeded pool size", peak);
    assert!(peak >= 1);
}

/// Test 6: an empty batch does no work
#[tokio::test]
async fn test_empty_batch() {
    let evaluator = Arc::new(FakeEvaluator::default());
    let reader = Arc::new(FakeReader::default());
    let service = ReviewService::new(evaluator.clone(), PipelineConfig::default());

    let outcome = service.review(reader.clone(), Vec::new()).await.unwrap();

    assert!(outcome.results.is_empty());
    assert!(outcome.is_clean());
    assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
}

/// Test 7: pool creation failure returns before any work
#[tokio::test]
async fn test_pool_setup_failure() {
    let reader = Arc::new(FakeReader::default());

    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), pipeline_config(2, 0));
    match service.review(reader.clone(), paths(&["a.yaml"])).await {
        Err(ReviewError::PoolSetup {
            pool: PoolKind::Reviewer,
            source: PoolError::InvalidSize { size: 0, .. },
        }) => {}
        other => panic!("unexpected outcome: {:?}", other),
    }

    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), pipeline_config(0, 2));
    let err = service
        .review(reader.clone(), paths(&["a.yaml"]))
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("failed to create reader pool"));

    assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
}

/// Test 8: saturated non-blocking pool rejects submissions without stopping the batch
#[tokio::test]
async fn test_nonblocking_submission_failures_are_collected() {
    let config = PipelineConfig {
        reader_pool_size: 1,
        reviewer_pool_size: 2,
        channel_buffer: 4,
        nonblocking: true,
    };
    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), config);
    let reader = Arc::new(FakeReader {
        delay: Some(Duration::from_millis(200)),
        ..Default::default()
    });

    let outcome = service
        .review(reader, paths(&["a.yaml", "b.yaml", "c.yaml"]))
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].is_success());
    assert_eq!(outcome.errors.len(), 2);
    for error in &outcome.errors {
        assert!(matches!(
            error,
            ReviewError::Submit {
                pool: PoolKind::Reader,
                source: PoolError::Saturated,
            }
        ));
        assert!(error
            .to_string()
            .starts_with("failed to submit a task to reader pool"));
    }
    assert_eq!(service.metrics().snapshot().submit_failures, 2);

    let joined = outcome.into_result().unwrap_err();
    assert_eq!(joined.to_string().lines().count(), 2);
}

/// Test 9: a panicking evaluator still yields a result for that file
#[tokio::test]
async fn test_panicking_evaluator_becomes_review_error() {
    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), pipeline_config(2, 2));

    let outcome = service
        .review(
            Arc::new(FakeReader::default()),
            paths(&["panic.yaml", "fine.yaml"]),
        )
        .await
        .unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.results.len(), 2);

    let error = find(&outcome, "panic.yaml").error().unwrap();
    assert!(error.is_review());
    assert!(error.to_string().contains("evaluator panicked: evaluator exploded"));
    assert!(find(&outcome, "fine.yaml").is_success());
}

/// Test 10: the same service handles consecutive batches independently
#[tokio::test]
async fn test_service_is_reusable() {
    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), pipeline_config(2, 2));

    for batch in [paths(&["a.yaml"]), paths(&["b.yaml", "c.yaml"])] {
        let expected = batch.len();
        let results = service
            .review(Arc::new(FakeReader::default()), batch)
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(results.len(), expected);
    }
}

/// Test 11: a saturated non-blocking reviewer pool reports reviewer submit errors
#[tokio::test]
async fn test_nonblocking_reviewer_saturation() {
    let config = PipelineConfig {
        reader_pool_size: 4,
        reviewer_pool_size: 1,
        channel_buffer: 4,
        nonblocking: true,
    };
    let evaluator = Arc::new(FakeEvaluator {
        delay: Some(Duration::from_millis(200)),
        ..Default::default()
    });
    let service = ReviewService::new(evaluator.clone(), config);

    let outcome = service
        .review(
            Arc::new(FakeReader::default()),
            paths(&["a.yaml", "b.yaml", "c.yaml"]),
        )
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].is_success());
    assert_eq!(outcome.errors.len(), 2);
    for error in &outcome.errors {
        assert!(matches!(
            error,
            ReviewError::Submit {
                pool: PoolKind::Reviewer,
                source: PoolError::Saturated,
            }
        ));
        assert!(error
            .to_string()
            .starts_with("failed to submit a task to reviewer pool"));
    }
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);
}

/// Test 12: dropping a review on timeout stops all further reads and evaluations
#[tokio::test]
async fn test_timed_out_review_stops_all_work() {
    let evaluator = Arc::new(FakeEvaluator {
        delay: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let reader = Arc::new(FakeReader::default());
    let service = ReviewService::new(evaluator.clone(), pipeline_config(2, 2));
    let names: Vec<String> = (0..40).map(|i| format!("file_{}.yaml", i)).collect();

    let timed_out =
        tokio::time::timeout(Duration::from_millis(60), service.review(reader.clone(), names))
            .await;
    assert!(timed_out.is_err());

    // Let the aborted tasks unwind
    tokio::time::sleep(Duration::from_millis(20)).await;
    let reads = reader.calls.load(Ordering::SeqCst);
    let evaluations = evaluator.calls.load(Ordering::SeqCst);
    assert!(evaluations < 40);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(reader.calls.load(Ordering::SeqCst), reads);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), evaluations);
}

/// Test 13: metrics on a shared service accumulate across calls
#[tokio::test]
async fn test_metrics_accumulate_across_calls() {
    let service = ReviewService::new(Arc::new(FakeEvaluator::default()), pipeline_config(2, 2));

    service
        .review(Arc::new(FakeReader::default()), paths(&["a.yaml"]))
        .await
        .unwrap();
    let first = service.metrics().snapshot();

    service
        .review(Arc::new(FakeReader::default()), paths(&["b.yaml", "c.yaml"]))
        .await
        .unwrap();
    let second = service.metrics().snapshot();

    assert_eq!(first.files_reviewed, 1);
    assert_eq!(second.files_reviewed, 3);
    assert_eq!(second.files_read, 3);
}
