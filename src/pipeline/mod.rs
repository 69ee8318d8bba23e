//! Two-stage review pipeline: bounded reader pool, bounded reviewer pool,
//! and the service that drives both and aggregates the results.

mod error;
mod metrics;
mod pool;
mod service;
mod stages;

#[cfg(test)]
mod service_integration_tests;

pub use error::{ErrorList, FileError, PoolError, PoolKind, ReviewError};
pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use pool::WorkerPool;
pub use service::{ReviewOutcome, ReviewService};
pub use stages::{File, FileResult};
