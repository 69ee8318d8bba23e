//! Bounded worker pool with blocking submission.
//!
//! A pool runs one task function with at most `size` invocations in flight.
//! Each accepted input holds a semaphore permit until its task finishes, so a
//! saturated pool makes [`WorkerPool::invoke`] wait (or fail, in non-blocking
//! mode) instead of growing an internal queue.

use crate::pipeline::error::{PoolError, PoolKind};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::{JoinError, JoinSet};

type TaskFn<I> = Arc<dyn Fn(I) -> BoxFuture<'static, ()> + Send + Sync>;

/// Fixed-size pool executing a single task function.
pub struct WorkerPool<I> {
    kind: PoolKind,
    size: usize,
    nonblocking: bool,
    permits: Arc<Semaphore>,
    task: TaskFn<I>,
    running: JoinSet<()>,
}

impl<I: Send + 'static> WorkerPool<I> {
    /// Create a pool of `size` workers running `task`.
    pub fn new<F, Fut>(kind: PoolKind, size: usize, task: F) -> Result<Self, PoolError>
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if size == 0 || size > Semaphore::MAX_PERMITS {
            return Err(PoolError::InvalidSize {
                size,
                max: Semaphore::MAX_PERMITS,
            });
        }

        let task: TaskFn<I> = Arc::new(move |input: I| task(input).boxed());

        Ok(Self {
            kind,
            size,
            nonblocking: false,
            permits: Arc::new(Semaphore::new(size)),
            task,
            running: JoinSet::new(),
        })
    }

    /// Fail submissions with [`PoolError::Saturated`] instead of waiting for a free worker.
    pub fn with_nonblocking(mut self, nonblocking: bool) -> Self {
        self.nonblocking = nonblocking;
        self
    }

    /// Submit one input.
    ///
    /// Waits while all workers are busy unless the pool is non-blocking.
    pub async fn invoke(&mut self, input: I) -> Result<(), PoolError> {
        let permit = if self.nonblocking {
            match self.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => return Err(PoolError::Saturated),
                Err(TryAcquireError::Closed) => return Err(PoolError::Released),
            }
        } else {
            self.permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PoolError::Released)?
        };

        self.reap_finished();

        let work = (self.task)(input);
        self.running.spawn(async move {
            let _permit = permit;
            work.await;
        });

        Ok(())
    }

    /// Wait until every accepted task has finished.
    pub async fn wait(&mut self) {
        while let Some(joined) = self.running.join_next().await {
            self.log_join_error(joined);
        }
    }

    /// Collect tasks that already completed so the join set stays small.
    fn reap_finished(&mut self) {
        while let Some(joined) = self.running.try_join_next() {
            self.log_join_error(joined);
        }
    }

    fn log_join_error(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            tracing::warn!("{} pool task did not complete: {}", self.kind, e);
        }
    }
}

impl<I> WorkerPool<I> {
    /// Stop accepting work. Safe to call more than once.
    pub fn release(&self) {
        if !self.permits.is_closed() {
            tracing::debug!("releasing {} pool", self.kind);
            self.permits.close();
        }
    }

    pub fn is_released(&self) -> bool {
        self.permits.is_closed()
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of workers currently executing a task.
    pub fn running(&self) -> usize {
        self.size - self.permits.available_permits()
    }
}

impl<I> Drop for WorkerPool<I> {
    fn drop(&mut self) {
        self.release();
    }
}
