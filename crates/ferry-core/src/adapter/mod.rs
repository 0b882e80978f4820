//! The transfer-adapter interface a worker-pool scheduler drives.
//!
//! # Architecture
//!
//! ```text
//! WorkerPool
//!     |  begin(n) -> effective worker count
//!     |
//!     +-- worker i: worker_starting(i) --> Worker (one agent process)
//!     |                 |
//!     |                 +-- do_transfer(&mut Worker, transfer)   (repeated)
//!     |                 |
//!     |             worker_ending(i, Worker) / worker_aborted(i, Worker)
//! ```

pub mod custom;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::transfer::{AuthCallback, Direction, ProgressCallback, Transfer, TransferOutcome};

pub use custom::CustomAdapter;

/// One direction of object transfer, performed by a set of workers.
#[async_trait]
pub trait TransferAdapter: Send + Sync {
    /// Per-worker state, owned exclusively by that worker.
    type Worker: Send;

    fn name(&self) -> &str;

    fn direction(&self) -> Direction;

    /// Called once per batch with the scheduler's desired worker count.
    /// Returns the number of workers that should actually be started.
    fn begin(&mut self, max_concurrency: usize) -> usize;

    /// Bring up worker `worker`. A failure means the worker never exists.
    async fn worker_starting(&self, worker: usize) -> Result<Self::Worker, AdapterError>;

    /// Perform one transfer on a started worker.
    ///
    /// Errors for which [`AdapterError::is_fatal`] holds leave the worker
    /// unusable; the scheduler should retire it.
    async fn do_transfer(
        &self,
        worker: &mut Self::Worker,
        transfer: &Transfer,
        progress: Option<&ProgressCallback>,
        auth_ok: Option<AuthCallback>,
    ) -> Result<TransferOutcome, AdapterError>;

    /// Retire a worker at the end of a batch.
    async fn worker_ending(&self, worker: usize, state: Self::Worker);

    /// Retire a worker immediately, e.g. on cancellation.
    async fn worker_aborted(&self, worker: usize, state: Self::Worker);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferObject;

    /// An adapter whose workers are plain counters, to prove the trait can be
    /// implemented without an agent process behind it.
    struct CountingAdapter;

    #[async_trait]
    impl TransferAdapter for CountingAdapter {
        type Worker = u32;

        fn name(&self) -> &str {
            "counting"
        }

        fn direction(&self) -> Direction {
            Direction::Download
        }

        fn begin(&mut self, max_concurrency: usize) -> usize {
            max_concurrency
        }

        async fn worker_starting(&self, _worker: usize) -> Result<u32, AdapterError> {
            Ok(0)
        }

        async fn do_transfer(
            &self,
            worker: &mut u32,
            _transfer: &Transfer,
            _progress: Option<&ProgressCallback>,
            auth_ok: Option<AuthCallback>,
        ) -> Result<TransferOutcome, AdapterError> {
            *worker += 1;
            if let Some(auth_ok) = auth_ok {
                auth_ok();
            }
            Ok(TransferOutcome::Downloaded { path: None })
        }

        async fn worker_ending(&self, _worker: usize, _state: u32) {}

        async fn worker_aborted(&self, _worker: usize, _state: u32) {}
    }

    #[tokio::test]
    async fn adapter_trait_is_implementable() {
        let mut adapter = CountingAdapter;
        assert_eq!(adapter.begin(4), 4);
        let mut worker = adapter.worker_starting(0).await.unwrap();
        let transfer = Transfer::new("file.bin", TransferObject::new("abc", 1));
        let outcome = adapter
            .do_transfer(&mut worker, &transfer, None, None)
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Downloaded { path: None });
        assert_eq!(worker, 1);
        adapter.worker_ending(0, worker).await;
    }
}
