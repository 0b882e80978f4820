//! Minimal worker pool: runs a batch of transfers through an adapter.
//!
//! Starts as many workers as the adapter allows, lets each pull transfers
//! from a shared queue until it drains, and reports every transfer exactly
//! once. There is no retry policy; a failed transfer stays failed.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::TransferAdapter;
use crate::error::AdapterError;
use crate::transfer::{AuthCallback, ProgressCallback, Transfer, TransferResult};

/// Callbacks shared by every transfer in a batch.
#[derive(Clone, Default)]
pub struct PoolCallbacks {
    pub progress: Option<ProgressCallback>,
    /// Invoked at most once per transfer when credentials are seen to work.
    pub auth_ok: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl std::fmt::Debug for PoolCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCallbacks")
            .field("progress", &self.progress.is_some())
            .field("auth_ok", &self.auth_ok.is_some())
            .finish()
    }
}

/// Everything that happened during one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per submitted transfer, in completion order.
    pub results: Vec<TransferResult>,
    /// Workers whose start (including the init handshake) succeeded.
    pub workers_started: usize,
    /// Why the other workers failed to start.
    pub start_errors: Vec<AdapterError>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &TransferResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(TransferResult::is_ok)
    }
}

#[derive(Default)]
struct WorkerReport {
    results: Vec<TransferResult>,
    started: bool,
    start_error: Option<AdapterError>,
}

type Queue = Arc<Mutex<VecDeque<Transfer>>>;

/// Run `transfers` through `adapter` using up to `requested_workers` workers.
///
/// Cancelling `cancel` aborts every worker; transfers that were in flight or
/// still queued are reported as [`AdapterError::Cancelled`].
pub async fn run_batch<A>(
    mut adapter: A,
    requested_workers: usize,
    transfers: Vec<Transfer>,
    callbacks: PoolCallbacks,
    cancel: CancellationToken,
) -> BatchReport
where
    A: TransferAdapter + 'static,
    A::Worker: 'static,
{
    let workers = adapter.begin(requested_workers.max(1)).max(1);
    info!(
        adapter = adapter.name(),
        direction = %adapter.direction(),
        workers,
        transfers = transfers.len(),
        "starting transfer batch"
    );

    let adapter = Arc::new(adapter);
    let queue: Queue = Arc::new(Mutex::new(transfers.into_iter().collect()));
    let callbacks = Arc::new(callbacks);

    let handles: Vec<_> = (0..workers)
        .map(|index| {
            tokio::spawn(run_worker(
                Arc::clone(&adapter),
                index,
                Arc::clone(&queue),
                Arc::clone(&callbacks),
                cancel.clone(),
            ))
        })
        .collect();

    let mut report = BatchReport::default();
    for joined in join_all(handles).await {
        match joined {
            Ok(worker) => {
                report.results.extend(worker.results);
                if worker.started {
                    report.workers_started += 1;
                }
                report.start_errors.extend(worker.start_error);
            }
            Err(e) => warn!(error = %e, "transfer worker task failed"),
        }
    }

    // Anything still queued was never picked up by a worker.
    let leftovers: Vec<Transfer> = queue.lock().await.drain(..).collect();
    if !leftovers.is_empty() {
        let reason = if report.start_errors.is_empty() {
            "workers exited before the queue drained".to_string()
        } else {
            report
                .start_errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        for transfer in leftovers {
            let outcome = if cancel.is_cancelled() {
                Err(AdapterError::Cancelled)
            } else {
                Err(AdapterError::NoWorkers(reason.clone()))
            };
            report.results.push(TransferResult { transfer, outcome });
        }
    }

    info!(
        workers_started = report.workers_started,
        succeeded = report.results.iter().filter(|r| r.is_ok()).count(),
        failed = report.failed().count(),
        "transfer batch finished"
    );
    report
}

async fn run_worker<A>(
    adapter: Arc<A>,
    index: usize,
    queue: Queue,
    callbacks: Arc<PoolCallbacks>,
    cancel: CancellationToken,
) -> WorkerReport
where
    A: TransferAdapter + 'static,
    A::Worker: 'static,
{
    let mut report = WorkerReport::default();

    let started = tokio::select! {
        _ = cancel.cancelled() => return report,
        started = adapter.worker_starting(index) => started,
    };
    let mut state = match started {
        Ok(state) => {
            report.started = true;
            state
        }
        Err(e) => {
            warn!(adapter = adapter.name(), worker = index, error = %e, "worker failed to start");
            report.start_error = Some(e);
            return report;
        }
    };

    loop {
        if cancel.is_cancelled() {
            adapter.worker_aborted(index, state).await;
            return report;
        }
        let Some(transfer) = queue.lock().await.pop_front() else {
            break;
        };

        let auth_ok = callbacks
            .auth_ok
            .clone()
            .map(|f| Box::new(move || f()) as AuthCallback);
        let outcome = {
            // A panic in the adapter or a callback fails just this transfer.
            let transfer_done = AssertUnwindSafe(adapter.do_transfer(
                &mut state,
                &transfer,
                callbacks.progress.as_ref(),
                auth_ok,
            ))
            .catch_unwind();
            tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = transfer_done => Some(outcome.unwrap_or_else(|payload| {
                    Err(AdapterError::Panicked(panic_message(&*payload)))
                })),
            }
        };

        let Some(outcome) = outcome else {
            report.results.push(TransferResult {
                transfer,
                outcome: Err(AdapterError::Cancelled),
            });
            adapter.worker_aborted(index, state).await;
            return report;
        };

        let fatal = matches!(&outcome, Err(e) if e.is_fatal());
        if let Err(e) = &outcome {
            warn!(worker = index, oid = transfer.oid(), error = %e, "transfer failed");
        }
        report.results.push(TransferResult { transfer, outcome });
        if fatal {
            // The worker's conversation with its agent is broken; retire it
            // and let the remaining workers drain the queue.
            adapter.worker_aborted(index, state).await;
            return report;
        }
    }

    adapter.worker_ending(index, state).await;
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
