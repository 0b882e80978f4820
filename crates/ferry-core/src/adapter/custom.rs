//! Adapter that delegates each transfer to an external agent process.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::TransferAdapter;
use crate::error::AdapterError;
use crate::protocol::{
    DownloadRequest, InitRequest, Request, Response, ResponseKind, TransferResponse,
    UploadRequest,
};
use crate::registry::AdapterDefinition;
use crate::session::WorkerSession;
use crate::transfer::{
    AdapterServices, AuthCallback, Direction, ProgressCallback, Transfer, TransferObject,
    TransferOutcome,
};

/// Transfer count reported to agents when `begin` has not been called.
pub const DEFAULT_CONCURRENT_TRANSFERS: usize = 3;

/// Replies accepted while a transfer is in flight. Progress comes first so an
/// untagged line with progress fields is never mistaken for completion.
const TRANSFER_RESPONSES: [ResponseKind; 2] = [ResponseKind::Progress, ResponseKind::Complete];

/// A custom transfer adapter bound to one definition and one direction.
///
/// Created once per worker-pool session; every worker gets its own
/// [`WorkerSession`].
#[derive(Debug)]
pub struct CustomAdapter {
    definition: Arc<AdapterDefinition>,
    direction: Direction,
    services: AdapterServices,
    requested_concurrency: usize,
}

impl CustomAdapter {
    pub fn new(
        definition: Arc<AdapterDefinition>,
        direction: Direction,
        services: AdapterServices,
    ) -> Self {
        Self {
            definition,
            direction,
            services,
            requested_concurrency: DEFAULT_CONCURRENT_TRANSFERS,
        }
    }

    pub fn definition(&self) -> &AdapterDefinition {
        &self.definition
    }

    fn init_request(&self) -> InitRequest {
        InitRequest {
            operation: self.direction,
            concurrent: self.definition.concurrent(),
            concurrent_transfers: self.requested_concurrency,
        }
    }

    fn transfer_request(&self, object: &TransferObject) -> Result<Request, AdapterError> {
        let rel = self.direction.rel();
        let action = object
            .rel(rel)
            .ok_or_else(|| AdapterError::MissingAction {
                oid: object.oid.clone(),
                rel,
            })?
            .clone();

        Ok(match self.direction {
            Direction::Upload => Request::Upload(UploadRequest {
                oid: object.oid.clone(),
                size: object.size,
                path: self.services.resolver.object_path(&object.oid),
                action,
            }),
            Direction::Download => Request::Download(DownloadRequest {
                oid: object.oid.clone(),
                size: object.size,
                action,
            }),
        })
    }

    /// Send the request and follow the agent's replies until the terminal one.
    async fn exchange_transfer(
        &self,
        session: &mut WorkerSession,
        transfer: &Transfer,
        request: Request,
        progress: Option<&ProgressCallback>,
        mut auth_ok: Option<AuthCallback>,
    ) -> Result<TransferResponse, AdapterError> {
        let oid = transfer.oid();
        let channel = session.channel()?;
        channel.send(&request).await?;

        loop {
            let (_, response) = channel.read_one_of(&TRANSFER_RESPONSES).await?;
            match response {
                Response::Progress(report) => {
                    expect_oid(oid, &report.oid)?;
                    if let Some(progress) = progress {
                        progress(
                            &transfer.name,
                            transfer.object.size,
                            report.bytes_so_far,
                            report.bytes_since_last,
                        );
                    }
                    // Bytes moving means the remote accepted our credentials.
                    if report.bytes_so_far > 0 {
                        signal_auth(&mut auth_ok);
                    }
                }
                Response::Complete(done) => {
                    expect_oid(oid, &done.oid)?;
                    if let Some(error) = done.error {
                        return Err(AdapterError::Transfer {
                            oid: oid.to_string(),
                            error,
                        });
                    }
                    signal_auth(&mut auth_ok);
                    return Ok(done);
                }
                Response::Init(_) => {
                    return Err(AdapterError::Protocol(
                        "init response received during a transfer".to_string(),
                    ));
                }
            }
        }
    }
}

fn expect_oid(expected: &str, actual: &str) -> Result<(), AdapterError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AdapterError::Protocol(format!(
            "unexpected oid {actual:?} in response, expecting {expected:?}"
        )))
    }
}

fn signal_auth(auth_ok: &mut Option<AuthCallback>) {
    if let Some(callback) = auth_ok.take() {
        callback();
    }
}

#[async_trait]
impl TransferAdapter for CustomAdapter {
    type Worker = WorkerSession;

    fn name(&self) -> &str {
        self.definition.name()
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn begin(&mut self, max_concurrency: usize) -> usize {
        self.requested_concurrency = max_concurrency;
        let effective = if self.definition.concurrent() {
            max_concurrency
        } else {
            1
        };
        info!(
            adapter = self.name(),
            direction = %self.direction,
            requested = max_concurrency,
            effective,
            "custom transfer adapter using concurrency {effective}"
        );
        effective
    }

    async fn worker_starting(&self, worker: usize) -> Result<WorkerSession, AdapterError> {
        debug!(adapter = self.name(), worker, "starting custom transfer process");
        WorkerSession::start(&self.definition, worker, self.init_request()).await
    }

    async fn do_transfer(
        &self,
        session: &mut WorkerSession,
        transfer: &Transfer,
        progress: Option<&ProgressCallback>,
        auth_ok: Option<AuthCallback>,
    ) -> Result<TransferOutcome, AdapterError> {
        if !session.is_ready() {
            return Err(AdapterError::NotStarted {
                adapter: self.name().to_string(),
            });
        }
        let request = self.transfer_request(&transfer.object)?;

        let done = match self
            .exchange_transfer(session, transfer, request, progress, auth_ok)
            .await
        {
            Ok(done) => done,
            Err(e) => {
                if e.is_fatal() {
                    warn!(
                        adapter = self.name(),
                        worker = session.worker(),
                        oid = transfer.oid(),
                        error = %e,
                        "fatal error talking to custom transfer agent"
                    );
                    session.abort();
                }
                return Err(e);
            }
        };

        match self.direction {
            Direction::Upload => {
                self.services
                    .verifier
                    .verify(&transfer.object)
                    .await
                    .map_err(|source| AdapterError::Verify {
                        oid: transfer.oid().to_string(),
                        source,
                    })?;
                Ok(TransferOutcome::Uploaded)
            }
            Direction::Download => Ok(TransferOutcome::Downloaded { path: done.path }),
        }
    }

    async fn worker_ending(&self, worker: usize, mut session: WorkerSession) {
        if !session.is_ready() {
            session.kill().await;
            return;
        }
        if let Err(e) = session.shutdown().await {
            warn!(
                adapter = self.name(),
                worker,
                error = %e,
                "error finishing up custom transfer process, aborting"
            );
            session.kill().await;
        } else {
            debug!(adapter = self.name(), worker, "custom transfer process finished");
        }
    }

    async fn worker_aborted(&self, _worker: usize, mut session: WorkerSession) {
        session.kill().await;
    }
}
