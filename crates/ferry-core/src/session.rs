//! One agent process and its pipes, owned by exactly one worker.
//!
//! A [`WorkerSession`] only exists after a successful init handshake. It is
//! torn down either gracefully ([`WorkerSession::shutdown`]) or forcibly
//! ([`WorkerSession::abort`]); once torn down it refuses further traffic.
//! Agents are spawned with `kill_on_drop`, so a session that is dropped on
//! any path still takes its process with it.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::AdapterError;
use crate::protocol::{
    InitRequest, MessageChannel, Request, Response, ResponseKind, TerminateRequest,
};
use crate::registry::AdapterDefinition;

/// How long an agent gets to exit after being asked to terminate.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type AgentChannel = MessageChannel<BufReader<ChildStdout>, ChildStdin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Ready,
    Closed,
    Aborted,
}

/// A running agent that has accepted its init request.
#[derive(Debug)]
pub struct WorkerSession {
    adapter: String,
    worker: usize,
    pid: Option<u32>,
    child: Child,
    channel: Option<AgentChannel>,
    state: SessionState,
}

impl WorkerSession {
    /// Launch the agent described by `definition` and perform the init
    /// handshake.
    ///
    /// If the handshake fails for any reason the process is killed and
    /// reaped before the error is returned.
    pub async fn start(
        definition: &AdapterDefinition,
        worker: usize,
        init: InitRequest,
    ) -> Result<Self, AdapterError> {
        let spawn_error = |source| AdapterError::Spawn {
            path: definition.path().to_path_buf(),
            source,
        };

        let mut child = Command::new(definition.path())
            .args(definition.argv())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            return Err(spawn_error(std::io::Error::other("agent pipes were not captured")));
        };

        let pid = child.id();
        debug!(adapter = definition.name(), worker, ?pid, "spawned custom transfer agent");

        let channel = MessageChannel::new(BufReader::new(stdout), stdin)
            .with_read_timeout(definition.read_timeout());
        let mut session = Self {
            adapter: definition.name().to_string(),
            worker,
            pid,
            child,
            channel: Some(channel),
            state: SessionState::Ready,
        };

        match session.handshake(init).await {
            Ok(()) => {
                info!(adapter = %session.adapter, worker, ?pid, "custom transfer agent started");
                Ok(session)
            }
            Err(e) => {
                warn!(adapter = %session.adapter, worker, error = %e, "init handshake failed, aborting agent");
                session.kill().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, init: InitRequest) -> Result<(), AdapterError> {
        let response = self
            .channel()?
            .exchange(&Request::Init(init), Some(ResponseKind::Init))
            .await?;
        match response {
            Some(Response::Init(resp)) => match resp.error {
                Some(error) => Err(AdapterError::Handshake {
                    adapter: self.adapter.clone(),
                    error,
                }),
                None => Ok(()),
            },
            other => Err(AdapterError::Protocol(format!(
                "expected init response, got {other:?}"
            ))),
        }
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// OS process id of the agent, while it is running.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `true` until the session is shut down or aborted.
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// The live message channel, or `NotStarted` once torn down.
    pub fn channel(&mut self) -> Result<&mut AgentChannel, AdapterError> {
        match (self.state, self.channel.as_mut()) {
            (SessionState::Ready, Some(channel)) => Ok(channel),
            _ => Err(AdapterError::NotStarted {
                adapter: self.adapter.clone(),
            }),
        }
    }

    /// Ask the agent to terminate, close both pipes and wait for it to exit.
    ///
    /// Errors mean the agent did not go quietly; callers fall back to
    /// [`WorkerSession::kill`].
    pub async fn shutdown(&mut self) -> Result<(), AdapterError> {
        let terminate = Request::Terminate(TerminateRequest { complete: true });
        self.channel()?.exchange(&terminate, None).await?;

        // Dropping the channel closes stdin and stdout.
        self.channel = None;
        self.state = SessionState::Closed;

        let status = tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait())
            .await
            .map_err(|_| AdapterError::Shutdown {
                adapter: self.adapter.clone(),
                grace: SHUTDOWN_GRACE,
            })??;
        self.pid = None;

        if status.success() {
            debug!(adapter = %self.adapter, worker = self.worker, "custom transfer agent exited");
            Ok(())
        } else {
            Err(AdapterError::Exit {
                adapter: self.adapter.clone(),
                status,
            })
        }
    }

    /// Close both pipes and kill the process without waiting.
    ///
    /// Safe to call any number of times, in any state.
    pub fn abort(&mut self) {
        if self.state == SessionState::Ready {
            warn!(adapter = %self.adapter, worker = self.worker, pid = ?self.pid, "aborting custom transfer agent");
        }
        self.channel = None;
        self.state = SessionState::Aborted;
        if self.pid.is_some() {
            let _ = self.child.start_kill();
        }
    }

    /// [`WorkerSession::abort`], then reap the process.
    pub async fn kill(&mut self) {
        self.abort();
        if self.pid.take().is_some() {
            let _ = self.child.wait().await;
        }
    }
}

impl Drop for WorkerSession {
    fn drop(&mut self) {
        if self.state == SessionState::Ready {
            self.abort();
        }
    }
}
