//! Error types for adapter configuration and agent communication.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use crate::protocol::ObjectError;
use crate::transfer::Direction;

/// Problems found while turning configuration entries into adapter
/// registrations. None of these are fatal to the host; the offending
/// adapter is simply not registered.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid boolean {value:?} for {key}")]
    InvalidBool { key: String, value: String },

    #[error("invalid direction {value:?} for {key} (expected upload, download, or both)")]
    InvalidDirection { key: String, value: String },

    #[error("invalid timeout {value:?} for {key} (expected whole seconds)")]
    InvalidTimeout { key: String, value: String },

    #[error("custom transfer adapter {name:?} has an empty path")]
    EmptyPath { name: String },

    #[error("custom transfer adapter {name:?} is already registered for {direction}")]
    Duplicate { name: String, direction: Direction },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Errors raised while starting, driving, or stopping an agent process.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("failed to start custom transfer command {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("custom transfer {adapter:?} rejected initiation: {error}")]
    Handshake { adapter: String, error: ObjectError },

    #[error("custom transfer {adapter:?} was not properly initialized, see previous errors")]
    NotStarted { adapter: String },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("agent I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response from agent within {0:?}")]
    Timeout(Duration),

    #[error("object {oid} has no {rel:?} action; it was not found on the server")]
    MissingAction { oid: String, rel: &'static str },

    #[error("error transferring {oid}: {error}")]
    Transfer { oid: String, error: ObjectError },

    #[error("verification of {oid} failed: {source}")]
    Verify {
        oid: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("custom transfer {adapter:?} exited with {status}")]
    Exit { adapter: String, status: ExitStatus },

    #[error("custom transfer {adapter:?} did not exit within {grace:?} of terminating")]
    Shutdown { adapter: String, grace: Duration },

    #[error("no workers could be started: {0}")]
    NoWorkers(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("transfer worker panicked: {0}")]
    Panicked(String),
}

impl AdapterError {
    /// Whether the worker that produced this error must be torn down.
    ///
    /// Object-level failures leave the agent in a known state, so the same
    /// worker can carry on with the next transfer. Everything else means the
    /// conversation with the agent can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AdapterError::Transfer { .. }
                | AdapterError::Verify { .. }
                | AdapterError::MissingAction { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_level_errors_are_not_fatal() {
        let err = AdapterError::Transfer {
            oid: "abc".to_string(),
            error: ObjectError::new(404, "not found"),
        };
        assert!(!err.is_fatal());
        assert!(
            !AdapterError::MissingAction {
                oid: "abc".to_string(),
                rel: "upload",
            }
            .is_fatal()
        );
    }

    #[test]
    fn communication_errors_are_fatal() {
        assert!(AdapterError::Protocol("bad line".to_string()).is_fatal());
        assert!(AdapterError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(
            AdapterError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_fatal()
        );
    }

    #[test]
    fn transfer_error_message_names_the_object() {
        let err = AdapterError::Transfer {
            oid: "deadbeef".to_string(),
            error: ObjectError::new(0, "disk full"),
        };
        let msg = err.to_string();
        assert!(msg.contains("deadbeef"), "got: {msg}");
        assert!(msg.contains("disk full"), "got: {msg}");
    }
}
