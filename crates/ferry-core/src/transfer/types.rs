//! Transfer units and the values reported back for them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Which way object bytes flow for an adapter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    /// The action relation an object must carry for this direction.
    pub fn rel(self) -> &'static str {
        match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rel())
    }
}

/// A pre-resolved resource action: where to send or fetch the bytes and
/// with which headers. Handed to the agent verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub href: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl Action {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            header: BTreeMap::new(),
            expires_at: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }
}

/// An object known to the server, with its resolved actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferObject {
    pub oid: String,
    pub size: u64,
    #[serde(default)]
    pub actions: BTreeMap<String, Action>,
}

impl TransferObject {
    pub fn new(oid: impl Into<String>, size: u64) -> Self {
        Self {
            oid: oid.into(),
            size,
            actions: BTreeMap::new(),
        }
    }

    /// Attach an action under the given relation name.
    pub fn with_action(mut self, rel: impl Into<String>, action: Action) -> Self {
        self.actions.insert(rel.into(), action);
        self
    }

    /// Look up the action for a relation such as `"upload"`.
    pub fn rel(&self, rel: &str) -> Option<&Action> {
        self.actions.get(rel)
    }
}

/// One unit of work handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Display name used in progress reports (usually the tracked file path).
    pub name: String,
    pub object: TransferObject,
}

impl Transfer {
    pub fn new(name: impl Into<String>, object: TransferObject) -> Self {
        Self {
            name: name.into(),
            object,
        }
    }

    pub fn oid(&self) -> &str {
        &self.object.oid
    }
}

/// What a successful transfer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The object was uploaded and verified.
    Uploaded,
    /// The object was downloaded; `path` is where the agent left it, if it said.
    Downloaded { path: Option<PathBuf> },
}

/// Final report for one transfer.
#[derive(Debug)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub outcome: Result<TransferOutcome, AdapterError>,
}

impl TransferResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Progress reporter: `(transfer name, total size, bytes so far, bytes since last report)`.
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64, u64) + Send + Sync>;

/// Signalled the first time a transfer shows that credentials were accepted.
pub type AuthCallback = Box<dyn FnOnce() + Send>;
