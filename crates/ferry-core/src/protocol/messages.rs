//! Wire messages exchanged with a custom transfer agent.
//!
//! Every message is one JSON object on one line. Requests we send carry an
//! `"event"` discriminant; agents that predate it ignore the extra field.
//! Responses may or may not carry it (see [`super::decode_one_of`]).

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::transfer::{Action, Direction};

/// Error embedded in a response, either `{"code": 2, "message": "..."}` or a
/// bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ObjectErrorRepr")]
pub struct ObjectError {
    pub code: i32,
    pub message: String,
}

impl ObjectError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            f.write_str(&self.message)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ObjectErrorRepr {
    Detailed {
        #[serde(default)]
        code: i32,
        message: String,
    },
    Message(String),
}

impl From<ObjectErrorRepr> for ObjectError {
    fn from(repr: ObjectErrorRepr) -> Self {
        match repr {
            ObjectErrorRepr::Detailed { code, message } => Self { code, message },
            ObjectErrorRepr::Message(message) => Self { code: 0, message },
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    pub operation: Direction,
    pub concurrent: bool,
    #[serde(rename = "concurrenttransfers")]
    pub concurrent_transfers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub oid: String,
    pub size: u64,
    /// Local file holding the object's bytes.
    pub path: PathBuf,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub oid: String,
    pub size: u64,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateRequest {
    pub complete: bool,
}

/// Anything we write to an agent's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Request {
    Init(InitRequest),
    Upload(UploadRequest),
    Download(DownloadRequest),
    Terminate(TerminateRequest),
}

impl Request {
    pub fn event(&self) -> &'static str {
        match self {
            Request::Init(_) => "init",
            Request::Upload(_) => "upload",
            Request::Download(_) => "download",
            Request::Terminate(_) => "terminate",
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ObjectError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub oid: String,
    #[serde(rename = "bytesSoFar")]
    pub bytes_so_far: u64,
    #[serde(rename = "bytesSinceLast")]
    pub bytes_since_last: u64,
}

/// Terminal response for one transfer, shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResponse {
    pub oid: String,
    /// Where a download was written. Always absent for uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ObjectError>,
}

/// Anything an agent writes to its stdout.
///
/// Only `Serialize` is derived; decoding goes through
/// [`super::decode_one_of`] so the caller controls which shapes are
/// acceptable at each point of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Response {
    Init(InitResponse),
    Progress(ProgressResponse),
    Complete(TransferResponse),
}
