//! Line-oriented JSON protocol spoken with custom transfer agents.
//!
//! ```text
//! ferry                                  agent
//!   | -- {"event":"init",...} ------------> |
//!   | <------------------------- {} ------- |
//!   | -- {"event":"upload",...} ----------> |
//!   | <--- {"event":"progress",...} ------- |   (zero or more)
//!   | <--- {"event":"complete",...} ------- |
//!   | -- {"event":"terminate",...} -------> |
//! ```

pub mod channel;
pub mod messages;

use serde::Deserialize;
use serde_json::Value;

use crate::error::AdapterError;

pub use channel::MessageChannel;
pub use messages::{
    DownloadRequest, InitRequest, InitResponse, ObjectError, ProgressResponse, Request,
    Response, TerminateRequest, TransferResponse, UploadRequest,
};

/// A response shape the caller is prepared to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Init,
    Progress,
    Complete,
}

impl ResponseKind {
    /// Value of the `"event"` field identifying this shape.
    pub fn tag(self) -> &'static str {
        match self {
            ResponseKind::Init => "init",
            ResponseKind::Progress => "progress",
            ResponseKind::Complete => "complete",
        }
    }

    /// Whether `value` carries keys that only this shape uses. Such a line
    /// must decode as this shape or not at all.
    fn claims(self, value: &Value) -> bool {
        match self {
            ResponseKind::Progress => {
                value.get("bytesSoFar").is_some() || value.get("bytesSinceLast").is_some()
            }
            ResponseKind::Init | ResponseKind::Complete => false,
        }
    }

    fn decode(self, value: &Value) -> Result<Response, serde_json::Error> {
        Ok(match self {
            ResponseKind::Init => Response::Init(InitResponse::deserialize(value)?),
            ResponseKind::Progress => Response::Progress(ProgressResponse::deserialize(value)?),
            ResponseKind::Complete => Response::Complete(TransferResponse::deserialize(value)?),
        })
    }
}

/// Decode one line against an ordered list of acceptable shapes.
///
/// A line with a string `"event"` field is decoded strictly as the matching
/// candidate. A line without one is tried against each candidate in order and
/// the first that decodes wins, so more specific shapes must come first. A
/// candidate whose own keys are present but which fails to decode makes the
/// line malformed; it is never handed to a looser shape instead.
/// Returns the index of the chosen candidate alongside the decoded value.
pub fn decode_one_of(
    line: &str,
    candidates: &[ResponseKind],
) -> Result<(usize, Response), AdapterError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| AdapterError::Protocol(format!("unparseable response {line:?}: {e}")))?;
    if !value.is_object() {
        return Err(AdapterError::Protocol(format!(
            "response {line:?} is not a JSON object"
        )));
    }

    if let Some(tag) = value.get("event").and_then(Value::as_str) {
        let Some(index) = candidates.iter().position(|kind| kind.tag() == tag) else {
            return Err(AdapterError::Protocol(format!(
                "unexpected {tag:?} response {line:?}, expected one of {candidates:?}"
            )));
        };
        return candidates[index]
            .decode(&value)
            .map(|response| (index, response))
            .map_err(|e| AdapterError::Protocol(format!("malformed {tag:?} response {line:?}: {e}")));
    }

    for kind in candidates.iter().filter(|kind| kind.claims(&value)) {
        if let Err(e) = kind.decode(&value) {
            return Err(AdapterError::Protocol(format!(
                "malformed {:?} response {line:?}: {e}",
                kind.tag()
            )));
        }
    }

    candidates
        .iter()
        .enumerate()
        .find_map(|(index, kind)| kind.decode(&value).ok().map(|response| (index, response)))
        .ok_or_else(|| {
            AdapterError::Protocol(format!(
                "response {line:?} did not match any of {candidates:?}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER_CANDIDATES: [ResponseKind; 2] = [ResponseKind::Progress, ResponseKind::Complete];

    #[test]
    fn untagged_progress_line_matches_first_candidate() {
        // Satisfies both the progress and the completion schema.
        let line = r#"{"oid":"abc","bytesSoFar":10,"bytesSinceLast":10}"#;
        let (index, response) = decode_one_of(line, &TRANSFER_CANDIDATES).unwrap();
        assert_eq!(index, 0);
        assert_eq!(
            response,
            Response::Progress(ProgressResponse {
                oid: "abc".to_string(),
                bytes_so_far: 10,
                bytes_since_last: 10,
            })
        );
    }

    #[test]
    fn first_match_depends_on_order() {
        let line = r#"{"oid":"abc","bytesSoFar":10,"bytesSinceLast":10}"#;
        let (index, response) =
            decode_one_of(line, &[ResponseKind::Complete, ResponseKind::Progress]).unwrap();
        assert_eq!(index, 0);
        assert!(matches!(response, Response::Complete(_)));
    }

    #[test]
    fn untagged_completion_skips_progress() {
        let line = r#"{"oid":"abc","path":"/tmp/abc"}"#;
        let (index, response) = decode_one_of(line, &TRANSFER_CANDIDATES).unwrap();
        assert_eq!(index, 1);
        let Response::Complete(done) = response else {
            panic!("expected completion, got {response:?}");
        };
        assert_eq!(done.path.as_deref(), Some(std::path::Path::new("/tmp/abc")));
    }

    #[test]
    fn tag_overrides_probe_order() {
        let line = r#"{"event":"complete","oid":"abc","bytesSoFar":10,"bytesSinceLast":10}"#;
        let (index, response) = decode_one_of(line, &TRANSFER_CANDIDATES).unwrap();
        assert_eq!(index, 1);
        assert!(matches!(response, Response::Complete(_)));
    }

    #[test]
    fn unexpected_tag_is_protocol_error() {
        let line = r#"{"event":"init"}"#;
        let err = decode_one_of(line, &TRANSFER_CANDIDATES).unwrap_err();
        assert!(matches!(err, AdapterError::Protocol(_)), "got {err:?}");
    }

    #[test]
    fn tagged_line_missing_fields_is_protocol_error() {
        let line = r#"{"event":"progress","oid":"abc"}"#;
        let err = decode_one_of(line, &TRANSFER_CANDIDATES).unwrap_err();
        assert!(err.to_string().contains("malformed"), "got {err}");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let line = r#"{"oid":"abc","bytesSoFar":1,"bytesSinceLast":1,"rate":"fast"}"#;
        let (index, _) = decode_one_of(line, &TRANSFER_CANDIDATES).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn garbage_is_protocol_error() {
        let err = decode_one_of("not json at all", &TRANSFER_CANDIDATES).unwrap_err();
        assert!(matches!(err, AdapterError::Protocol(_)));
        let err = decode_one_of("[1,2,3]", &[ResponseKind::Init]).unwrap_err();
        assert!(matches!(err, AdapterError::Protocol(_)));
    }

    #[test]
    fn shape_matching_no_candidate_is_protocol_error() {
        let err = decode_one_of(r#"{"size":1}"#, &TRANSFER_CANDIDATES).unwrap_err();
        assert!(err.to_string().contains("did not match"), "got {err}");
    }

    #[test]
    fn broken_progress_line_is_not_taken_as_completion() {
        for line in [
            r#"{"oid":"abc","bytesSoFar":-1,"bytesSinceLast":0}"#,
            r#"{"oid":"abc","bytesSoFar":1.5,"bytesSinceLast":1}"#,
            r#"{"oid":"abc","bytesSinceLast":3}"#,
        ] {
            let err = decode_one_of(line, &TRANSFER_CANDIDATES).unwrap_err();
            assert!(err.to_string().contains("malformed"), "{line}: {err}");
            let err = decode_one_of(line, &[ResponseKind::Complete, ResponseKind::Progress])
                .unwrap_err();
            assert!(matches!(err, AdapterError::Protocol(_)), "{line}: {err:?}");
        }
    }

    #[test]
    fn empty_object_is_a_valid_init_response() {
        let (index, response) = decode_one_of("{}", &[ResponseKind::Init]).unwrap();
        assert_eq!(index, 0);
        assert_eq!(response, Response::Init(InitResponse::default()));
    }
}
