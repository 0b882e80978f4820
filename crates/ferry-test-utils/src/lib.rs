//! Shared test utilities for ferry integration tests.
//!
//! Provides scriptable fake agents (POSIX `sh` scripts that speak the custom
//! transfer protocol) and recording collaborators for verifying what an
//! adapter did.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;

use ferry_core::transfer::{ObjectVerifier, TransferObject};

/// Write `body` to `dir/name` and make it executable.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("failed to write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("failed to make script executable");
    }

    path
}

/// Behaviour of a fake agent.
///
/// The generated script answers init, emits one progress line per entry in
/// `progress` followed by a completion for every transfer request, and exits
/// on terminate.
#[derive(Debug, Clone, Default)]
pub struct FakeAgent {
    /// Cumulative byte counts to report before completing each transfer.
    pub progress: Vec<u64>,
    /// Error string returned from init; the agent then hangs until killed.
    pub init_error: Option<String>,
    /// Error message embedded in every completion.
    pub transfer_error: Option<String>,
    /// Reply with this oid instead of the requested one.
    pub wrong_oid: Option<String>,
    /// Directory to report as the location of downloaded objects.
    pub download_dir: Option<PathBuf>,
    /// File the agent appends its pid to on startup.
    pub start_log: Option<PathBuf>,
    /// File the agent appends every request line to.
    pub request_log: Option<PathBuf>,
    /// Print this raw line instead of a completion.
    pub raw_reply: Option<String>,
    /// Exit status after terminate.
    pub exit_code: i32,
    /// Omit the `"event"` field from replies, like older agents.
    pub untagged: bool,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the agent as a shell script.
    pub fn script(&self) -> String {
        let tag = |event: &str| {
            if self.untagged {
                String::new()
            } else {
                format!(r#""event":"{event}","#)
            }
        };

        let mut s = String::from("#!/bin/sh\n");
        if let Some(log) = &self.start_log {
            writeln!(s, "echo \"$$\" >> '{}'", log.display()).unwrap();
        }
        s.push_str("while IFS= read -r line; do\n");
        if let Some(log) = &self.request_log {
            writeln!(s, "  printf '%s\\n' \"$line\" >> '{}'", log.display()).unwrap();
        }
        s.push_str("  case \"$line\" in\n");

        // init
        s.push_str("    *'\"event\":\"init\"'*)\n");
        match &self.init_error {
            Some(message) => {
                writeln!(s, "      printf '%s\\n' '{{\"error\":\"{message}\"}}'").unwrap();
                s.push_str("      exec sleep 30\n");
            }
            None => s.push_str("      printf '%s\\n' '{}'\n"),
        }
        s.push_str("      ;;\n");

        // terminate
        s.push_str("    *'\"event\":\"terminate\"'*)\n");
        writeln!(s, "      exit {}", self.exit_code).unwrap();
        s.push_str("      ;;\n");

        // upload / download
        s.push_str("    *'\"event\":\"upload\"'*|*'\"event\":\"download\"'*)\n");
        s.push_str(
            "      oid=$(printf '%s\\n' \"$line\" | sed -e 's/.*\"oid\":\"\\([^\"]*\\)\".*/\\1/')\n",
        );
        if let Some(wrong) = &self.wrong_oid {
            writeln!(s, "      oid='{wrong}'").unwrap();
        }
        let mut last = 0u64;
        for &so_far in &self.progress {
            let since = so_far.saturating_sub(last);
            last = so_far;
            writeln!(
                s,
                "      printf '{{{}\"oid\":\"%s\",\"bytesSoFar\":{so_far},\"bytesSinceLast\":{since}}}\\n' \"$oid\"",
                tag("progress")
            )
            .unwrap();
        }
        match (&self.raw_reply, &self.transfer_error) {
            (Some(raw), _) => {
                writeln!(s, "      printf '%s\\n' '{raw}'").unwrap();
            }
            (None, Some(message)) => {
                writeln!(
                    s,
                    "      printf '{{{}\"oid\":\"%s\",\"error\":{{\"code\":2,\"message\":\"{message}\"}}}}\\n' \"$oid\"",
                    tag("complete")
                )
                .unwrap();
            }
            (None, None) => match &self.download_dir {
                Some(dir) => {
                    writeln!(
                        s,
                        "      printf '{{{}\"oid\":\"%s\",\"path\":\"{}/%s\"}}\\n' \"$oid\" \"$oid\"",
                        tag("complete"),
                        dir.display()
                    )
                    .unwrap();
                }
                None => {
                    writeln!(s, "      printf '{{{}\"oid\":\"%s\"}}\\n' \"$oid\"", tag("complete"))
                        .unwrap();
                }
            },
        }
        s.push_str("      ;;\n");

        s.push_str("  esac\n");
        s.push_str("done\n");
        s
    }

    /// Write the agent into `dir` as an executable script.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        write_script(dir, name, &self.script())
    }
}

/// Read a line-per-entry log written by a fake agent. Missing file means
/// no entries.
pub fn read_log(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Whether a process with `pid` still exists (zombies excluded once reaped).
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs error checking only; nothing is delivered.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Verifier that records every object it is asked about.
#[derive(Debug, Default, Clone)]
pub struct RecordingVerifier {
    calls: Arc<Mutex<Vec<String>>>,
    fail_with: Option<String>,
}

impl RecordingVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier that records calls and then rejects every object.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            calls: Arc::default(),
            fail_with: Some(message.into()),
        }
    }

    /// Oids verified so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("verifier lock poisoned").clone()
    }
}

#[async_trait]
impl ObjectVerifier for RecordingVerifier {
    async fn verify(&self, object: &TransferObject) -> Result<()> {
        self.calls
            .lock()
            .expect("verifier lock poisoned")
            .push(object.oid.clone());
        match &self.fail_with {
            Some(message) => bail!("{message}"),
            None => Ok(()),
        }
    }
}

/// Progress reports captured as `(name, total, so_far, since_last)`.
pub type ProgressLog = Arc<Mutex<Vec<(String, u64, u64, u64)>>>;

/// A progress callback that appends every report to the returned log.
pub fn recording_progress() -> (ferry_core::transfer::ProgressCallback, ProgressLog) {
    let log: ProgressLog = Arc::default();
    let sink = Arc::clone(&log);
    let callback: ferry_core::transfer::ProgressCallback =
        Arc::new(move |name: &str, total: u64, so_far: u64, since: u64| {
            sink.lock()
                .expect("progress lock poisoned")
                .push((name.to_string(), total, so_far, since));
        });
    (callback, log)
}
