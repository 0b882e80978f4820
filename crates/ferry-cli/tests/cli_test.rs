//! Integration tests for the `ferry` binary.
//!
//! Each test writes a config file, a manifest and a fake agent script into a
//! temp directory and runs the compiled binary against them.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

use ferry_test_utils::{FakeAgent, read_log};

fn ferry(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ferry"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run ferry")
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).expect("failed to write config");
    path
}

fn write_manifest(dir: &Path, oids: &[&str]) -> PathBuf {
    let entries: Vec<String> = oids
        .iter()
        .map(|oid| {
            format!(
                r#"{{"oid":"{oid}","size":4,"actions":{{"upload":{{"href":"https://h/{oid}"}},"download":{{"href":"https://h/{oid}"}}}}}}"#
            )
        })
        .collect();
    let path = dir.join("manifest.json");
    std::fs::write(&path, format!("[{}]", entries.join(","))).expect("failed to write manifest");
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn adapters_lists_configuration() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[lfs.customtransfer.pull]
path = "/opt/agents/pull"
direction = "download"

[lfs.customtransfer.broken]
path = "/opt/agents/broken"
concurrent = "sometimes"
"#,
    );

    let output = ferry(&config, &["adapters"]);
    assert!(output.status.success(), "{output:?}");
    let out = stdout(&output);
    assert!(out.contains("upload adapters:\n  (none)\n"), "{out}");
    assert!(out.contains("download adapters:\n  pull: /opt/agents/pull\n"), "{out}");
    assert!(out.contains("Configuration errors:"), "{out}");
    assert!(out.contains("sometimes"), "{out}");
}

#[test]
fn transfer_runs_manifest_through_agent() {
    let dir = TempDir::new().unwrap();
    let start_log = dir.path().join("starts.log");
    let agent = FakeAgent {
        progress: vec![2, 4],
        start_log: Some(start_log.clone()),
        ..FakeAgent::new()
    }
    .write(dir.path(), "agent.sh");
    let config = write_config(
        dir.path(),
        &format!(
            "[lfs.customtransfer.shipper]\npath = \"{}\"\nconcurrent = false\n",
            agent.display()
        ),
    );
    let manifest = write_manifest(dir.path(), &["aaaa0001", "aaaa0002", "aaaa0003"]);

    let output = ferry(
        &config,
        &[
            "transfer",
            "shipper",
            "--direction",
            "upload",
            "--manifest",
            manifest.to_str().unwrap(),
            "--objects-dir",
            dir.path().to_str().unwrap(),
        ],
    );

    assert!(output.status.success(), "{output:?}");
    let out = stdout(&output);
    assert!(out.contains("  [+] aaaa0001\n"), "{out}");
    assert!(out.contains("3/3 transferred with 1 worker(s)"), "{out}");
    assert_eq!(read_log(&start_log).len(), 1, "serial adapter runs one agent");
}

#[test]
fn failed_transfers_exit_nonzero() {
    let dir = TempDir::new().unwrap();
    let agent = FakeAgent {
        transfer_error: Some("no such object".to_string()),
        ..FakeAgent::new()
    }
    .write(dir.path(), "agent.sh");
    let config = write_config(
        dir.path(),
        &format!("[lfs.customtransfer.fetch]\npath = \"{}\"\n", agent.display()),
    );
    let manifest = write_manifest(dir.path(), &["bbbb0001"]);

    let output = ferry(
        &config,
        &[
            "transfer",
            "fetch",
            "--direction",
            "download",
            "--manifest",
            manifest.to_str().unwrap(),
        ],
    );

    assert!(!output.status.success());
    let out = stdout(&output);
    assert!(out.contains("[!] bbbb0001"), "{out}");
    assert!(out.contains("no such object"), "{out}");
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.contains("1 of 1 transfers failed"), "{err}");
}

#[test]
fn unknown_adapter_is_an_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "");
    let manifest = write_manifest(dir.path(), &["cccc0001"]);

    let output = ferry(
        &config,
        &[
            "transfer",
            "nowhere",
            "--direction",
            "upload",
            "--manifest",
            manifest.to_str().unwrap(),
        ],
    );

    assert!(!output.status.success());
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.contains("no custom transfer adapters configured for upload"), "{err}");
}

#[test]
fn namespace_flag_selects_section() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "[media.customtransfer.cdn]\npath = \"/opt/cdn\"\ndirection = \"upload\"\n",
    );

    let output = ferry(&config, &["--namespace", "media", "adapters"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("upload adapters:\n  cdn: /opt/cdn\n"));

    let output = ferry(&config, &["adapters"]);
    assert!(stdout(&output).contains("upload adapters:\n  (none)\n"));
}
