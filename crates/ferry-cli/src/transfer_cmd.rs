//! `ferry transfer` command: run a manifest of objects through one adapter.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ferry_core::transfer::ProgressCallback;
use ferry_core::{
    AdapterRegistry, AdapterServices, BatchReport, Direction, LocalObjectStore, PoolCallbacks,
    SkipVerify, Transfer, TransferObject, TransferOutcome, run_batch,
};

/// Arguments for one `ferry transfer` invocation.
#[derive(Debug)]
pub struct TransferArgs {
    pub adapter: String,
    pub direction: Direction,
    pub manifest: PathBuf,
    pub workers: usize,
    pub objects_dir: PathBuf,
}

/// One manifest entry: an object plus an optional display name.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    object: TransferObject,
}

/// Read a manifest: a JSON array of objects with their resolved actions.
pub fn load_manifest(path: &Path) -> Result<Vec<Transfer>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest at {}", path.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse manifest at {}", path.display()))?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let name = entry.name.unwrap_or_else(|| entry.object.oid.clone());
            Transfer::new(name, entry.object)
        })
        .collect())
}

/// Run the transfer command. Fails if any transfer failed.
pub async fn run_transfer(registry: &AdapterRegistry, args: TransferArgs) -> Result<()> {
    let transfers = load_manifest(&args.manifest)?;

    let services = AdapterServices::new(
        Arc::new(LocalObjectStore::new(&args.objects_dir)),
        Arc::new(SkipVerify),
    );
    let Some(adapter) = registry.new_adapter(&args.adapter, args.direction, services) else {
        let known = registry.names(args.direction);
        if known.is_empty() {
            bail!("no custom transfer adapters configured for {}", args.direction);
        }
        bail!(
            "no custom transfer adapter {:?} for {} (available: {})",
            args.adapter,
            args.direction,
            known.join(", ")
        );
    };

    if transfers.is_empty() {
        println!("Manifest is empty, nothing to transfer.");
        return Ok(());
    }

    // First signal cancels the batch, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_signal.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nCancelling transfers (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    let progress: ProgressCallback = Arc::new(|name: &str, total: u64, so_far: u64, _since: u64| {
        info!(name, so_far, total, "transfer progress");
    });
    let callbacks = PoolCallbacks {
        progress: Some(progress),
        auth_ok: Some(Arc::new(|| debug!("agent confirmed credentials"))),
    };

    let total = transfers.len();
    let report = run_batch(adapter, args.workers, transfers, callbacks, cancel).await;
    print!("{}", summarize(&report));

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{failed} of {total} transfers failed");
    }
    Ok(())
}

fn summarize(report: &BatchReport) -> String {
    let mut out = String::new();
    for result in &report.results {
        let name = &result.transfer.name;
        let line = match &result.outcome {
            Ok(TransferOutcome::Uploaded) => format!("  [+] {name}"),
            Ok(TransferOutcome::Downloaded { path: Some(path) }) => {
                format!("  [+] {name} -> {}", path.display())
            }
            Ok(TransferOutcome::Downloaded { path: None }) => format!("  [+] {name}"),
            Err(e) => format!("  [!] {name}: {e}"),
        };
        out.push_str(&line);
        out.push('\n');
    }
    for error in &report.start_errors {
        out.push_str(&format!("  worker failed to start: {error}\n"));
    }
    let ok = report.results.iter().filter(|r| r.is_ok()).count();
    out.push_str(&format!(
        "{ok}/{} transferred with {} worker(s)\n",
        report.results.len(),
        report.workers_started
    ));
    out
}

#[cfg(test)]
mod tests {
    use ferry_core::{AdapterError, TransferResult};

    use super::*;

    #[test]
    fn manifest_names_default_to_oid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "video.mp4", "oid": "aaaa", "size": 10,
                 "actions": {"upload": {"href": "https://h/aaaa", "header": {"Authorization": "Basic x"}}}},
                {"oid": "bbbb", "size": 20}
            ]"#,
        )
        .unwrap();

        let transfers = load_manifest(&path).unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].name, "video.mp4");
        let action = transfers[0].object.rel("upload").unwrap();
        assert_eq!(action.header["Authorization"], "Basic x");
        assert_eq!(transfers[1].name, "bbbb");
        assert!(transfers[1].object.actions.is_empty());
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"oid": "not-an-array"}"#).unwrap();
        let err = load_manifest(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse manifest"));
    }

    #[test]
    fn summary_marks_failures() {
        let report = BatchReport {
            results: vec![
                TransferResult {
                    transfer: Transfer::new("a.bin", TransferObject::new("aaaa", 1)),
                    outcome: Ok(TransferOutcome::Downloaded {
                        path: Some(PathBuf::from("/tmp/aaaa")),
                    }),
                },
                TransferResult {
                    transfer: Transfer::new("b.bin", TransferObject::new("bbbb", 1)),
                    outcome: Err(AdapterError::Cancelled),
                },
            ],
            workers_started: 2,
            start_errors: Vec::new(),
        };
        let out = summarize(&report);
        assert!(out.contains("  [+] a.bin -> /tmp/aaaa\n"), "{out}");
        assert!(out.contains("  [!] b.bin: "), "{out}");
        assert!(out.ends_with("1/2 transferred with 2 worker(s)\n"), "{out}");
    }

    #[tokio::test]
    async fn unknown_adapter_lists_alternatives() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(&manifest, "[]").unwrap();

        let mut registry = AdapterRegistry::new();
        registry
            .register(ferry_core::AdapterDefinition::new("known", "/bin/true"))
            .unwrap();

        let err = run_transfer(
            &registry,
            TransferArgs {
                adapter: "missing".into(),
                direction: Direction::Upload,
                manifest,
                workers: 1,
                objects_dir: dir.path().to_path_buf(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("available: known"), "{err}");
    }
}
