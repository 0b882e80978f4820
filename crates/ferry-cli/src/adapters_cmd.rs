//! `ferry adapters` command: list configured adapters per direction.

use anyhow::Result;

use ferry_core::{AdapterRegistry, ConfigureReport, Direction};

/// Print every registered adapter, then any configuration problems.
pub fn run_adapters(registry: &AdapterRegistry, report: &ConfigureReport) -> Result<()> {
    print!("{}", render(registry, report));
    Ok(())
}

fn render(registry: &AdapterRegistry, report: &ConfigureReport) -> String {
    let mut out = String::new();
    for direction in [Direction::Upload, Direction::Download] {
        out.push_str(&format!("{direction} adapters:\n"));
        let names = registry.names(direction);
        if names.is_empty() {
            out.push_str("  (none)\n");
        }
        for name in names {
            let Some(definition) = registry.get(name, direction) else {
                continue;
            };
            let mut line = format!("  {name}: {}", definition.path().display());
            if !definition.args().is_empty() {
                line.push_str(&format!(" {}", definition.args()));
            }
            if !definition.concurrent() {
                line.push_str(" (serial)");
            }
            if let Some(timeout) = definition.read_timeout() {
                line.push_str(&format!(" (timeout {}s)", timeout.as_secs()));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }

    if !report.errors.is_empty() {
        out.push_str("\nConfiguration errors:\n");
        for error in &report.errors {
            out.push_str(&format!("  ! {error}\n"));
        }
    }
    out
}
