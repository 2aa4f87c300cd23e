//! `overlock search` - report package occurrences from the lockfile.

use miette::{IntoDiagnostic, Result};
use overlock_core::{search_packages, SearchResult, SEARCH_SCHEMA_VERSION};
use std::path::Path;
use tracing::debug;

/// Run the search and render the result.
pub fn run(pm: &str, cwd: &Path, targets: &[String], json: bool) -> Result<()> {
    debug!(pm, cwd = %cwd.display(), targets = targets.len(), "running search");
    let result = search_packages(pm, cwd, targets).into_diagnostic()?;

    if json {
        print_json(pm, cwd, &result)?;
    } else {
        print_human(&result);
    }
    Ok(())
}

/// Stable JSON output contract:
/// `{ "schema_version": 1, "manager": ..., "root": ..., "packages": {...} }`
fn print_json(pm: &str, cwd: &Path, result: &SearchResult) -> Result<()> {
    let payload = serde_json::json!({
        "schema_version": SEARCH_SCHEMA_VERSION,
        "manager": pm,
        "root": cwd.display().to_string(),
        "packages": &result.packages,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).into_diagnostic()?
    );
    Ok(())
}

fn print_human(result: &SearchResult) {
    for (name, occurrences) in &result.packages {
        if occurrences.is_empty() {
            println!("{name}: no occurrences");
            continue;
        }
        let plural = if occurrences.len() == 1 { "" } else { "s" };
        println!("{name}: {} occurrence{plural}", occurrences.len());
        for occurrence in occurrences {
            let location = if occurrence.path.is_empty() {
                "top-level".to_string()
            } else {
                occurrence.path.join(" > ")
            };
            let dev = if occurrence.dev_only { " (dev-only)" } else { "" };
            println!(
                "  {}@{} at {location}{dev}",
                occurrence.name, occurrence.version
            );
        }
    }
}
