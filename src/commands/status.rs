// ABOUTME: Status command implementation - inspect export config and local copy
// ABOUTME: Shows the destination path, configured tables and row counts already copied

use super::export::load_settings;
use crate::interactive::describe_table;
use crate::sqlite::SqliteDestination;
use crate::utils::{resolve_destination, sanitize_identifier};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Format a byte count into a human-readable size
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Show what an export would do and what the local copy already holds
///
/// Does not contact the source database.
pub fn status(
    config_path: Option<&Path>,
    fields_path: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let (config, specs) = load_settings(config_path, fields_path)?;
    let destination = resolve_destination(output, config.destination.clone());

    tracing::info!("========================================");
    tracing::info!("Export Status Report");
    tracing::info!("========================================");
    tracing::info!("");

    let exists = destination.exists();
    if exists {
        let size = std::fs::metadata(&destination)
            .map(|m| m.len())
            .unwrap_or(0);
        tracing::info!(
            "Destination: {} ({})",
            destination.display(),
            format_bytes(size)
        );
    } else {
        tracing::info!("Destination: {} (will be created)", destination.display());
    }
    tracing::info!("Page size: {}", config.page_size);
    tracing::info!("");

    if specs.is_empty() {
        tracing::warn!("⚠ No tables configured");
        tracing::warn!("  Add [[tables]] entries to the config file or pass --tables to export");
    } else {
        tracing::info!("Configured tables: {}", specs.len());
        for spec in &specs {
            tracing::info!("  - {}", describe_table(spec));
        }
    }
    tracing::info!("");

    if exists {
        let counts = local_row_counts(&destination)?;
        if counts.is_empty() {
            tracing::info!("Local copy contains no tables yet");
        } else {
            tracing::info!("Local copy:");
            for (table, rows) in &counts {
                tracing::info!("  {}: {} rows", sanitize_identifier(table), rows);
            }
        }
        tracing::info!("");
    }

    tracing::info!("========================================");
    Ok(())
}

fn local_row_counts(path: &Path) -> Result<Vec<(String, u64)>> {
    let destination = SqliteDestination::open(path)
        .with_context(|| format!("Failed to open local copy {}", path.display()))?;

    let mut counts = Vec::new();
    for table in destination.list_tables()? {
        let rows = destination.table_row_count(&table)?;
        counts.push((table, rows));
    }
    destination.close()?;
    Ok(counts)
}
