// ABOUTME: Interactive terminal UI for choosing which tables to export
// ABOUTME: Multi-select over the configured tables followed by a summary and confirmation

use crate::config::TableSpec;
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, MultiSelect};
use std::path::Path;

/// Let the user pick tables to export and confirm the run
///
/// Every configured table starts selected. Returns the chosen specs in
/// configuration order.
///
/// # Errors
///
/// Fails when the terminal cannot be read, when nothing is selected, or when
/// the user declines the confirmation.
pub fn select_tables(specs: &[TableSpec], destination: &Path) -> Result<Vec<TableSpec>> {
    println!("Select tables to export:");
    println!("(Use arrow keys to navigate, Space to select, Enter to confirm)");
    println!();

    let labels: Vec<String> = specs.iter().map(describe_table).collect();
    let defaults = vec![true; specs.len()];

    let selections = MultiSelect::with_theme(&ColorfulTheme::default())
        .items(&labels)
        .defaults(&defaults)
        .interact()
        .context("Failed to get table selection")?;

    if selections.is_empty() {
        tracing::warn!("⚠ No tables selected");
        anyhow::bail!("No tables selected for export");
    }

    let selected: Vec<TableSpec> = selections.iter().map(|&i| specs[i].clone()).collect();

    println!();
    for line in summary_lines(&selected, destination) {
        println!("{}", line);
    }
    println!();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Existing tables with these names will be replaced. Proceed?")
        .default(true)
        .interact()
        .context("Failed to get confirmation")?;

    if !confirmed {
        tracing::warn!("⚠ User cancelled operation");
        anyhow::bail!("Export cancelled by user");
    }

    tracing::info!("✓ Configuration confirmed");
    Ok(selected)
}

/// One-line description of a table: name, column allow-list and filter
pub fn describe_table(spec: &TableSpec) -> String {
    let mut line = spec.name.clone();
    if let Some(columns) = &spec.allowlist {
        line.push_str(&format!(" [{} column(s)]", columns.len()));
    }
    if let Some(filter) = &spec.filter {
        line.push_str(&format!(" WHERE {}", filter));
    }
    line
}

fn summary_lines(specs: &[TableSpec], destination: &Path) -> Vec<String> {
    let mut lines = vec![
        "========================================".to_string(),
        "Export Configuration Summary".to_string(),
        "========================================".to_string(),
        format!("Destination: {}", destination.display()),
        format!("Tables to export: {}", specs.len()),
    ];
    lines.extend(specs.iter().map(|s| format!("  ✓ {}", describe_table(s))));
    lines.push("========================================".to_string());
    lines
}
