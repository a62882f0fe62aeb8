// ABOUTME: Export command - copy the configured MySQL tables into a local SQLite file
// ABOUTME: Resolves config, credentials and table selection, then runs the exporter

use crate::config::{
    load_config, load_table_fields, select_tables, ExportConfig, SourceOverrides, TableSpec,
};
use crate::exporter::{CancelFlag, Exporter, SyncJob, TableOutcome};
use crate::interactive;
use crate::mysql::MySqlConnector;
use crate::progress::TerminalProgress;
use crate::utils::{default_fields_file, resolve_destination};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Options collected from the command line
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub config_path: Option<PathBuf>,
    pub fields_path: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub tables: Vec<String>,
    pub page_size: Option<usize>,
    pub source: SourceOverrides,
    pub interactive: bool,
}

/// Export command
///
/// Steps:
/// 1. Loads the export config and the optional column allow-list file
/// 2. Narrows the table list to `--tables` and, when interactive, to the user's selection
/// 3. Resolves MySQL credentials from flags, environment and config
/// 4. Runs the export on a worker task with a terminal progress bar; Ctrl-C cancels it
///
/// Tables already copied stay in the destination when the run fails.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use mysql_sqlite_exporter::commands::{export, ExportOptions};
/// # async fn example() -> Result<()> {
/// export(ExportOptions {
///     config_path: Some("export.toml".into()),
///     tables: vec!["contacts".to_string()],
///     ..Default::default()
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn export(options: ExportOptions) -> Result<()> {
    let (config, mut specs) = load_settings(
        options.config_path.as_deref(),
        options.fields_path.as_deref(),
    )?;

    if !options.tables.is_empty() {
        specs = select_tables(&specs, &options.tables);
    }
    if specs.is_empty() {
        anyhow::bail!("No tables to export. Add [[tables]] to the config file or pass --tables");
    }

    let destination = resolve_destination(options.output.clone(), config.destination.clone());

    if options.interactive {
        specs = interactive::select_tables(&specs, &destination)?;
    }

    let credentials = options
        .source
        .clone()
        .or(config.source.clone())
        .resolve()
        .context("Missing MySQL connection settings")?;
    tracing::info!(
        "Source: {}@{}:{}/{}",
        credentials.user,
        credentials.host,
        credentials.port,
        credentials.database
    );

    let page_size = options.page_size.unwrap_or(config.page_size);
    let job = SyncJob::new(specs, destination, page_size)?;

    let cancel = CancelFlag::new();
    let exporter = Exporter::new(MySqlConnector::new(credentials)).with_cancel_flag(cancel.clone());
    let progress = Arc::new(TerminalProgress::new());

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current page...");
            cancel.cancel();
        }
    });

    let worker = {
        let progress = Arc::clone(&progress);
        tokio::spawn(async move { exporter.run(&job, progress.as_ref()).await })
    };

    let result = worker.await.context("Export task failed to complete")?;
    ctrl_c.abort();
    progress.finish();

    let report = result.context("Export failed")?;

    for table in &report.tables {
        match &table.outcome {
            TableOutcome::Exported { rows } => {
                tracing::info!("  ✓ {} ({} rows)", table.name, rows)
            }
            TableOutcome::Skipped { reason } => {
                tracing::warn!("  ✗ {} skipped: {}", table.name, reason)
            }
        }
    }
    if report.decode_replacements > 0 {
        tracing::warn!(
            "⚠ {} value(s) contained invalid UTF-8 and were stored with replacement characters",
            report.decode_replacements
        );
    }
    tracing::info!(
        "✅ Export complete. Local DB saved at: {}",
        report.destination.display()
    );

    Ok(())
}

/// Load the config file (if any) and build the table specs it describes
///
/// The column allow-list comes from `fields_path`, else the config's
/// `fields_file`, else a `table_fields.json` next to the executable.
pub(crate) fn load_settings(
    config_path: Option<&std::path::Path>,
    fields_path: Option<&std::path::Path>,
) -> Result<(ExportConfig, Vec<TableSpec>)> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => ExportConfig::default(),
    };

    let fields_path = fields_path
        .map(PathBuf::from)
        .or(config.fields_file.clone())
        .or_else(default_fields_file);
    let fields = match fields_path {
        Some(path) => load_table_fields(&path)?,
        None => HashMap::new(),
    };

    let specs = config
        .table_specs(&fields)
        .context("Invalid table configuration")?;
    Ok((config, specs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_settings_without_config() {
        let (config, specs) = load_settings(None, None).unwrap();
        assert_eq!(config, ExportConfig::default());
        assert!(specs.is_empty());
    }

    #[test]
    fn test_load_settings_with_fields_override() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("export.toml");
        std::fs::write(
            &config_path,
            "[[tables]]\nname = \"contacts\"\ncolumns = [\"id\"]\n",
        )
        .unwrap();
        let fields_path = dir.path().join("fields.json");
        std::fs::write(&fields_path, r#"{"contacts": ["id", "email"]}"#).unwrap();

        let (_, specs) = load_settings(Some(&config_path), Some(&fields_path)).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(
            specs[0].allowlist,
            Some(vec!["id".to_string(), "email".to_string()])
        );
    }

    #[tokio::test]
    async fn test_export_without_tables_fails_before_connecting() {
        let result = export(ExportOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_export_without_credentials_fails() {
        let dir = TempDir::new().unwrap();
        let result = export(ExportOptions {
            output: Some(dir.path().join("copy.db")),
            tables: vec!["contacts".to_string()],
            ..Default::default()
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Missing MySQL connection settings"));
        assert!(!dir.path().join("copy.db").exists());
    }
}
