// ABOUTME: Export orchestrator copying configured tables from the source into SQLite
// ABOUTME: Drives reader and writer per table, reports weighted progress and closes both sides

use crate::config::TableSpec;
use crate::error::SyncError;
use crate::progress::{ProgressObserver, ProgressTracker};
use crate::source::{resolve_export_columns, PageRequest, SourceConnector, SourceReader};
use crate::sqlite::{hide_aux_files, SqliteDestination};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag to stop a running export between tables or pages
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one export run needs
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub tables: Vec<TableSpec>,
    pub destination: PathBuf,
    pub page_size: usize,
}

impl SyncJob {
    pub fn new(
        tables: Vec<TableSpec>,
        destination: PathBuf,
        page_size: usize,
    ) -> Result<Self, SyncError> {
        let job = Self {
            tables,
            destination,
            page_size,
        };
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.page_size == 0 {
            return Err(SyncError::Config(
                "Page size must be greater than zero".to_string(),
            ));
        }
        if self.tables.is_empty() {
            return Err(SyncError::Config("No tables selected for export".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    Exported { rows: u64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    pub name: String,
    pub outcome: TableOutcome,
}

/// Result of a completed export run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub destination: PathBuf,
    pub tables: Vec<TableReport>,
    /// Values whose bytes were not valid UTF-8 and were decoded lossily
    pub decode_replacements: u64,
}

impl SyncReport {
    pub fn total_rows(&self) -> u64 {
        self.tables
            .iter()
            .map(|t| match t.outcome {
                TableOutcome::Exported { rows } => rows,
                TableOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TableReport> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Skipped { .. }))
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| &t.outcome)
    }
}

/// Copies tables from a source into a local SQLite file
///
/// Runs are strictly sequential: one source connection and one destination
/// connection, tables in job order, pages in query order. A failure stops the
/// run; tables and pages already committed stay in the destination.
pub struct Exporter<C> {
    connector: C,
    cancel: CancelFlag,
}

impl<C: SourceConnector> Exporter<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Export every table of `job`, reporting to `observer`
    ///
    /// The first update is `(0.0, "Connecting to source database...")`. On success
    /// the last update is `(1.0, "Export complete. ...")`; on failure it repeats the
    /// last reported fraction with `"Export failed: <error>"` and the error is returned.
    ///
    /// # Errors
    ///
    /// - `Connection` when the source cannot be reached or authenticated
    /// - `Write` when the destination cannot be opened or written
    /// - `Read` when a query fails mid-table
    /// - `Config` when the job is invalid
    /// - `Cancelled` when the cancel flag was set
    pub async fn run(
        &self,
        job: &SyncJob,
        observer: &dyn ProgressObserver,
    ) -> Result<SyncReport, SyncError> {
        let mut tracker = ProgressTracker::new(observer, job.tables.len());
        tracker.emit(0.0, "Connecting to source database...");

        match self.execute(job, &mut tracker).await {
            Ok(report) => {
                tracing::info!(
                    "Export complete: {} row(s) in {} table(s) written to {}",
                    report.total_rows(),
                    report.tables.len(),
                    report.destination.display()
                );
                tracker.emit(
                    1.0,
                    &format!(
                        "Export complete. Local DB saved at: {}",
                        report.destination.display()
                    ),
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Export failed: {}", e);
                let fraction = tracker.last_fraction();
                tracker.emit(fraction, &format!("Export failed: {}", e));
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job: &SyncJob,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<SyncReport, SyncError> {
        job.validate()?;

        tracing::info!("Connecting to source database...");
        let mut reader = self.connector.connect().await?;

        let mut destination = match SqliteDestination::open(&job.destination) {
            Ok(destination) => destination,
            Err(e) => {
                close_reader(&mut reader).await;
                return Err(e);
            }
        };

        let exported = self
            .export_tables(job, &mut reader, &mut destination, tracker)
            .await;

        close_reader(&mut reader).await;
        let closed = destination.close();

        let tables = exported?;
        closed?;
        hide_aux_files(&job.destination);

        Ok(SyncReport {
            destination: job.destination.clone(),
            tables,
            decode_replacements: reader.decode_replacements(),
        })
    }

    async fn export_tables(
        &self,
        job: &SyncJob,
        reader: &mut C::Reader,
        destination: &mut SqliteDestination,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<Vec<TableReport>, SyncError> {
        let mut reports = Vec::with_capacity(job.tables.len());

        for (index, spec) in job.tables.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            tracing::info!(
                "Exporting table {}/{}: '{}'",
                index + 1,
                job.tables.len(),
                spec.name
            );
            let outcome = self
                .export_table(index, spec, job.page_size, reader, destination, tracker)
                .await?;

            if let TableOutcome::Skipped { reason } = &outcome {
                tracing::warn!("Skipped table '{}': {}", spec.name, reason);
            }
            reports.push(TableReport {
                name: spec.name.clone(),
                outcome,
            });
        }

        Ok(reports)
    }

    async fn export_table(
        &self,
        index: usize,
        spec: &TableSpec,
        page_size: usize,
        reader: &mut C::Reader,
        destination: &mut SqliteDestination,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<TableOutcome, SyncError> {
        let table = spec.name.as_str();

        let total = match reader.row_count(table, spec.filter.as_ref()).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Could not count rows of '{}', copying anyway: {}", table, e);
                None
            }
        };

        let discovered = match reader.column_names(table).await {
            Ok(columns) => columns,
            Err(SyncError::Schema { reason, .. }) => {
                tracker.table_skipped(index, table, &reason);
                return Ok(TableOutcome::Skipped { reason });
            }
            Err(e) => return Err(e),
        };

        let columns = resolve_export_columns(table, &discovered, spec.allowlist.as_deref());
        if columns.is_empty() {
            let reason = "none of the configured columns exist".to_string();
            tracker.table_skipped(index, table, &reason);
            return Ok(TableOutcome::Skipped { reason });
        }

        destination.recreate_table(table, &columns)?;

        if total == Some(0) {
            tracing::info!("Table '{}' has no rows to export", table);
            tracker.table_empty(index, table);
            return Ok(TableOutcome::Exported { rows: 0 });
        }

        match total {
            Some(total) => tracing::info!("Preparing {} ({} rows)", table, total),
            None => tracing::info!("Preparing {}", table),
        }

        let request = PageRequest {
            table,
            columns: &columns,
            filter: spec.filter.as_ref(),
            page_size,
        };

        let mut written: u64 = 0;
        let mut end_reported = false;
        let mut pages = reader.stream_pages(request).await?;

        while let Some(page) = pages.next().await {
            let page = page?;
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let before = written;
            written += destination.write_page(table, &columns, &page)? as u64;
            tracing::debug!("Committed {} row(s) into '{}'", written - before, table);

            if let Some(total) = total {
                end_reported |= tracker.rows_written(index, table, before, written, total);
            }
        }
        drop(pages);

        tracker.table_finished(index, table, written, total, end_reported);
        Ok(TableOutcome::Exported { rows: written })
    }
}

async fn close_reader<R: SourceReader>(reader: &mut R) {
    if let Err(e) = reader.close().await {
        tracing::warn!("Failed to close source connection: {}", e);
    }
}
