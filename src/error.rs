// ABOUTME: Error taxonomy for the export engine
// ABOUTME: Distinguishes fatal connection/read/write failures from skippable schema failures

use thiserror::Error;

/// Errors raised while exporting tables from the source into SQLite.
///
/// `Schema` is the only variant the exporter recovers from (the table is skipped).
/// Everything else aborts the run; tables already written stay in the destination.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema error for table '{table}': {reason}")]
    Schema { table: String, reason: String },

    #[error("Read error for table '{table}': {reason}")]
    Read { table: String, reason: String },

    #[error("Write error for table '{table}': {reason}")]
    Write { table: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn schema(table: &str, reason: impl ToString) -> Self {
        SyncError::Schema {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn read(table: &str, reason: impl ToString) -> Self {
        SyncError::Read {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write(table: &str, reason: impl ToString) -> Self {
        SyncError::Write {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that skip the current table instead of aborting the run
    pub fn is_skippable(&self) -> bool {
        matches!(self, SyncError::Schema { .. })
    }
}
