// ABOUTME: SQLite destination for exported tables
// ABOUTME: Recreates tables as all-TEXT columns and writes pages in per-page transactions

use crate::error::SyncError;
use crate::source::{RowPage, ScalarValue};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use rusqlite::{params_from_iter, Connection};
use std::fs;
use std::path::{Path, PathBuf};

/// Quote a SQLite identifier with double quotes, doubling embedded quotes
///
/// # Examples
///
/// ```
/// # use mysql_sqlite_exporter::sqlite::quote_identifier;
/// assert_eq!(quote_identifier("contacts"), "\"contacts\"");
/// assert_eq!(quote_identifier("say \"hi\""), "\"say \"\"hi\"\"\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ToSql for ScalarValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.as_text() {
            None => ToSqlOutput::Owned(SqlValue::Null),
            Some(text) => ToSqlOutput::Owned(SqlValue::Text(text.into_owned())),
        })
    }
}

/// Local SQLite database receiving the export
pub struct SqliteDestination {
    conn: Connection,
    path: PathBuf,
}

impl SqliteDestination {
    /// Open or create the database file
    ///
    /// Creates the parent directory when missing and switches the database to
    /// WAL journaling with `synchronous=NORMAL`. Foreign keys are disabled so
    /// tables can be dropped and refilled in any order.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let open_error = |reason: String| SyncError::write(&path.display().to_string(), reason);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                open_error(format!(
                    "Failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| open_error(format!("Failed to open SQLite database: {}", e)))?;

        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| open_error(format!("Failed to enable WAL: {}", e)))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .and_then(|_| conn.pragma_update(None, "foreign_keys", "OFF"))
            .map_err(|e| open_error(format!("Failed to configure SQLite: {}", e)))?;

        tracing::debug!(
            "Opened SQLite database {} (journal_mode={})",
            path.display(),
            journal_mode
        );

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop `table` if present and create it with one TEXT column per entry
    ///
    /// Any existing data in the table is lost. Calling this twice in a row
    /// leaves a single empty table with the same columns.
    pub fn recreate_table(&mut self, table: &str, columns: &[String]) -> Result<(), SyncError> {
        if columns.is_empty() {
            return Err(SyncError::write(table, "cannot create a table without columns"));
        }

        let column_defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} TEXT", quote_identifier(c)))
            .collect();
        let quoted = quote_identifier(table);
        let sql = format!(
            "DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} ({columns});",
            table = quoted,
            columns = column_defs.join(", ")
        );

        self.conn
            .execute_batch(&sql)
            .map_err(|e| SyncError::write(table, e))?;

        tracing::debug!("Recreated '{}' with {} column(s)", table, columns.len());
        Ok(())
    }

    /// Insert every row of `page` and commit
    ///
    /// The page is written through one prepared INSERT inside one transaction.
    /// If any row fails, nothing from this page is kept; earlier pages are
    /// already committed.
    pub fn write_page(
        &mut self,
        table: &str,
        columns: &[String],
        page: &RowPage,
    ) -> Result<usize, SyncError> {
        let sql = insert_sql(table, columns);
        let tx = self
            .conn
            .transaction()
            .map_err(|e| SyncError::write(table, e))?;

        {
            let mut stmt = tx
                .prepare_cached(&sql)
                .map_err(|e| SyncError::write(table, e))?;
            for (idx, row) in page.iter().enumerate() {
                if row.len() != columns.len() {
                    return Err(SyncError::write(
                        table,
                        format!(
                            "row {} of page has {} value(s), expected {}",
                            idx + 1,
                            row.len(),
                            columns.len()
                        ),
                    ));
                }
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(|e| SyncError::write(table, e))?;
            }
        }

        tx.commit().map_err(|e| SyncError::write(table, e))?;
        Ok(page.len())
    }

    /// Number of rows currently stored in `table`
    pub fn table_row_count(&self, table: &str) -> Result<u64, SyncError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| SyncError::write(table, e))?;
        Ok(count.max(0) as u64)
    }

    /// User tables in the database, sorted by name
    pub fn list_tables(&self) -> Result<Vec<String>, SyncError> {
        let path = self.path.display().to_string();
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(|e| SyncError::write(&path, e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| SyncError::write(&path, e))?;
        Ok(names)
    }

    /// Column names of `table` in declaration order
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>, SyncError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))
            .map_err(|e| SyncError::write(table, e))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| SyncError::write(table, e))?;
        Ok(columns)
    }

    /// Close the connection, reporting errors instead of swallowing them on drop
    pub fn close(self) -> Result<(), SyncError> {
        let path = self.path.display().to_string();
        self.conn
            .close()
            .map_err(|(_, e)| SyncError::write(&path, format!("Failed to close database: {}", e)))
    }
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        names.join(", "),
        placeholders
    )
}

/// Mark the WAL and shared-memory sidecar files of `db_path` as hidden
///
/// Only Windows has a hidden attribute; elsewhere this does nothing.
/// Failures are logged and otherwise ignored.
pub fn hide_aux_files(db_path: &Path) {
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        let aux = PathBuf::from(name);
        if aux.exists() {
            hide_file(&aux);
        }
    }
}

#[cfg(windows)]
fn hide_file(path: &Path) {
    match std::process::Command::new("attrib")
        .arg("+h")
        .arg(path)
        .status()
    {
        Ok(status) if status.success() => tracing::debug!("Hid {}", path.display()),
        Ok(status) => tracing::warn!("attrib +h {} exited with {}", path.display(), status),
        Err(e) => tracing::warn!("Failed to hide {}: {}", path.display(), e),
    }
}

#[cfg(not(windows))]
fn hide_file(_path: &Path) {}
