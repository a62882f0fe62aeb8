// ABOUTME: Paged MySQL table reader implementing the exporter's source traits
// ABOUTME: Introspects columns, counts filtered rows and streams export pages

use super::connection::{connect, SourceCredentials};
use super::converter::{convert_row, filter_value_to_mysql};
use super::quote_identifier;
use crate::error::SyncError;
use crate::filters::TableFilter;
use crate::source::{PageRequest, PageStream, RowPage, SourceConnector, SourceReader};
use async_trait::async_trait;
use futures::StreamExt;
use mysql_async::prelude::*;
use mysql_async::{Conn, Params, Row};

const COLUMNS_SQL: &str = "SELECT COLUMN_NAME
     FROM information_schema.COLUMNS
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
     ORDER BY ORDINAL_POSITION";

// ER_TABLEACCESS_DENIED_ERROR, ER_COLUMNACCESS_DENIED_ERROR, ER_NO_SUCH_TABLE
const SKIPPABLE_SERVER_CODES: [u16; 3] = [1142, 1143, 1146];

/// Map a failed column lookup onto the exporter's error kinds
///
/// Only "this table is missing or off limits" is a schema problem; a dropped
/// connection or driver failure must stop the run.
fn column_lookup_error(table: &str, err: mysql_async::Error) -> SyncError {
    if let mysql_async::Error::Server(server) = &err {
        if SKIPPABLE_SERVER_CODES.contains(&server.code) {
            return SyncError::schema(table, &server.message);
        }
    }
    SyncError::read(table, err)
}

/// Opens [`MySqlReader`]s from fixed credentials
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    credentials: SourceCredentials,
}

impl MySqlConnector {
    pub fn new(credentials: SourceCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl SourceConnector for MySqlConnector {
    type Reader = MySqlReader;

    async fn connect(&self) -> Result<MySqlReader, SyncError> {
        let conn = connect(&self.credentials).await?;
        Ok(MySqlReader::new(conn))
    }
}

/// Reader over one MySQL connection
pub struct MySqlReader {
    conn: Option<Conn>,
    decode_replacements: u64,
}

impl MySqlReader {
    pub fn new(conn: Conn) -> Self {
        Self {
            conn: Some(conn),
            decode_replacements: 0,
        }
    }

    fn conn(&mut self) -> Result<&mut Conn, SyncError> {
        self.conn
            .as_mut()
            .ok_or_else(|| SyncError::Connection("MySQL connection already closed".to_string()))
    }
}

#[async_trait]
impl SourceReader for MySqlReader {
    async fn column_names(&mut self, table: &str) -> Result<Vec<String>, SyncError> {
        let names: Vec<String> = self
            .conn()?
            .exec(COLUMNS_SQL, (table,))
            .await
            .map_err(|e| column_lookup_error(table, e))?;

        if names.is_empty() {
            return Err(SyncError::schema(
                table,
                "table not found in the current database",
            ));
        }

        tracing::debug!("Discovered {} column(s) in '{}'", names.len(), table);
        Ok(names)
    }

    async fn row_count(
        &mut self,
        table: &str,
        filter: Option<&TableFilter>,
    ) -> Result<u64, SyncError> {
        let (sql, params) = count_query(table, filter);
        let count: Option<u64> = self
            .conn()?
            .exec_first(sql, params)
            .await
            .map_err(|e| SyncError::read(table, e))?;
        Ok(count.unwrap_or(0))
    }

    async fn stream_pages<'a>(
        &'a mut self,
        request: PageRequest<'_>,
    ) -> Result<PageStream<'a>, SyncError> {
        let table = request.table.to_string();
        let page_size = request.page_size.max(1);
        let (sql, params) = select_query(&request);
        tracing::debug!("Export query for '{}': {}", table, sql);

        let MySqlReader {
            conn,
            decode_replacements,
        } = self;
        let conn = conn
            .as_mut()
            .ok_or_else(|| SyncError::Connection("MySQL connection already closed".to_string()))?;

        let rows = conn
            .exec_stream::<Row, _, _>(sql, params)
            .await
            .map_err(|e| SyncError::read(&table, e))?;

        let pages = rows
            .map(move |row| {
                let row = row.map_err(|e| SyncError::read(&table, e))?;
                let (values, replaced) = convert_row(row);
                if replaced > 0 {
                    *decode_replacements += replaced as u64;
                    tracing::warn!(
                        "Replaced undecodable bytes in {} value(s) of a '{}' row",
                        replaced,
                        table
                    );
                }
                Ok(values)
            })
            .chunks(page_size)
            .map(|chunk| chunk.into_iter().collect::<Result<RowPage, SyncError>>())
            .boxed();

        Ok(pages)
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect()
                .await
                .map_err(|e| SyncError::Connection(format!("Failed to disconnect: {}", e)))?;
            tracing::debug!("Disconnected from MySQL");
        }
        Ok(())
    }

    fn decode_replacements(&self) -> u64 {
        self.decode_replacements
    }
}

fn select_query(request: &PageRequest<'_>) -> (String, Params) {
    let columns: Vec<String> = request
        .columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect();
    let sql = format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        quote_identifier(request.table)
    );
    with_filter(sql, request.filter)
}

fn count_query(table: &str, filter: Option<&TableFilter>) -> (String, Params) {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
    with_filter(sql, filter)
}

fn with_filter(sql: String, filter: Option<&TableFilter>) -> (String, Params) {
    let Some(filter) = filter else {
        return (sql, Params::Empty);
    };

    let clause = filter.where_clause();
    let sql = format!("{} WHERE {}", sql, clause.sql);
    let params = if clause.params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(clause.params.iter().map(filter_value_to_mysql).collect())
    };
    (sql, params)
}
