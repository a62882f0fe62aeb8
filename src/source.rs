// ABOUTME: Source-side abstractions for the export engine
// ABOUTME: Defines row values, pages, the reader/connector traits and column resolution

use crate::error::SyncError;
use crate::filters::TableFilter;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::borrow::Cow;

/// A single value read from the source
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Text(String),
    Integer(i64),
    UnsignedInteger(u64),
    Real(f64),
    Bytes(Vec<u8>),
}

impl ScalarValue {
    /// Decode bytes as UTF-8, replacing invalid sequences with U+FFFD
    ///
    /// Returns the text value and whether any replacement was needed.
    pub fn decode_lossy(bytes: Vec<u8>) -> (ScalarValue, bool) {
        match String::from_utf8(bytes) {
            Ok(text) => (ScalarValue::Text(text), false),
            Err(err) => {
                let text = String::from_utf8_lossy(err.as_bytes()).into_owned();
                (ScalarValue::Text(text), true)
            }
        }
    }

    /// Flatten the value to the text stored in the destination
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            ScalarValue::Integer(i) => Some(Cow::Owned(i.to_string())),
            ScalarValue::UnsignedInteger(u) => Some(Cow::Owned(u.to_string())),
            ScalarValue::Real(f) => Some(Cow::Owned(format_float(*f))),
            ScalarValue::Bytes(b) => Some(String::from_utf8_lossy(b)),
        }
    }
}

/// Render a float the way MySQL prints it as text
///
/// Shortest round-trip digits; scientific notation when the decimal exponent
/// is below -4 or at least 15 (`1e20`, `1.5e-7`), plain digits otherwise.
///
/// ```
/// # use mysql_sqlite_exporter::source::format_float;
/// assert_eq!(format_float(1e20_f64), "1e20");
/// assert_eq!(format_float(0.25_f64), "0.25");
/// ```
pub fn format_float<T>(value: T) -> String
where
    T: std::fmt::Display + std::fmt::LowerExp,
{
    let scientific = format!("{:e}", value);
    let exponent = scientific
        .split_once('e')
        .and_then(|(_, exp)| exp.parse::<i32>().ok());

    match exponent {
        Some(exp) if !(-4..15).contains(&exp) => scientific,
        // in range, or not finite
        _ => value.to_string(),
    }
}

/// One page of rows, each row holding values in export column order
pub type RowPage = Vec<Vec<ScalarValue>>;

/// Lazy, finite stream of pages for one table
pub type PageStream<'a> = BoxStream<'a, Result<RowPage, SyncError>>;

/// What one export query needs to know
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub filter: Option<&'a TableFilter>,
    pub page_size: usize,
}

/// Read access to one open source connection
#[async_trait]
pub trait SourceReader: Send {
    /// Column names of `table` in declaration order
    async fn column_names(&mut self, table: &str) -> Result<Vec<String>, SyncError>;

    /// Number of rows the export query for `table` will return
    async fn row_count(
        &mut self,
        table: &str,
        filter: Option<&TableFilter>,
    ) -> Result<u64, SyncError>;

    /// Issue the export query and page through its results
    async fn stream_pages<'a>(
        &'a mut self,
        request: PageRequest<'_>,
    ) -> Result<PageStream<'a>, SyncError>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), SyncError>;

    /// Number of values that needed lossy UTF-8 decoding so far
    fn decode_replacements(&self) -> u64 {
        0
    }
}

/// Opens source connections for a run
#[async_trait]
pub trait SourceConnector: Send + Sync {
    type Reader: SourceReader;

    async fn connect(&self) -> Result<Self::Reader, SyncError>;
}

/// Decide which columns to export for `table`
///
/// With an allow-list, keep the allow-list entries that exist in `discovered`,
/// in allow-list order. Entries missing from the source are dropped without error
/// so that schema drift does not break the export. Without an allow-list all
/// discovered columns are exported unchanged.
///
/// # Examples
///
/// ```
/// # use mysql_sqlite_exporter::source::resolve_export_columns;
/// let discovered = vec!["id".to_string(), "name".to_string(), "email".to_string()];
/// let allow = vec!["email".to_string(), "phone".to_string(), "id".to_string()];
///
/// assert_eq!(
///     resolve_export_columns("contacts", &discovered, Some(&allow)),
///     vec!["email".to_string(), "id".to_string()]
/// );
/// assert_eq!(resolve_export_columns("contacts", &discovered, None), discovered);
/// ```
pub fn resolve_export_columns(
    table: &str,
    discovered: &[String],
    allowlist: Option<&[String]>,
) -> Vec<String> {
    let Some(allowlist) = allowlist else {
        return discovered.to_vec();
    };

    let mut resolved: Vec<String> = Vec::with_capacity(allowlist.len());
    for column in allowlist {
        if !discovered.contains(column) {
            tracing::debug!(
                "Column '{}' configured for '{}' does not exist in source, skipping",
                column,
                table
            );
            continue;
        }
        if !resolved.contains(column) {
            resolved.push(column.clone());
        }
    }
    resolved
}
