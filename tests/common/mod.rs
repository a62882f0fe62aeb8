// ABOUTME: In-memory source database used by the exporter integration tests
// ABOUTME: Evaluates filters in memory and can inject count and page failures

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use mysql_sqlite_exporter::error::SyncError;
use mysql_sqlite_exporter::filters::{FilterCondition, FilterOperator, FilterValue, TableFilter};
use mysql_sqlite_exporter::progress::ProgressObserver;
use mysql_sqlite_exporter::source::{
    PageRequest, PageStream, RowPage, ScalarValue, SourceConnector, SourceReader,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
}

impl MemoryTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, values: Vec<ScalarValue>) -> Self {
        self.rows.push(values);
        self
    }

    /// Table with `count` rows of `(id, label)`
    pub fn numbered(count: i64) -> Self {
        let mut table = Self::new(&["id", "label"]);
        for id in 1..=count {
            table
                .rows
                .push(vec![ScalarValue::Integer(id), text(&format!("row {}", id))]);
        }
        table
    }
}

pub fn text(value: &str) -> ScalarValue {
    ScalarValue::Text(value.to_string())
}

#[derive(Debug, Default)]
struct SourceState {
    tables: HashMap<String, MemoryTable>,
    uncountable: HashSet<String>,
    broken_pages: HashMap<String, usize>,
    disconnect_at: Option<String>,
    refuse_connections: bool,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// Connector over a fixed set of in-memory tables
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    state: Arc<SourceState>,
}

pub struct MemorySourceBuilder {
    state: SourceState,
}

impl MemorySource {
    pub fn builder() -> MemorySourceBuilder {
        MemorySourceBuilder {
            state: SourceState::default(),
        }
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

impl MemorySourceBuilder {
    pub fn table(mut self, name: &str, table: MemoryTable) -> Self {
        self.state.tables.insert(name.to_string(), table);
        self
    }

    /// Make `row_count` fail for `name`
    pub fn uncountable(mut self, name: &str) -> Self {
        self.state.uncountable.insert(name.to_string());
        self
    }

    /// Emit a malformed row in page `page` (zero-based) of `name`
    pub fn broken_page(mut self, name: &str, page: usize) -> Self {
        self.state.broken_pages.insert(name.to_string(), page);
        self
    }

    /// Drop the connection when `name` is first touched; later calls fail too
    pub fn disconnect_at(mut self, name: &str) -> Self {
        self.state.disconnect_at = Some(name.to_string());
        self
    }

    pub fn refuse_connections(mut self) -> Self {
        self.state.refuse_connections = true;
        self
    }

    pub fn build(self) -> MemorySource {
        MemorySource {
            state: Arc::new(self.state),
        }
    }
}

#[async_trait]
impl SourceConnector for MemorySource {
    type Reader = MemoryReader;

    async fn connect(&self) -> Result<MemoryReader, SyncError> {
        if self.state.refuse_connections {
            return Err(SyncError::Connection(
                "Access denied for user 'reader'".to_string(),
            ));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryReader {
            state: Arc::clone(&self.state),
            open: true,
            lost: false,
        })
    }
}

pub struct MemoryReader {
    state: Arc<SourceState>,
    open: bool,
    lost: bool,
}

impl MemoryReader {
    fn check_link(&mut self, table: &str) -> Result<(), SyncError> {
        if self.state.disconnect_at.as_deref() == Some(table) {
            self.lost = true;
        }
        if self.lost {
            return Err(SyncError::read(
                table,
                "Lost connection to MySQL server during query",
            ));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, SyncError> {
        if !self.open {
            return Err(SyncError::Connection("connection closed".to_string()));
        }
        self.state
            .tables
            .get(name)
            .ok_or_else(|| SyncError::schema(name, "table not found"))
    }

    fn matching_rows<'a>(
        table: &'a MemoryTable,
        filter: Option<&TableFilter>,
    ) -> Vec<&'a Vec<ScalarValue>> {
        table
            .rows
            .iter()
            .filter(|row| match filter {
                Some(TableFilter::Conditions(conditions)) => conditions
                    .iter()
                    .all(|c| condition_matches(c, &table.columns, row)),
                Some(TableFilter::Raw(_)) => panic!("raw filters are not evaluated in memory"),
                None => true,
            })
            .collect()
    }
}

#[async_trait]
impl SourceReader for MemoryReader {
    async fn column_names(&mut self, table: &str) -> Result<Vec<String>, SyncError> {
        self.check_link(table)?;
        Ok(self.table(table)?.columns.clone())
    }

    async fn row_count(
        &mut self,
        table: &str,
        filter: Option<&TableFilter>,
    ) -> Result<u64, SyncError> {
        self.check_link(table)?;
        if self.state.uncountable.contains(table) {
            return Err(SyncError::read(table, "COUNT(*) timed out"));
        }
        let data = self.table(table).map_err(|e| SyncError::read(table, e))?;
        Ok(Self::matching_rows(data, filter).len() as u64)
    }

    async fn stream_pages<'a>(
        &'a mut self,
        request: PageRequest<'_>,
    ) -> Result<PageStream<'a>, SyncError> {
        let data = self.table(request.table)?;
        let indexes: Vec<usize> = request
            .columns
            .iter()
            .map(|c| {
                data.columns
                    .iter()
                    .position(|d| d == c)
                    .ok_or_else(|| SyncError::read(request.table, format!("unknown column {}", c)))
            })
            .collect::<Result<_, _>>()?;

        let rows: Vec<Vec<ScalarValue>> = Self::matching_rows(data, request.filter)
            .into_iter()
            .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
            .collect();

        let broken = self.state.broken_pages.get(request.table).copied();
        let pages: Vec<Result<RowPage, SyncError>> = rows
            .chunks(request.page_size)
            .enumerate()
            .map(|(number, chunk)| {
                let mut page: RowPage = chunk.to_vec();
                if broken == Some(number) {
                    if let Some(last) = page.last_mut() {
                        last.pop();
                    }
                }
                Ok(page)
            })
            .collect();

        Ok(futures::stream::iter(pages).boxed())
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        if self.open {
            self.open = false;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn condition_matches(condition: &FilterCondition, columns: &[String], row: &[ScalarValue]) -> bool {
    let Some(index) = columns.iter().position(|c| c == &condition.column) else {
        return false;
    };
    let value = &row[index];
    let equals = |expected: &FilterValue| compare(value, expected) == Some(std::cmp::Ordering::Equal);

    match condition.op {
        FilterOperator::In => condition.values.iter().any(equals),
        FilterOperator::NotIn => !condition.values.iter().any(equals),
        op => {
            let Some(ordering) = condition.values.first().and_then(|v| compare(value, v)) else {
                return false;
            };
            match op {
                FilterOperator::Eq => ordering.is_eq(),
                FilterOperator::Ne => ordering.is_ne(),
                FilterOperator::Lt => ordering.is_lt(),
                FilterOperator::Le => ordering.is_le(),
                FilterOperator::Gt => ordering.is_gt(),
                FilterOperator::Ge => ordering.is_ge(),
                FilterOperator::In | FilterOperator::NotIn => unreachable!(),
            }
        }
    }
}

fn compare(value: &ScalarValue, expected: &FilterValue) -> Option<std::cmp::Ordering> {
    let actual = value.as_text()?;
    match expected {
        FilterValue::Integer(i) => actual.parse::<f64>().ok()?.partial_cmp(&(*i as f64)),
        FilterValue::Float(f) => actual.parse::<f64>().ok()?.partial_cmp(f),
        FilterValue::Text(s) => Some((*actual).cmp(s.as_str())),
    }
}

/// Observer recording every update
#[derive(Debug, Default)]
pub struct Recorder {
    updates: Mutex<Vec<(f64, String)>>,
}

impl Recorder {
    pub fn updates(&self) -> Vec<(f64, String)> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressObserver for Recorder {
    fn on_progress(&self, fraction: f64, message: &str) {
        self.updates
            .lock()
            .unwrap()
            .push((fraction, message.to_string()));
    }
}

/// Read every row of a destination table as text, in insertion order
pub fn read_table(path: &std::path::Path, table: &str) -> Vec<Vec<Option<String>>> {
    let conn = rusqlite::Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM \"{}\" ORDER BY rowid", table))
        .unwrap();
    let width = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, Option<String>>(i))
                .collect::<Result<Vec<_>, _>>()
        })
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

pub fn table_exists(path: &std::path::Path, table: &str) -> bool {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}
