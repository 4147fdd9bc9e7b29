//! Database sink: maps records onto a table schema and inserts them
//!
//! The sink is driven from the dispatcher's worker thread. It owns a small
//! current-thread runtime so the async [`LogStore`] can be awaited there.

use crate::core::{FieldValue, LogContext, LogError, LogRecord, Redactor, Renderer, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

/// Columns filled from the record itself rather than looked up in its fields
const BASE_COLUMNS: &[&str] = &["timestamp", "logger", "level", "message", "context", "traceback"];

/// Table schema the sink writes into
///
/// # Example
///
/// ```
/// use axum_structlog::sinks::{ColumnType, LogTable};
///
/// let table = LogTable::base("app_logs")
///     .with_column("request_id", ColumnType::Text)
///     .with_column("status_code", ColumnType::Integer);
/// assert_eq!(table.columns().len(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTable {
    name: String,
    columns: Vec<Column>,
}

impl LogTable {
    /// Empty table; every column must be added explicitly
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Logger name, level, timestamp, message, serialized context and traceback
    pub fn base(name: impl Into<String>) -> Self {
        Self::new(name)
            .with_column("timestamp", ColumnType::Timestamp)
            .with_column("logger", ColumnType::Text)
            .with_column("level", ColumnType::Text)
            .with_column("message", ColumnType::Text)
            .with_column("context", ColumnType::Text)
            .with_column("traceback", ColumnType::Text)
    }

    /// Access-log table: request id, client, session, method, path and status
    pub fn access_log(name: impl Into<String>) -> Self {
        Self::new(name)
            .with_column("request_id", ColumnType::Text)
            .with_column("client_address", ColumnType::Text)
            .with_column("timestamp", ColumnType::Timestamp)
            .with_column("session", ColumnType::Text)
            .with_column("method", ColumnType::Text)
            .with_column("path", ColumnType::Text)
            .with_column("status_code", ColumnType::Integer)
            .with_column("message", ColumnType::Text)
    }

    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        let name = name.into();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.kind = kind,
            None => self.columns.push(Column { name, kind }),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A value bound to one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Null,
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn from_field(value: &FieldValue, kind: ColumnType) -> Self {
        match (kind, value) {
            (_, FieldValue::Null) => ColumnValue::Null,
            (ColumnType::Integer, FieldValue::Int(i)) => ColumnValue::Integer(*i),
            (ColumnType::Integer, FieldValue::String(s)) => {
                s.trim().parse().map_or(ColumnValue::Null, ColumnValue::Integer)
            }
            (ColumnType::Integer, FieldValue::Bool(b)) => ColumnValue::Integer(i64::from(*b)),
            (ColumnType::Float, FieldValue::Float(f)) => ColumnValue::Float(*f),
            (ColumnType::Float, FieldValue::Int(i)) => ColumnValue::Float(*i as f64),
            (ColumnType::Float, FieldValue::String(s)) => {
                s.trim().parse().map_or(ColumnValue::Null, ColumnValue::Float)
            }
            (ColumnType::Timestamp, FieldValue::String(s)) => DateTime::parse_from_rfc3339(s)
                .map_or(ColumnValue::Null, |dt| ColumnValue::Timestamp(dt.with_timezone(&Utc))),
            (ColumnType::Text, FieldValue::String(s)) => ColumnValue::Text(s.clone()),
            (ColumnType::Text, other) => ColumnValue::Text(other.to_string()),
            _ => ColumnValue::Null,
        }
    }
}

/// One row ready for insertion, values in table column order
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    values: Vec<(String, ColumnValue)>,
}

impl LogRow {
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.values.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn values(&self) -> &[(String, ColumnValue)] {
        &self.values
    }
}

/// Async persistence seam for the database sink
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn insert(&self, table: &LogTable, row: &LogRow) -> Result<()>;

    /// Delete rows with a timestamp older than `cutoff`, returning the count
    async fn purge_older_than(&self, table: &LogTable, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Create `table` if the backend supports it
    async fn create_table(&self, _table: &LogTable) -> Result<()> {
        Ok(())
    }
}

/// Post-processing hook for a single column value
pub type KeyHandler = Arc<dyn Fn(ColumnValue, &LogRecord) -> ColumnValue + Send + Sync>;

fn default_aliases() -> Vec<(String, Vec<String>)> {
    [
        ("request_id", "{x-request-id}i"),
        ("method", "m"),
        ("protocol", "H"),
        ("path", "full_path"),
        ("client_address", "client_addr"),
        ("status_code", "s"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
    .collect()
}

/// Resolves table columns from a record's fields
#[derive(Clone)]
pub struct RowMapper {
    key_aliases: Vec<(String, Vec<String>)>,
    search_paths: HashMap<String, Vec<String>>,
    key_handlers: HashMap<String, KeyHandler>,
    available_loggers: HashSet<String>,
    renderer: Renderer,
    redactor: Redactor,
}

impl Default for RowMapper {
    fn default() -> Self {
        Self {
            key_aliases: default_aliases(),
            search_paths: HashMap::new(),
            key_handlers: HashMap::new(),
            available_loggers: HashSet::new(),
            renderer: Renderer::json(),
            redactor: Redactor::new(true),
        }
    }
}

impl RowMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alternative field names for a column, replacing any default aliases
    #[must_use]
    pub fn with_alias<I, S>(mut self, column: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column = column.into();
        let aliases: Vec<String> = aliases.into_iter().map(Into::into).collect();
        match self.key_aliases.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = aliases,
            None => self.key_aliases.push((column, aliases)),
        }
        self
    }

    /// Nested lookup for a column, e.g. `user_id` ← `session.user_id`
    #[must_use]
    pub fn with_search_path<I, S>(mut self, column: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_paths
            .insert(column.into(), path.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_key_handler<F>(mut self, column: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ColumnValue, &LogRecord) -> ColumnValue + Send + Sync + 'static,
    {
        self.key_handlers.insert(column.into(), Arc::new(handler));
        self
    }

    /// Persist only records from these loggers
    #[must_use]
    pub fn with_available_loggers<I, S>(mut self, loggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_loggers = loggers.into_iter().map(Into::into).collect();
        self
    }

    /// Renderer used for the `message` column
    #[must_use]
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn accepts(&self, record: &LogRecord) -> bool {
        self.available_loggers.is_empty() || self.available_loggers.contains(record.logger_name())
    }

    fn base_value(&self, column: &Column, record: &LogRecord) -> ColumnValue {
        match column.name.as_str() {
            "timestamp" => ColumnValue::Timestamp(*record.timestamp()),
            "logger" => ColumnValue::Text(record.logger_name().to_string()),
            "level" => ColumnValue::Text(record.level().to_str().to_string()),
            "message" => ColumnValue::Text(self.renderer.render(record)),
            "context" => ColumnValue::Text(record.context().to_json_value().to_string()),
            "traceback" => record
                .traceback()
                .map_or(ColumnValue::Null, |tb| ColumnValue::Text(tb.as_text())),
            _ => ColumnValue::Null,
        }
    }

    fn lookup<'a>(&self, column: &str, source: &'a LogContext) -> Option<&'a FieldValue> {
        if let Some(value) = source.get(column) {
            return Some(value);
        }
        if let Some((_, aliases)) = self.key_aliases.iter().find(|(c, _)| c == column) {
            return aliases.iter().find_map(|alias| source.get(alias));
        }
        if let Some(path) = self.search_paths.get(column) {
            let path: Vec<&str> = path.iter().map(String::as_str).collect();
            return source.get_path(&path);
        }
        None
    }

    /// Build the row for `record`
    pub fn map(&self, table: &LogTable, record: &LogRecord) -> LogRow {
        let request = record.context().get("request").and_then(FieldValue::as_map);
        let sources: Vec<&LogContext> = std::iter::once(record.context())
            .chain(request)
            .chain(std::iter::once(record.attributes()))
            .collect();

        let values = table
            .columns()
            .iter()
            .map(|column| {
                let value = if BASE_COLUMNS.contains(&column.name.as_str()) {
                    self.base_value(column, record)
                } else {
                    sources
                        .iter()
                        .filter_map(|source| self.lookup(&column.name, source))
                        .find(|v| !v.is_null())
                        .map_or(ColumnValue::Null, |v| ColumnValue::from_field(v, column.kind))
                };
                let value = match self.key_handlers.get(&column.name) {
                    Some(handler) => handler(value, record),
                    None => value,
                };
                let value = match value {
                    ColumnValue::Text(text) => match self.redactor.hide_query_password(&text) {
                        Some(hidden) => ColumnValue::Text(hidden),
                        None => ColumnValue::Text(text),
                    },
                    other => other,
                };
                (column.name.clone(), value)
            })
            .collect();

        LogRow { values }
    }
}

impl fmt::Debug for RowMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowMapper")
            .field("key_aliases", &self.key_aliases)
            .field("search_paths", &self.search_paths)
            .field("key_handlers", &self.key_handlers.keys().collect::<Vec<_>>())
            .field("available_loggers", &self.available_loggers)
            .finish()
    }
}

/// Inserts records as rows through a [`LogStore`]
pub struct DatabaseSink {
    store: Arc<dyn LogStore>,
    table: Arc<LogTable>,
    mapper: RowMapper,
    runtime: Option<tokio::runtime::Runtime>,
    queued: bool,
}

impl DatabaseSink {
    pub fn new(store: Arc<dyn LogStore>, table: LogTable) -> Result<Self> {
        Self::with_mapper(store, table, RowMapper::default())
    }

    pub fn with_mapper(store: Arc<dyn LogStore>, table: LogTable, mapper: RowMapper) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("axum-structlog-db")
            .build()
            .map_err(|e| LogError::io_operation("start database runtime", "cannot build runtime", e))?;
        Ok(Self {
            store,
            table: Arc::new(table),
            mapper,
            runtime: Some(runtime),
            queued: true,
        })
    }

    /// Connect an sqlx-backed store for `url` and wrap it in a sink
    ///
    /// With `lazy` the first connection is opened on the first insert, so an
    /// unreachable database surfaces as write failures rather than a setup error.
    pub fn connect(url: &str, table: LogTable, mapper: RowMapper, lazy: bool) -> Result<Self> {
        let mut sink = Self::with_mapper(Arc::new(NoStore), table, mapper)?;
        let store = {
            let runtime = sink.runtime()?;
            if lazy {
                let _guard = runtime.enter();
                super::sql_store::SqlxStore::connect_lazy(url)?
            } else {
                run_blocking(runtime, super::sql_store::SqlxStore::connect(url))?
            }
        };
        sink.store = Arc::new(store);
        Ok(sink)
    }

    /// Deliver through the queue worker (default) or inline on the
    /// logging thread
    #[must_use]
    pub fn with_queued(mut self, queued: bool) -> Self {
        self.queued = queued;
        self
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub fn table(&self) -> &LogTable {
        &self.table
    }

    pub fn mapper(&self) -> &RowMapper {
        &self.mapper
    }

    fn runtime(&self) -> Result<&tokio::runtime::Runtime> {
        self.runtime
            .as_ref()
            .ok_or_else(|| LogError::sink_write("database", "runtime already shut down"))
    }

    pub fn write(&mut self, record: &LogRecord) -> Result<()> {
        if !self.mapper.accepts(record) {
            return Ok(());
        }
        let row = self.mapper.map(&self.table, record);
        let store = Arc::clone(&self.store);
        let table = Arc::clone(&self.table);
        run_blocking(self.runtime()?, async move { store.insert(&table, &row).await })
            .map_err(into_connection_error)
    }

    /// Create the target table when it does not exist yet
    pub fn ensure_table(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let table = Arc::clone(&self.table);
        run_blocking(self.runtime()?, async move { store.create_table(&table).await })
    }

    /// Delete rows older than `ttl_days`
    pub fn purge_expired(&self, ttl_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(ttl_days));
        let store = Arc::clone(&self.store);
        let table = Arc::clone(&self.table);
        run_blocking(self.runtime()?, async move {
            store.purge_older_than(&table, cutoff).await
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for DatabaseSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSink")
            .field("table", &self.table.name())
            .field("mapper", &self.mapper)
            .field("queued", &self.queued)
            .finish()
    }
}

impl Drop for DatabaseSink {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Keeps rows in memory; handy for tests and local development
///
/// Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<parking_lot::Mutex<Vec<LogRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored rows, oldest first
    pub fn rows(&self) -> Vec<LogRow> {
        self.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn insert(&self, _table: &LogTable, row: &LogRow) -> Result<()> {
        self.rows.lock().push(row.clone());
        Ok(())
    }

    async fn purge_older_than(&self, _table: &LogTable, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|row| match row.get("timestamp") {
            Some(ColumnValue::Timestamp(ts)) => *ts >= cutoff,
            _ => true,
        });
        Ok((before - rows.len()) as u64)
    }
}

/// Placeholder store used while the real one is being connected
struct NoStore;

#[async_trait]
impl LogStore for NoStore {
    async fn insert(&self, _table: &LogTable, _row: &LogRow) -> Result<()> {
        Err(LogError::sink_write("database", "store not connected"))
    }

    async fn purge_older_than(&self, _table: &LogTable, _cutoff: DateTime<Utc>) -> Result<u64> {
        Err(LogError::sink_write("database", "store not connected"))
    }
}

fn into_connection_error(err: LogError) -> LogError {
    match err {
        LogError::Database(e) => match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Tls(_) => LogError::connection("database", e.to_string(), 1),
            other => LogError::Database(other),
        },
        other => other,
    }
}

/// Drive `fut` to completion on `runtime`
///
/// When called from inside another runtime the future runs on a scoped
/// helper thread, since blocking the caller's runtime is not allowed.
fn run_blocking<F>(runtime: &tokio::runtime::Runtime, fut: F) -> F::Output
where
    F: Future + Send,
    F::Output: Send,
{
    if tokio::runtime::Handle::try_current().is_err() {
        return runtime.block_on(fut);
    }
    std::thread::scope(|scope| {
        let handle = scope.spawn(|| runtime.block_on(fut));
        match handle.join() {
            Ok(output) => output,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    })
}
