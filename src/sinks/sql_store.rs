//! `LogStore` backed by an sqlx `AnyPool` (sqlite or postgres)

use super::database::{ColumnType, ColumnValue, LogRow, LogStore, LogTable};
use crate::core::{LogError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyPool};
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(LogError::config(
                "database",
                format!("unsupported database url scheme '{}'", other),
            )),
        }
    }

    fn placeholder(&self, index: usize, kind: ColumnType) -> String {
        match (self, kind) {
            (Dialect::Sqlite, _) => "?".to_string(),
            (Dialect::Postgres, ColumnType::Timestamp) => format!("CAST(${} AS TIMESTAMPTZ)", index),
            (Dialect::Postgres, _) => format!("${}", index),
        }
    }

    fn column_type(&self, kind: ColumnType) -> &'static str {
        match (self, kind) {
            (_, ColumnType::Text) => "TEXT",
            (Dialect::Sqlite, ColumnType::Integer) => "INTEGER",
            (Dialect::Postgres, ColumnType::Integer) => "BIGINT",
            (Dialect::Sqlite, ColumnType::Float) => "REAL",
            (Dialect::Postgres, ColumnType::Float) => "DOUBLE PRECISION",
            (Dialect::Sqlite, ColumnType::Timestamp) => "TEXT",
            (Dialect::Postgres, ColumnType::Timestamp) => "TIMESTAMPTZ",
        }
    }

    fn primary_key(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Postgres => "\"id\" BIGSERIAL PRIMARY KEY",
        }
    }
}

/// Quote an identifier after checking it is a plain name
fn quote_ident(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(LogError::config(
            "database",
            format!("invalid identifier '{}'", name),
        ));
    }
    Ok(format!("\"{}\"", name))
}

fn timestamp_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &ColumnValue,
    kind: ColumnType,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        ColumnValue::Text(s) => query.bind(s.clone()),
        ColumnValue::Integer(i) => query.bind(*i),
        ColumnValue::Float(f) => query.bind(*f),
        ColumnValue::Timestamp(ts) => query.bind(timestamp_text(ts)),
        ColumnValue::Null => match kind {
            ColumnType::Integer => query.bind(None::<i64>),
            ColumnType::Float => query.bind(None::<f64>),
            ColumnType::Text | ColumnType::Timestamp => query.bind(None::<String>),
        },
    }
}

/// Relational store for log rows
#[derive(Debug, Clone)]
pub struct SqlxStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxStore {
    fn pool_options() -> AnyPoolOptions {
        sqlx::any::install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
    }

    /// Connect eagerly; fails if the database is unreachable
    pub async fn connect(url: &str) -> Result<Self> {
        let dialect = Dialect::from_url(url)?;
        let pool = Self::pool_options()
            .connect(url)
            .await
            .map_err(|e| LogError::connection(redacted_url(url), e.to_string(), 1))?;
        Ok(Self { pool, dialect })
    }

    /// Build the pool without opening a connection
    ///
    /// Must be called from within a tokio runtime context.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let dialect = Dialect::from_url(url)?;
        let pool = Self::pool_options()
            .connect_lazy(url)
            .map_err(|e| LogError::config("database", e.to_string()))?;
        Ok(Self { pool, dialect })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn insert_sql(&self, table: &LogTable) -> Result<String> {
        let mut names = Vec::with_capacity(table.columns().len());
        let mut params = Vec::with_capacity(table.columns().len());
        for (i, column) in table.columns().iter().enumerate() {
            names.push(quote_ident(&column.name)?);
            params.push(self.dialect.placeholder(i + 1, column.kind));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table.name())?,
            names.join(", "),
            params.join(", ")
        ))
    }
}

#[async_trait]
impl LogStore for SqlxStore {
    async fn insert(&self, table: &LogTable, row: &LogRow) -> Result<()> {
        let sql = self.insert_sql(table)?;
        let mut query = sqlx::query::<Any>(&sql);
        for column in table.columns() {
            let value = row.get(&column.name).unwrap_or(&ColumnValue::Null);
            query = bind_value(query, value, column.kind);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn purge_older_than(&self, table: &LogTable, cutoff: DateTime<Utc>) -> Result<u64> {
        let column = table.column("timestamp").ok_or_else(|| {
            LogError::config(
                "database",
                format!("table '{}' has no timestamp column", table.name()),
            )
        })?;
        let sql = format!(
            "DELETE FROM {} WHERE {} < {}",
            quote_ident(table.name())?,
            quote_ident(&column.name)?,
            self.dialect.placeholder(1, ColumnType::Timestamp)
        );
        let result = sqlx::query::<Any>(&sql)
            .bind(timestamp_text(&cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_table(&self, table: &LogTable) -> Result<()> {
        let mut columns = vec![self.dialect.primary_key().to_string()];
        for column in table.columns() {
            columns.push(format!(
                "{} {}",
                quote_ident(&column.name)?,
                self.dialect.column_type(column.kind)
            ));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table.name())?,
            columns.join(", ")
        );
        sqlx::query::<Any>(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// Connection string with any password removed, for error messages
pub fn redacted_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{}://{}@{}", scheme, user, host)
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogContext, LogLevel, LogRecord};
    use crate::sinks::{DatabaseSink, RowMapper};
    use sqlx::Row;
    use tempfile::TempDir;

    fn sqlite_url(dir: &TempDir) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join("logs.db").display())
    }

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert_eq!(
            Dialect::from_url("postgres://u@localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert!(Dialect::from_url("mysql://localhost/db").unwrap_err().is_configuration());
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        assert!(quote_ident("logs; DROP TABLE x").is_err());
        assert_eq!(quote_ident("app_logs").unwrap(), "\"app_logs\"");
    }

    #[test]
    fn test_redacted_url_hides_password() {
        assert_eq!(
            redacted_url("postgres://admin:hunter2@db:5432/logs"),
            "postgres://admin@db:5432/logs"
        );
    }

    #[tokio::test]
    async fn test_insert_and_purge_sqlite() {
        let dir = TempDir::new().unwrap();
        let store = SqlxStore::connect(&sqlite_url(&dir)).await.unwrap();
        let table = LogTable::base("logs").with_column("request_id", ColumnType::Text);
        store.create_table(&table).await.unwrap();

        let record = LogRecord::new("app", LogLevel::Warning, "stored")
            .with_context(LogContext::new().with_field("request_id", "abc"));
        let row = RowMapper::new().map(&table, &record);
        store.insert(&table, &row).await.unwrap();

        let fetched = sqlx::query("SELECT logger, level, request_id, traceback FROM logs")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(fetched.get::<String, _>("logger"), "app");
        assert_eq!(fetched.get::<String, _>("level"), "WARNING");
        assert_eq!(fetched.get::<String, _>("request_id"), "abc");
        assert_eq!(fetched.get::<Option<String>, _>("traceback"), None);

        let purged = store
            .purge_older_than(&table, Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }

    #[test]
    fn test_database_sink_over_sqlite() {
        let dir = TempDir::new().unwrap();
        let mut sink =
            DatabaseSink::connect(&sqlite_url(&dir), LogTable::base("logs"), RowMapper::new(), true)
                .unwrap();
        sink.ensure_table().unwrap();

        sink.write(&LogRecord::new("app", LogLevel::Info, "one")).unwrap();
        sink.write(&LogRecord::new("app", LogLevel::Info, "two")).unwrap();

        assert_eq!(sink.purge_expired(1).unwrap(), 0);
    }

    #[test]
    fn test_missing_table_surfaces_error() {
        let dir = TempDir::new().unwrap();
        let mut sink =
            DatabaseSink::connect(&sqlite_url(&dir), LogTable::base("missing"), RowMapper::new(), false)
                .unwrap();
        assert!(sink.write(&LogRecord::new("app", LogLevel::Info, "x")).is_err());
    }
}
