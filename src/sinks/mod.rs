//! Output targets for log records
//!
//! [`Sink`] is a closed set: console and rotating file are written directly,
//! syslog and database go through the queue dispatcher.

pub mod console;
pub mod database;
pub mod rotating_file;
pub mod sql_store;
pub mod syslog;

pub use console::ConsoleSink;
pub use database::{
    Column, ColumnType, ColumnValue, DatabaseSink, KeyHandler, LogRow, LogStore, LogTable, MemoryStore,
    RowMapper,
};
pub use rotating_file::{RotatingFileSink, RotationPolicy, When};
pub use sql_store::{redacted_url, Dialect, SqlxStore};
pub use syslog::{RetryPolicy, SyslogSink, SyslogTransport, DEFAULT_SYSLOG_PORT};

use crate::core::{LogRecord, Result};

#[derive(Debug)]
pub enum Sink {
    Console(ConsoleSink),
    RotatingFile(RotatingFileSink),
    Syslog(SyslogSink),
    Database(DatabaseSink),
}

impl Sink {
    pub fn write(&mut self, record: &LogRecord) -> Result<()> {
        match self {
            Sink::Console(s) => s.write(record),
            Sink::RotatingFile(s) => s.write(record),
            Sink::Syslog(s) => s.write(record),
            Sink::Database(s) => s.write(record),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        match self {
            Sink::Console(s) => s.flush(),
            Sink::RotatingFile(s) => s.flush(),
            Sink::Syslog(s) => s.flush(),
            Sink::Database(s) => s.flush(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sink::Console(_) => "console",
            Sink::RotatingFile(_) => "file",
            Sink::Syslog(_) => "syslog",
            Sink::Database(_) => "internal",
        }
    }

    /// Whether writes may block on the network and must be queued
    pub fn is_async(&self) -> bool {
        match self {
            Sink::Syslog(_) => true,
            Sink::Database(s) => s.is_queued(),
            Sink::Console(_) | Sink::RotatingFile(_) => false,
        }
    }
}

impl From<ConsoleSink> for Sink {
    fn from(sink: ConsoleSink) -> Self {
        Sink::Console(sink)
    }
}

impl From<RotatingFileSink> for Sink {
    fn from(sink: RotatingFileSink) -> Self {
        Sink::RotatingFile(sink)
    }
}

impl From<SyslogSink> for Sink {
    fn from(sink: SyslogSink) -> Self {
        Sink::Syslog(sink)
    }
}

impl From<DatabaseSink> for Sink {
    fn from(sink: DatabaseSink) -> Self {
        Sink::Database(sink)
    }
}
