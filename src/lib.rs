//! # axum-structlog
//!
//! Structured logging for axum services: one processor chain feeding
//! console, rotating file, syslog and database sinks, with an access log
//! and per-request context supplied by middleware.
//!
//! ## Features
//!
//! - **Structured records**: context merged from the process, the handle,
//!   the current request and the call site, rendered as JSON or console lines
//! - **Background delivery**: network and database sinks are driven by a
//!   single drain worker behind a bounded queue
//! - **Access log**: `%(token)s` templates compatible with gunicorn-style formats
//! - **Environment configuration**: `LOG__*` variables, see [`config::LogSettings`]
//!
//! ```no_run
//! use axum_structlog::config::{setup_logger, LogSettings};
//!
//! let settings = LogSettings::from_env().unwrap();
//! let logger = setup_logger(&settings, None).unwrap();
//! logger.info("service started");
//! ```

pub mod access;
pub mod config;
pub mod core;
pub mod macros;
pub mod middleware;
pub mod sentry;
pub mod sinks;

pub mod prelude {
    pub use crate::access::{AccessFields, AccessLogFormat};
    pub use crate::config::{setup_logger, LogSettings, LoggingConfigurator, SinkType};
    pub use crate::core::{
        DispatcherMetrics, DrainReport, FieldValue, LogContext, LogError, LogLevel, LogPipeline,
        LogRecord, Logger, LoggerContext, OverflowPolicy, ProcessorChain, QueueCapacity,
        QueueConfig, QueueDispatcher, Redactor, RenderMode, Renderer, Result, TimestampFormat,
        Traceback,
    };
    pub use crate::middleware::AccessLogLayer;
    pub use crate::sinks::{
        ConsoleSink, DatabaseSink, LogTable, RotatingFileSink, RotationPolicy, RowMapper, Sink,
        SyslogSink, When,
    };
}

pub use crate::core::{
    DispatcherMetrics, DrainReport, FieldValue, LogContext, LogError, LogLevel, LogPipeline,
    LogRecord, Logger, LoggerContext, OverflowPolicy, ProcessorChain, QueueCapacity, QueueConfig,
    QueueDispatcher, Redactor, RenderMode, Renderer, Result, TimestampFormat, Traceback,
};
pub use crate::sinks::Sink;
