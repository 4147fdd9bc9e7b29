//! Logging macros with `format!` style arguments
//!
//! Formatting is skipped when the level is filtered out. Every record
//! carries a `source` map with the module, file, function and line of
//! the macro invocation.
//!
//! # Examples
//!
//! ```
//! use axum_structlog::prelude::*;
//! use axum_structlog::info;
//!
//! let logger = Logger::disabled();
//!
//! info!(logger, "Server started");
//!
//! let port = 8080;
//! info!(logger, "Server listening on port {}", port);
//! ```

/// Location of the invocation as a [`Source`](crate::core::Source)
///
/// The function name comes from the type name of an item declared at
/// the call site.
///
/// ```
/// use axum_structlog::call_site;
///
/// fn handler() -> axum_structlog::core::Source {
///     call_site!()
/// }
///
/// let source = handler();
/// assert_eq!(source.func_name.as_deref(), Some("handler"));
/// assert!(source.lineno > 0);
/// ```
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __here() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::core::Source::new(module_path!(), file!(), line!())
            .with_function_path(__type_name_of(__here))
    }};
}

/// Log a message at an explicit level, tagged with the call site.
///
/// ```
/// # use axum_structlog::prelude::*;
/// # let logger = Logger::disabled();
/// use axum_structlog::log;
/// log!(logger, LogLevel::Info, "Simple message");
/// log!(logger, LogLevel::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {{
        let logger = &$logger;
        let level = $level;
        if logger.is_enabled_for(level) {
            logger.log_at(level, format!($($arg)+), $crate::call_site!());
        }
    }};
}

/// ```
/// # use axum_structlog::prelude::*;
/// # let logger = Logger::disabled();
/// use axum_structlog::debug;
/// debug!(logger, "Counter value: {}", 10);
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// ```
/// # use axum_structlog::prelude::*;
/// # let logger = Logger::disabled();
/// use axum_structlog::warning;
/// warning!(logger, "Retry attempt {} of {}", 3, 5);
/// ```
#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Warning, $($arg)+)
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! critical {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Critical, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use crate::core::{LogLevel, LogPipeline, Logger, ProcessorChain, QueueConfig, Renderer};
    use crate::sinks::{ConsoleSink, Sink};
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(level: LogLevel) -> (Logger, Captured) {
        let out = Captured::default();
        let pipeline = LogPipeline::new(
            vec![Sink::from(ConsoleSink::with_writer(Renderer::json(), out.clone()))],
            ProcessorChain::default(),
            QueueConfig::default(),
        )
        .with_min_level(level);
        (Logger::new("macros", pipeline).unwrap(), out)
    }

    fn text(out: &Captured) -> String {
        String::from_utf8_lossy(&out.0.lock()).into_owned()
    }

    #[test]
    fn test_level_macros() {
        let (logger, out) = capture(LogLevel::Debug);
        debug!(logger, "debug {}", 1);
        info!(logger, "info {}", 2);
        warning!(logger, "warning {}", 3);
        error!(logger, "error {}", 4);
        critical!(logger, "critical {}", 5);
        log!(logger, LogLevel::Info, "plain");

        let text = text(&out);
        for expected in ["debug 1", "info 2", "warning 3", "error 4", "critical 5", "plain"] {
            assert!(text.contains(expected), "missing {expected}");
        }
    }

    #[test]
    fn test_source_points_at_invocation() {
        let (logger, out) = capture(LogLevel::Debug);
        let line = line!() + 1;
        info!(logger, "located");

        let record: serde_json::Value = serde_json::from_str(text(&out).trim()).unwrap();
        let source = &record["source"];
        assert_eq!(source["lineno"], line);
        assert_eq!(source["filename"], "macros.rs");
        assert_eq!(source["module"], module_path!());
        assert_eq!(source["func_name"], "test_source_points_at_invocation");
    }

    #[test]
    fn test_filtered_level_is_not_formatted() {
        struct Loud;
        impl std::fmt::Display for Loud {
            fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                panic!("formatted a filtered record");
            }
        }

        let (logger, out) = capture(LogLevel::Warning);
        debug!(logger, "{}", Loud);
        assert!(text(&out).is_empty());
    }
}
