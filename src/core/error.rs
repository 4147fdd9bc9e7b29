//! Error types for the structured logging pipeline

pub type Result<T> = std::result::Result<T, LogError>;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Invalid or incomplete configuration, raised at setup time
    #[error("Invalid configuration for {component}: {message}")]
    Configuration { component: String, message: String },

    /// Access-log template references a token that cannot be resolved
    #[error("Unknown access log token '{token}' in format '{template}'")]
    UnknownToken { token: String, template: String },

    /// A single sink failed to write a record
    #[error("Sink '{sink}' failed to write: {message}")]
    SinkWrite { sink: String, message: String },

    /// Network or database connection failure after retries
    #[error("Connection to {target} failed after {attempts} attempt(s): {message}")]
    Connection {
        target: String,
        message: String,
        attempts: u32,
    },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotation { path: String, message: String },

    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Dispatcher no longer accepts records
    #[error("Queue dispatcher is stopped")]
    DispatcherStopped,

    /// Bounded queue stayed full past the configured wait
    #[error("Log queue full: waited {waited_ms}ms for capacity {capacity}")]
    QueueTimeout { capacity: usize, waited_ms: u64 },
}

impl LogError {
    /// Create a configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LogError::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn unknown_token(token: impl Into<String>, template: impl Into<String>) -> Self {
        LogError::UnknownToken {
            token: token.into(),
            template: template.into(),
        }
    }

    /// Create a sink write error
    pub fn sink_write(sink: impl Into<String>, message: impl Into<String>) -> Self {
        LogError::SinkWrite {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(target: impl Into<String>, message: impl Into<String>, attempts: u32) -> Self {
        LogError::Connection {
            target: target.into(),
            message: message.into(),
            attempts,
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LogError::FileRotation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LogError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// True for errors that must abort startup
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LogError::Configuration { .. } | LogError::UnknownToken { .. }
        )
    }
}
