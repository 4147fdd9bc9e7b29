//! Records, the processor chain and the delivery pipeline

pub mod dispatcher;
pub mod error;
pub mod log_context;
pub mod log_level;
pub mod log_record;
pub mod logger;
pub mod metrics;
pub mod processor;
pub mod redact;
pub mod renderer;
pub mod timestamp;

pub use dispatcher::{
    DrainReport, OverflowPolicy, QueueCapacity, QueueConfig, QueueDispatcher, WorkerStatus,
    DEFAULT_CAPACITY, DEFAULT_DRAIN_TIMEOUT,
};
pub use error::{LogError, Result};
pub use log_context::{FieldValue, LogContext, LoggerContext};
pub use log_level::LogLevel;
pub use log_record::{ErrorFrame, LogRecord, Source, Traceback};
pub use logger::{global, install_panic_hook, LogPipeline, Logger, DEFAULT_TTL_DAYS};
pub use metrics::DispatcherMetrics;
pub use processor::{ContextLayers, ErrorReporter, ProcessorChain};
pub use redact::{Redactor, REDACTED};
pub use renderer::{RenderMode, Renderer, DEFAULT_EVENT_KEY};
pub use timestamp::TimestampFormat;
