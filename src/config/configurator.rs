//! Builds a [`LogPipeline`] from [`LogSettings`]

use super::settings::{LogSettings, SinkType};
use crate::core::dispatcher::QueueConfig;
use crate::core::error::{LogError, Result};
use crate::core::logger::{self, LogPipeline, Logger};
use crate::core::processor::{ErrorReporter, ProcessorChain};
use crate::core::redact::Redactor;
use crate::core::renderer::Renderer;
use crate::sinks::{
    ConsoleSink, DatabaseSink, RotatingFileSink, RotationPolicy, Sink, SyslogSink,
};
use std::collections::HashMap;
use std::sync::{Arc, Once};

/// Collects sinks and reporters, then turns settings into a pipeline
///
/// Sinks are instantiated for every entry of `types`, in that order. A sink
/// registered with [`sink`](Self::sink) replaces the one the settings
/// would build for the same type.
///
/// ```
/// use axum_structlog::config::{LogSettings, LoggingConfigurator};
///
/// let mut settings = LogSettings::default();
/// settings.enable = true;
/// let pipeline = LoggingConfigurator::new(settings).setup().unwrap();
/// assert!(!pipeline.is_disabled());
/// ```
pub struct LoggingConfigurator {
    settings: LogSettings,
    registered: HashMap<SinkType, Sink>,
    reporters: Vec<Arc<dyn ErrorReporter>>,
    queue: QueueConfig,
}

impl LoggingConfigurator {
    pub fn new(settings: LogSettings) -> Self {
        Self {
            settings,
            registered: HashMap::new(),
            reporters: Vec::new(),
            queue: QueueConfig::default(),
        }
    }

    pub fn settings(&self) -> &LogSettings {
        &self.settings
    }

    /// Sink used for the `internal` type
    ///
    /// `DB__IS_ASYNC=false` writes it inline instead of through the queue.
    #[must_use]
    pub fn database(self, sink: DatabaseSink) -> Self {
        let queued = self.settings.db.is_async;
        self.sink(SinkType::Internal, Sink::from(sink.with_queued(queued)))
    }

    #[must_use]
    pub fn sink(mut self, kind: SinkType, sink: Sink) -> Self {
        self.registered.insert(kind, sink);
        self
    }

    /// Called for every record at ERROR or above
    #[must_use]
    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    #[must_use]
    pub fn queue(mut self, config: QueueConfig) -> Self {
        self.queue = config;
        self
    }

    /// Renderer for console and syslog output
    pub fn base_renderer(&self) -> Renderer {
        let renderer = if self.settings.json_logs {
            Renderer::json()
        } else {
            Renderer::console(true)
        };
        renderer.with_event_key(self.settings.event_key.as_str())
    }

    /// Same as [`base_renderer`](Self::base_renderer) without colors
    pub fn file_renderer(&self) -> Renderer {
        let renderer = if self.settings.json_logs {
            Renderer::json()
        } else {
            Renderer::console(false)
        };
        renderer.with_event_key(self.settings.event_key.as_str())
    }

    pub fn processor_chain(&self) -> ProcessorChain {
        let chain = ProcessorChain::new(Redactor::new(!self.settings.debug))
            .with_traceback_as_str(self.settings.traceback_as_str);
        self.reporters
            .iter()
            .cloned()
            .fold(chain, ProcessorChain::with_reporter)
    }

    /// Build the pipeline
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a listed type lacks its
    /// parameters, and the sink's own error when it cannot be opened.
    pub fn setup(mut self) -> Result<LogPipeline> {
        self.settings.validate()?;
        if !self.settings.enable {
            return Ok(LogPipeline::disabled());
        }

        let mut kinds = Vec::with_capacity(self.settings.types.len());
        for kind in &self.settings.types {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }

        let mut sinks = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let sink = match self.registered.remove(&kind) {
                Some(sink) => sink,
                None => self.build_sink(kind)?,
            };
            sinks.push(sink);
        }

        Ok(LogPipeline::new(sinks, self.processor_chain(), self.queue)
            .with_min_level(self.settings.effective_level())
            .with_ttl_days(self.settings.ttl))
    }

    fn build_sink(&self, kind: SinkType) -> Result<Sink> {
        let settings = &self.settings;
        let sink = match kind {
            SinkType::Console => Sink::from(ConsoleSink::new(self.base_renderer())),
            SinkType::File => {
                let path = settings.filename.as_ref().ok_or_else(|| {
                    LogError::config(
                        "FILENAME",
                        "The path to the log file is not specified when using the file logging type",
                    )
                })?;
                let policy = RotationPolicy::new()
                    .with_when(settings.when)
                    .with_backup_count(settings.backup_count);
                Sink::from(RotatingFileSink::new(path, policy, self.file_renderer())?)
            }
            SinkType::Syslog => {
                let host = settings
                    .syslog
                    .host
                    .as_deref()
                    .ok_or_else(|| LogError::config("SYSLOG__HOST", "No host is specified to use syslog"))?;
                Sink::from(SyslogSink::new(host, settings.syslog.port, self.base_renderer())?)
            }
            SinkType::Internal => {
                return Err(LogError::config(
                    "internal",
                    "A database sink is required when logging into a database",
                ))
            }
        };
        Ok(sink)
    }
}

impl std::fmt::Debug for LoggingConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingConfigurator")
            .field("settings", &self.settings)
            .field("registered", &self.registered.keys().collect::<Vec<_>>())
            .field("reporters", &self.reporters.len())
            .field("queue", &self.queue)
            .finish()
    }
}

static PANIC_HOOK: Once = Once::new();

/// Configure the process-wide logger and return a handle named after
/// `settings.logger`
///
/// Calling it again replaces the active pipeline; the previous one is
/// drained. The panic hook is installed on the first call.
pub fn setup_logger(settings: &LogSettings, database: Option<DatabaseSink>) -> Result<Logger> {
    let mut configurator = LoggingConfigurator::new(settings.clone());
    if let Some(sink) = database {
        configurator = configurator.database(sink);
    }
    let pipeline = configurator.setup()?;

    let root = logger::global();
    if let Some(report) = root.install(pipeline)? {
        if report.discarded > 0 {
            eprintln!(
                "[LOGGER WARNING] Previous pipeline discarded {} record(s) on reconfiguration",
                report.discarded
            );
        }
    }
    PANIC_HOOK.call_once(|| logger::install_panic_hook(root.clone()));
    Ok(root.child(&settings.logger))
}
