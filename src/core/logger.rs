//! Logger handle and the pipeline it feeds

use super::{
    dispatcher::{self, DrainReport, QueueConfig, QueueDispatcher, WORKER_THREAD_NAME},
    error::{LogError, Result},
    log_context::{FieldValue, LogContext, LoggerContext},
    log_level::LogLevel,
    log_record::{LogRecord, Source, Traceback},
    metrics::DispatcherMetrics,
    processor::{ContextLayers, ProcessorChain},
};
use crate::middleware::scope;
use crate::sinks::Sink;
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Default retention for persisted rows, in days
pub const DEFAULT_TTL_DAYS: u32 = 90;

thread_local! {
    /// Set while this thread is inside the pipeline, so a panic raised by a
    /// sink is not logged back into the same pipeline
    static EMITTING: Cell<bool> = const { Cell::new(false) };
}

enum Delivery {
    Disabled,
    Direct(Mutex<Vec<Sink>>),
    Queued(QueueDispatcher),
}

/// Processor chain plus the sinks it delivers to
///
/// When any sink is asynchronous (syslog or database) every sink is driven
/// by one [`QueueDispatcher`] so records reach all of them in the same order.
/// Otherwise sinks are written directly on the calling thread.
pub struct LogPipeline {
    min_level: LogLevel,
    chain: ProcessorChain,
    delivery: Delivery,
    metrics: Arc<DispatcherMetrics>,
    ttl_days: u32,
}

impl LogPipeline {
    /// Pipeline that drops everything
    pub fn disabled() -> Self {
        Self {
            min_level: LogLevel::Critical,
            chain: ProcessorChain::default(),
            delivery: Delivery::Disabled,
            metrics: Arc::new(DispatcherMetrics::new()),
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }

    pub fn new(sinks: Vec<Sink>, chain: ProcessorChain, queue: QueueConfig) -> Self {
        let delivery = if sinks.iter().any(Sink::is_async) {
            Delivery::Queued(QueueDispatcher::new(sinks, queue))
        } else {
            Delivery::Direct(Mutex::new(sinks))
        };
        Self {
            min_level: LogLevel::default(),
            chain,
            delivery,
            metrics: Arc::new(DispatcherMetrics::new()),
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_ttl_days(mut self, days: u32) -> Self {
        self.ttl_days = days;
        self
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.delivery, Delivery::Disabled)
    }

    pub fn chain(&self) -> &ProcessorChain {
        &self.chain
    }

    /// The dispatcher, when the pipeline is queued
    pub fn dispatcher(&self) -> Option<&QueueDispatcher> {
        match &self.delivery {
            Delivery::Queued(d) => Some(d),
            _ => None,
        }
    }

    pub fn start(&self) -> Result<()> {
        match &self.delivery {
            Delivery::Queued(d) => d.start(),
            _ => Ok(()),
        }
    }

    /// Drain and stop the dispatcher, or flush direct sinks
    pub fn stop(&self) -> Option<DrainReport> {
        match &self.delivery {
            Delivery::Queued(d) => Some(d.stop()),
            Delivery::Direct(sinks) => {
                dispatcher::flush_all(&mut sinks.lock());
                None
            }
            Delivery::Disabled => None,
        }
    }

    /// Counters for the active delivery path
    pub fn metrics(&self) -> DispatcherMetrics {
        match &self.delivery {
            Delivery::Queued(d) => d.metrics().clone(),
            _ => (*self.metrics).clone(),
        }
    }

    fn purge_expired(&self) -> Result<u64> {
        match &self.delivery {
            Delivery::Queued(d) => d.purge_expired(self.ttl_days),
            Delivery::Direct(sinks) => dispatcher::purge_sinks(&sinks.lock(), self.ttl_days),
            Delivery::Disabled => Ok(0),
        }
    }

    fn dispatch(&self, record: LogRecord) -> Result<()> {
        match &self.delivery {
            Delivery::Disabled => Ok(()),
            Delivery::Direct(sinks) => {
                self.metrics.record_enqueued();
                dispatcher::deliver(&mut sinks.lock(), &record, &self.metrics);
                Ok(())
            }
            Delivery::Queued(d) => d.enqueue(Arc::new(record)),
        }
    }
}

impl std::fmt::Debug for LogPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let delivery = match &self.delivery {
            Delivery::Disabled => "disabled",
            Delivery::Direct(_) => "direct",
            Delivery::Queued(_) => "queued",
        };
        f.debug_struct("LogPipeline")
            .field("min_level", &self.min_level)
            .field("delivery", &delivery)
            .field("ttl_days", &self.ttl_days)
            .finish()
    }
}

struct Shared {
    pipeline: RwLock<Arc<LogPipeline>>,
    context: LoggerContext,
    stop_warned: AtomicBool,
}

/// Cheap, cloneable logging handle
///
/// Clones share the pipeline and the process-wide context; [`child`](Self::child)
/// and [`bind`](Self::bind) derive handles with a different name or extra fields.
///
/// # Example
///
/// ```
/// use axum_structlog::prelude::*;
///
/// let pipeline = LogPipeline::new(
///     vec![Sink::from(ConsoleSink::with_writer(Renderer::json(), Vec::new()))],
///     ProcessorChain::default(),
///     QueueConfig::default(),
/// );
/// let logger = Logger::new("api", pipeline).unwrap();
/// let request_logger = logger.bind("request_id", "abc-123");
///
/// request_logger.info("handling request");
/// logger.shutdown();
/// ```
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    bound: Arc<LogContext>,
    shared: Arc<Shared>,
}

impl Logger {
    /// Wrap `pipeline` and start its dispatcher
    pub fn new(name: impl AsRef<str>, pipeline: LogPipeline) -> Result<Self> {
        pipeline.start()?;
        Ok(Self {
            name: Arc::from(name.as_ref()),
            bound: Arc::new(LogContext::new()),
            shared: Arc::new(Shared {
                pipeline: RwLock::new(Arc::new(pipeline)),
                context: LoggerContext::new(),
                stop_warned: AtomicBool::new(false),
            }),
        })
    }

    /// Logger on which every call is a no-op
    pub fn disabled() -> Self {
        Self {
            name: Arc::from("default"),
            bound: Arc::new(LogContext::new()),
            shared: Arc::new(Shared {
                pipeline: RwLock::new(Arc::new(LogPipeline::disabled())),
                context: LoggerContext::new(),
                stop_warned: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same pipeline and bound fields under another logger name
    #[must_use]
    pub fn child(&self, name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            bound: Arc::clone(&self.bound),
            shared: Arc::clone(&self.shared),
        }
    }

    /// New handle carrying an extra field on every record
    #[must_use]
    pub fn bind<K, V>(&self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let mut bound = (*self.bound).clone();
        bound.add_field(key, value);
        Self {
            name: Arc::clone(&self.name),
            bound: Arc::new(bound),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Fields attached to every record of every handle sharing this pipeline
    pub fn context(&self) -> &LoggerContext {
        &self.shared.context
    }

    fn pipeline(&self) -> Arc<LogPipeline> {
        Arc::clone(&self.shared.pipeline.read())
    }

    /// Replace the active pipeline
    ///
    /// The new pipeline is started before it becomes visible; the previous one
    /// is then drained and its report returned.
    pub fn install(&self, pipeline: LogPipeline) -> Result<Option<DrainReport>> {
        pipeline.start()?;
        let old = std::mem::replace(&mut *self.shared.pipeline.write(), Arc::new(pipeline));
        self.shared.stop_warned.store(false, Ordering::Relaxed);
        Ok(old.stop())
    }

    /// Start the dispatcher of the active pipeline (idempotent)
    pub fn start(&self) -> Result<()> {
        self.pipeline().start()
    }

    /// Drain queued records and stop delivery
    pub fn shutdown(&self) -> Option<DrainReport> {
        self.pipeline().stop()
    }

    pub fn is_enabled_for(&self, level: LogLevel) -> bool {
        let pipeline = self.pipeline();
        !pipeline.is_disabled() && level >= pipeline.min_level()
    }

    pub fn metrics(&self) -> DispatcherMetrics {
        self.pipeline().metrics()
    }

    /// Delete persisted rows older than the configured TTL
    pub fn purge_expired_logs(&self) -> Result<u64> {
        self.pipeline().purge_expired()
    }

    pub(crate) fn emit(
        &self,
        level: LogLevel,
        message: &str,
        call_site: LogContext,
        attributes: LogContext,
        traceback: Option<Traceback>,
        source: Option<Source>,
    ) {
        let pipeline = self.pipeline();
        if pipeline.is_disabled() || level < pipeline.min_level() {
            return;
        }

        let layers = ContextLayers {
            global: &self.shared.context,
            bound: &self.bound,
            scope: scope::current(),
            call_site,
            source,
        };
        let record = pipeline
            .chain()
            .process(&self.name, level, message, layers, attributes, traceback);

        let was_emitting = EMITTING.with(|flag| flag.replace(true));
        let result = pipeline.dispatch(record);
        EMITTING.with(|flag| flag.set(was_emitting));

        if let Err(e) = result {
            self.report_dispatch_error(&e);
        }
    }

    fn report_dispatch_error(&self, err: &LogError) {
        match err {
            LogError::DispatcherStopped => {
                if !self.shared.stop_warned.swap(true, Ordering::Relaxed) {
                    eprintln!(
                        "[LOGGER WARNING] Log record dropped: dispatcher is stopped. \
                         Further records will be dropped silently until restart."
                    );
                }
            }
            // overflow timeouts are already reported by the dispatcher
            LogError::QueueTimeout { .. } => {}
            other => eprintln!("[LOGGER ERROR] Failed to dispatch log record: {}", other),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        self.emit(level, message.as_ref(), LogContext::new(), LogContext::new(), None, None);
    }

    /// Log with the location of the call attached as `source`
    pub fn log_at(&self, level: LogLevel, message: impl AsRef<str>, source: Source) {
        self.emit(
            level,
            message.as_ref(),
            LogContext::new(),
            LogContext::new(),
            None,
            Some(source),
        );
    }

    /// Log with structured context fields
    pub fn log_with_context(&self, level: LogLevel, message: impl AsRef<str>, context: LogContext) {
        self.emit(level, message.as_ref(), context, LogContext::new(), None, None);
    }

    #[inline]
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message);
    }

    #[inline]
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn critical(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Critical, message);
    }

    /// Log at ERROR with the error chain attached as a traceback
    pub fn exception(&self, message: impl AsRef<str>, err: &(dyn StdError + 'static)) {
        let traceback = Traceback::from_error(err, self.pipeline().chain().traceback_as_str());
        self.emit(
            LogLevel::Error,
            message.as_ref(),
            LogContext::new(),
            LogContext::new(),
            Some(traceback),
            None,
        );
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("bound", &self.bound)
            .field("pipeline", &*self.pipeline())
            .finish()
    }
}

static GLOBAL: OnceLock<Logger> = OnceLock::new();

/// Process-wide logger, disabled until a pipeline is installed on it
pub fn global() -> &'static Logger {
    GLOBAL.get_or_init(Logger::disabled)
}

/// Log uncaught panics as `Uncaught exception` at ERROR
///
/// Panics raised while a record is being delivered are passed to the
/// previously installed hook instead, so a failing sink cannot recurse.
pub fn install_panic_hook(logger: Logger) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let on_worker = std::thread::current().name() == Some(WORKER_THREAD_NAME);
        if on_worker || EMITTING.with(Cell::get) {
            previous(info);
            return;
        }

        let message = dispatcher::panic_message(info.payload());
        let mut context = LogContext::new().with_field("panic", message.clone());
        if let Some(location) = info.location() {
            context.add_field(
                "location",
                format!("{}:{}:{}", location.file(), location.line(), location.column()),
            );
        }
        if let Some(thread) = std::thread::current().name() {
            context.add_field("thread", thread);
        }
        logger.emit(
            LogLevel::Error,
            "Uncaught exception",
            context,
            LogContext::new(),
            Some(Traceback::from_text(message)),
            None,
        );
    }));
}
