//! Processor chain turning a log call into a finished record
//!
//! Steps run in a fixed order: process-wide context, logger-bound fields,
//! request scope, call-site fields, the `source` location, record
//! construction, redaction, then error reporters for ERROR and above.
//! Rendering happens per sink.

use super::dispatcher::panic_message;
use super::log_context::{LogContext, LoggerContext};
use super::log_level::LogLevel;
use super::log_record::{LogRecord, Source, Traceback};
use super::redact::Redactor;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Receives every record at ERROR or above before it is dispatched
///
/// This is where an error-tracking client (e.g. Sentry) hooks in.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, record: &LogRecord);
}

/// Context sources for one log call, merged lowest priority first
pub struct ContextLayers<'a> {
    pub global: &'a LoggerContext,
    pub bound: &'a LogContext,
    pub scope: Option<LogContext>,
    pub call_site: LogContext,
    /// Attached as the `source` map, replacing any bound `source` field
    pub source: Option<Source>,
}

#[derive(Clone)]
pub struct ProcessorChain {
    redactor: Redactor,
    reporters: Vec<Arc<dyn ErrorReporter>>,
    traceback_as_str: bool,
}

impl Default for ProcessorChain {
    fn default() -> Self {
        Self::new(Redactor::default())
    }
}

impl ProcessorChain {
    pub fn new(redactor: Redactor) -> Self {
        Self {
            redactor,
            reporters: Vec::new(),
            traceback_as_str: true,
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Render tracebacks as one string instead of a list of frames
    #[must_use]
    pub fn with_traceback_as_str(mut self, enabled: bool) -> Self {
        self.traceback_as_str = enabled;
        self
    }

    pub fn traceback_as_str(&self) -> bool {
        self.traceback_as_str
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn process(
        &self,
        logger_name: &str,
        level: LogLevel,
        message: &str,
        layers: ContextLayers<'_>,
        attributes: LogContext,
        traceback: Option<Traceback>,
    ) -> LogRecord {
        let mut context = layers.global.snapshot();
        context.merge_from(layers.bound, true);
        if let Some(scope) = &layers.scope {
            context.merge_from(scope, true);
        }
        context.merge_from(&layers.call_site, true);
        if let Some(source) = &layers.source {
            context.add_field("source", source.to_context());
        }

        let mut record = LogRecord::new(logger_name, level, message)
            .with_context(context)
            .with_attributes(attributes);
        if let Some(traceback) = traceback {
            record = record.with_traceback(traceback);
        }

        self.redactor.redact_context(record.context_mut());
        self.redactor.redact_context(record.attributes_mut());
        if let Some(hidden) = self.redactor.hide_query_password(record.message()) {
            *record.message_mut() = hidden;
        }

        if level >= LogLevel::Error {
            self.report(&record);
        }
        record
    }

    fn report(&self, record: &LogRecord) {
        for reporter in &self.reporters {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| reporter.report(record))) {
                eprintln!(
                    "[LOGGER ERROR] Error reporter panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("redactor", &self.redactor)
            .field("reporters", &self.reporters.len())
            .field("traceback_as_str", &self.traceback_as_str)
            .finish()
    }
}
