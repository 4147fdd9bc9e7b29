//! Log record structure

use super::log_context::{FieldValue, LogContext};
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error as StdError;
use std::path::Path;

/// One link of an error chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorFrame {
    pub kind: String,
    pub message: String,
}

/// Captured error information attached to a record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Traceback {
    /// Rendered as a single escaped string
    Text(String),
    /// Rendered as a list of frames, outermost first
    Structured(Vec<ErrorFrame>),
}

impl Traceback {
    /// Walk `source()` and capture the whole chain
    pub fn from_error(err: &(dyn StdError + 'static), as_text: bool) -> Self {
        let mut frames = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = current {
            frames.push(ErrorFrame {
                kind: error_kind(e),
                message: e.to_string(),
            });
            current = e.source();
        }
        if as_text {
            Traceback::Text(Self::frames_to_text(&frames))
        } else {
            Traceback::Structured(frames)
        }
    }

    pub fn from_text(text: impl AsRef<str>) -> Self {
        Traceback::Text(sanitize(text.as_ref()))
    }

    fn frames_to_text(frames: &[ErrorFrame]) -> String {
        let text = frames
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                if idx == 0 {
                    format!("{}: {}", f.kind, f.message)
                } else {
                    format!("Caused by: {}: {}", f.kind, f.message)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        sanitize(&text)
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            Traceback::Text(text) => serde_json::Value::String(text.clone()),
            Traceback::Structured(frames) => serde_json::to_value(frames)
                .unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Traceback::Text(text) => text.clone(),
            Traceback::Structured(frames) => Self::frames_to_text(frames),
        }
    }
}

fn error_kind(err: &(dyn StdError + 'static)) -> String {
    if err.is::<std::io::Error>() {
        return "std::io::Error".to_string();
    }
    let debug = format!("{:?}", err);
    let end = debug
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(debug.len());
    if end == 0 {
        "Error".to_string()
    } else {
        debug[..end].to_string()
    }
}

/// Escape control characters that would break one-record-per-line output
pub(crate) fn sanitize(message: &str) -> String {
    if !message.contains(['\n', '\r', '\t']) {
        return message.to_string();
    }
    message
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

pub(crate) fn sanitize_context(ctx: &mut LogContext) {
    for (_, value) in ctx.values_mut() {
        sanitize_value(value);
    }
}

fn sanitize_value(value: &mut FieldValue) {
    match value {
        FieldValue::String(s) => {
            if s.contains(['\n', '\r', '\t']) {
                *s = sanitize(s);
            }
        }
        FieldValue::Map(ctx) => sanitize_context(ctx),
        FieldValue::List(items) => items.iter_mut().for_each(sanitize_value),
        _ => {}
    }
}

/// Where a log call was made, attached to the record under `source`
///
/// Built by [`call_site!`](crate::call_site) in the logging macros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub module: String,
    pub filename: String,
    pub func_name: Option<String>,
    pub lineno: u32,
}

impl Source {
    pub fn new(module: &str, file: &str, line: u32) -> Self {
        let filename = Path::new(file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(file);
        Self {
            module: module.to_string(),
            filename: filename.to_string(),
            func_name: None,
            lineno: line,
        }
    }

    /// Take the function name from the type name of an item nested in it,
    /// skipping closure and async block frames
    #[must_use]
    pub fn with_function_path(mut self, path: &str) -> Self {
        let mut path = path.rsplit_once("::").map_or(path, |(parent, _)| parent);
        while let Some(parent) = path.strip_suffix("::{{closure}}") {
            path = parent;
        }
        self.func_name = path.rsplit("::").next().map(str::to_string);
        self
    }

    pub fn to_context(&self) -> LogContext {
        LogContext::new()
            .with_field("module", self.module.as_str())
            .with_field("filename", self.filename.as_str())
            .with_field("func_name", self.func_name.clone())
            .with_field("lineno", self.lineno)
    }
}

/// Immutable structured record produced by every log call
///
/// Sinks receive records behind an `Arc` and only ever read them.
#[derive(Debug, Clone)]
pub struct LogRecord {
    logger_name: String,
    level: LogLevel,
    timestamp: DateTime<Utc>,
    message: String,
    context: LogContext,
    traceback: Option<Traceback>,
    attributes: LogContext,
}

impl LogRecord {
    pub fn new(logger_name: impl Into<String>, level: LogLevel, message: impl AsRef<str>) -> Self {
        Self {
            logger_name: logger_name.into(),
            level,
            timestamp: Utc::now(),
            message: sanitize(message.as_ref()),
            context: LogContext::new(),
            traceback: None,
            attributes: LogContext::new(),
        }
    }

    pub fn with_context(mut self, mut context: LogContext) -> Self {
        sanitize_context(&mut context);
        self.context = context;
        self
    }

    pub fn with_traceback(mut self, traceback: Traceback) -> Self {
        self.traceback = Some(traceback);
        self
    }

    /// Attach values that are not rendered but can be looked up by sinks
    pub fn with_attributes(mut self, mut attributes: LogContext) -> Self {
        sanitize_context(&mut attributes);
        self.attributes = attributes;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn traceback(&self) -> Option<&Traceback> {
        self.traceback.as_ref()
    }

    pub fn attributes(&self) -> &LogContext {
        &self.attributes
    }

    pub(crate) fn context_mut(&mut self) -> &mut LogContext {
        &mut self.context
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut LogContext {
        &mut self.attributes
    }

    pub(crate) fn message_mut(&mut self) -> &mut String {
        &mut self.message
    }
}
