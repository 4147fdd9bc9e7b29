//! Rendering of log records into single output lines
//!
//! Provides three renderers:
//! - Json: one JSON object per line, fields in insertion order
//! - Console: human-readable `key=value` output, optionally colored
//! - Logfmt: key-value format compatible with log aggregation tools

use super::log_context::{FieldValue, LogContext};
use super::log_record::LogRecord;
use super::timestamp::TimestampFormat;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Default key under which the record message is emitted
pub const DEFAULT_EVENT_KEY: &str = "message";

const EXCEPTION_KEY: &str = "exception";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// Example: `{"timestamp":"2025-01-08T10:30:45.123Z","level":"INFO","logger":"api","message":"ok"}`
    Json,
    /// Example: `2025-01-08T10:30:45.123Z [INFO    ] ok                            [api] user=bob`
    Console { colors: bool },
    /// Example: `timestamp=2025-01-08T10:30:45.123Z level=INFO logger=api message="ok"`
    Logfmt,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    mode: RenderMode,
    event_key: String,
    timestamp_format: TimestampFormat,
}

impl Renderer {
    pub fn json() -> Self {
        Self::new(RenderMode::Json)
    }

    pub fn console(colors: bool) -> Self {
        Self::new(RenderMode::Console { colors })
    }

    pub fn logfmt() -> Self {
        Self::new(RenderMode::Logfmt)
    }

    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            event_key: DEFAULT_EVENT_KEY.to_string(),
            timestamp_format: TimestampFormat::default(),
        }
    }

    /// Emit the message under a different key
    #[must_use]
    pub fn with_event_key(mut self, key: impl Into<String>) -> Self {
        self.event_key = key.into();
        self
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn mode(&self) -> &RenderMode {
        &self.mode
    }

    pub fn event_key(&self) -> &str {
        &self.event_key
    }

    /// Render a record as one line without a trailing newline
    pub fn render(&self, record: &LogRecord) -> String {
        match self.mode {
            RenderMode::Json => self.render_json(record),
            RenderMode::Console { colors } => self.render_console(record, colors),
            RenderMode::Logfmt => self.render_logfmt(record),
        }
    }

    fn render_json(&self, record: &LogRecord) -> String {
        let line = JsonLine {
            record,
            event_key: &self.event_key,
            timestamp: self.timestamp_format.format(record.timestamp()),
        };
        serde_json::to_string(&line).unwrap_or_default()
    }

    fn render_console(&self, record: &LogRecord, colors: bool) -> String {
        let timestamp_str = self.timestamp_format.format(record.timestamp());
        let level_str = format!("{:<8}", record.level().to_str());
        let level_str = colorize_level(level_str, record, colors);

        let mut line = format!(
            "{} [{}] {:<30} [{}]",
            timestamp_str,
            level_str,
            record.message(),
            record.logger_name()
        );
        if !record.context().is_empty() {
            line.push(' ');
            line.push_str(&record.context().format_fields());
        }
        if let Some(tb) = record.traceback() {
            line.push_str(&format!(" {}={}", EXCEPTION_KEY, tb.as_text()));
        }
        line
    }

    fn render_logfmt(&self, record: &LogRecord) -> String {
        let mut parts = vec![
            format!(
                "timestamp={}",
                escape_logfmt_value(&self.timestamp_format.format(record.timestamp()))
            ),
            format!("level={}", record.level().to_str()),
            format!("logger={}", escape_logfmt_value(record.logger_name())),
            format!(
                "{}={}",
                escape_logfmt_key(&self.event_key),
                quote_logfmt_value(record.message())
            ),
        ];

        for (key, value) in record.context().iter() {
            let formatted_value = match value {
                FieldValue::String(s) => quote_logfmt_value(s),
                FieldValue::Map(_) | FieldValue::List(_) => quote_logfmt_value(&value.to_string()),
                other => other.to_string(),
            };
            parts.push(format!("{}={}", escape_logfmt_key(key), formatted_value));
        }

        if let Some(tb) = record.traceback() {
            parts.push(format!("{}={}", EXCEPTION_KEY, quote_logfmt_value(&tb.as_text())));
        }

        parts.join(" ")
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::json()
    }
}

#[cfg(feature = "console")]
fn colorize_level(level_str: String, record: &LogRecord, colors: bool) -> String {
    use colored::Colorize;
    if colors {
        level_str.color(record.level().color_code()).to_string()
    } else {
        level_str
    }
}

#[cfg(not(feature = "console"))]
fn colorize_level(level_str: String, _record: &LogRecord, _colors: bool) -> String {
    level_str
}

struct JsonLine<'a> {
    record: &'a LogRecord,
    event_key: &'a str,
    timestamp: String,
}

impl JsonLine<'_> {
    fn is_reserved(&self, key: &str) -> bool {
        matches!(key, "timestamp" | "level" | "logger" | EXCEPTION_KEY) || key == self.event_key
    }
}

impl Serialize for JsonLine<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let context: &LogContext = self.record.context();
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("level", self.record.level().to_str())?;
        map.serialize_entry("logger", self.record.logger_name())?;
        map.serialize_entry(self.event_key, self.record.message())?;
        for (key, value) in context.iter() {
            if !self.is_reserved(key) {
                map.serialize_entry(key, value)?;
            }
        }
        if let Some(tb) = self.record.traceback() {
            map.serialize_entry(EXCEPTION_KEY, tb)?;
        }
        map.end()
    }
}

/// Escape a logfmt key (remove spaces and special chars)
fn escape_logfmt_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .collect()
}

/// Escape a logfmt value (quote if contains spaces)
fn escape_logfmt_value(value: &str) -> String {
    if value.contains(' ') || value.contains('"') || value.contains('=') {
        quote_logfmt_value(value)
    } else {
        value.to_string()
    }
}

fn quote_logfmt_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
