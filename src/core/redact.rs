//! Irreversible masking of sensitive values

use super::log_context::{FieldValue, LogContext};
use regex_lite::Regex;

/// Marker written in place of a sensitive value
pub const REDACTED: &str = "***";

const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "authorization",
    "api_key",
];

const QUERY_PASSWORD_PATTERN: &str = r"(?P<param>password=)(?P<val>.*?)(?P<end>(?:\s|&|$))";

/// Masks sensitive keys and `password=` query fragments
#[derive(Debug, Clone)]
pub struct Redactor {
    sensitive_keys: Vec<String>,
    query_password: Option<Regex>,
}

impl Redactor {
    /// Build a redactor; `hide_query_params` is normally `!debug`
    pub fn new(hide_query_params: bool) -> Self {
        let query_password = if hide_query_params {
            Regex::new(QUERY_PASSWORD_PATTERN).ok()
        } else {
            None
        };
        Self {
            sensitive_keys: DEFAULT_SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect(),
            query_password,
        }
    }

    #[must_use]
    pub fn with_sensitive_key(mut self, key: impl Into<String>) -> Self {
        self.sensitive_keys.push(normalize(&key.into()));
        self
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = normalize(key);
        self.sensitive_keys.iter().any(|s| key.contains(s.as_str()))
    }

    pub fn redact_context(&self, ctx: &mut LogContext) {
        for (key, value) in ctx.values_mut() {
            if self.is_sensitive(key) && !value.is_null() {
                *value = FieldValue::String(REDACTED.to_string());
            } else {
                self.redact_value(value);
            }
        }
    }

    fn redact_value(&self, value: &mut FieldValue) {
        match value {
            FieldValue::String(s) => {
                if let Some(hidden) = self.hide_query_password(s) {
                    *s = hidden;
                }
            }
            FieldValue::Map(ctx) => self.redact_context(ctx),
            FieldValue::List(items) => items.iter_mut().for_each(|v| self.redact_value(v)),
            _ => {}
        }
    }

    /// Replace `password=<value>` with `password=*****`, if anything matched
    pub fn hide_query_password(&self, text: &str) -> Option<String> {
        let regex = self.query_password.as_ref()?;
        if !regex.is_match(text) {
            return None;
        }
        Some(regex.replace_all(text, "${param}*****${end}").into_owned())
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(true)
    }
}

fn normalize(key: &str) -> String {
    key.to_ascii_lowercase().replace('-', "_")
}
