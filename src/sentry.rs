//! Sentry client options derived from settings
//!
//! Only the option set is built here; initialising the SDK is left to the
//! application, which passes these values to its client of choice.

use crate::config::settings::{parse_bool, parse_number, parse_with};
use crate::core::error::Result;
use crate::core::log_level::LogLevel;
use crate::core::logger;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Status codes reported as failed requests when none are given
pub const DEFAULT_FAILED_STATUS_CODES: RangeInclusive<u16> = 500..=599;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Prod,
    Preview,
    Test,
    Dev,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Preview => "preview",
            Environment::Test => "test",
            Environment::Dev => "dev",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prod" => Ok(Environment::Prod),
            "preview" => Ok(Environment::Preview),
            "test" => Ok(Environment::Test),
            "dev" => Ok(Environment::Dev),
            other => Err(format!(
                "Invalid environment '{}', expected one of prod, preview, test, dev",
                other
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentrySettings {
    pub dsn: Option<String>,
    pub environment: Option<Environment>,
    /// Uniform transaction sample rate in `0.0..=1.0`
    pub traces_sample_rate: f64,
    pub log_integration: bool,
    /// Lowest level sent as an event
    pub log_integration_event_level: Option<LogLevel>,
    /// Lowest level kept as a breadcrumb
    pub log_integration_level: Option<LogLevel>,
    pub sql_integration: bool,
}

impl Default for SentrySettings {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            traces_sample_rate: 1.0,
            log_integration: true,
            log_integration_event_level: None,
            log_integration_level: None,
            sql_integration: true,
        }
    }
}

impl SentrySettings {
    /// Load from unprefixed keys (`DSN`, `ENVIRONMENT`, ...)
    pub fn from_env() -> Result<Self> {
        Self::from_vars("", std::env::vars())
    }

    /// Same key rules as [`LogSettings::from_vars`](crate::config::LogSettings::from_vars)
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = prefix.to_ascii_uppercase();
        let mut settings = Self::default();
        for (key, value) in vars {
            let key = key.as_ref().to_ascii_uppercase();
            let Some(name) = key.strip_prefix(&prefix) else {
                continue;
            };
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match name {
                "DSN" => settings.dsn = Some(value.to_string()),
                "ENVIRONMENT" => {
                    settings.environment = Some(parse_with(name, value, Environment::from_str)?)
                }
                "TRACES_SAMPLE_RATE" => settings.traces_sample_rate = parse_number(name, value)?,
                "LOG_INTEGRATION" => settings.log_integration = parse_bool(name, value)?,
                "LOG_INTEGRATION_EVENT_LEVEL" => {
                    settings.log_integration_event_level =
                        Some(parse_with(name, value, LogLevel::from_str)?)
                }
                "LOG_INTEGRATION_LEVEL" => {
                    settings.log_integration_level = Some(parse_with(name, value, LogLevel::from_str)?)
                }
                "SQL_INTEGRATION" => settings.sql_integration = parse_bool(name, value)?,
                _ => {}
            }
        }
        Ok(settings)
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Some(Environment::Prod)
    }
}

/// Integration enabled on the client
#[derive(Debug, Clone, PartialEq)]
pub enum Integration {
    /// Request tracing with transactions named after the matched route
    Axum {
        transaction_style: &'static str,
        failed_status_codes: Vec<RangeInclusive<u16>>,
    },
    Logging {
        event_level: Option<LogLevel>,
        level: Option<LogLevel>,
    },
    Sqlx,
    /// Application-specific integration, by name
    Service(String),
}

impl Integration {
    pub fn name(&self) -> &str {
        match self {
            Integration::Axum { .. } => "axum",
            Integration::Logging { .. } => "logging",
            Integration::Sqlx => "sqlx",
            Integration::Service(name) => name,
        }
    }
}

/// Everything needed to initialise a Sentry client
#[derive(Debug, Clone, PartialEq)]
pub struct SentryOptions {
    pub dsn: String,
    pub release: String,
    pub environment: Option<Environment>,
    pub traces_sample_rate: f64,
    pub integrations: Vec<Integration>,
}

impl SentryOptions {
    /// Build options, or `None` with a warning when no DSN is configured
    ///
    /// `release` defaults to `app_slug@version`; `failed_status_codes`
    /// defaults to [`DEFAULT_FAILED_STATUS_CODES`].
    pub fn build(
        settings: &SentrySettings,
        release: Option<&str>,
        app_slug: Option<&str>,
        version: Option<&str>,
        failed_status_codes: Option<Vec<RangeInclusive<u16>>>,
    ) -> Option<Self> {
        let Some(dsn) = settings.dsn.as_deref().filter(|d| !d.trim().is_empty()) else {
            logger::global()
                .child("init_sentry")
                .warning("Sentry is not configured! Missing DSN!");
            return None;
        };

        let release = match release {
            Some(release) => release.to_string(),
            None => format!(
                "{}@{}",
                app_slug.unwrap_or("unknown"),
                version.unwrap_or("unknown")
            ),
        };

        let mut integrations = vec![Integration::Axum {
            transaction_style: "url",
            failed_status_codes: failed_status_codes
                .unwrap_or_else(|| vec![DEFAULT_FAILED_STATUS_CODES]),
        }];
        if settings.log_integration {
            integrations.push(Integration::Logging {
                event_level: settings.log_integration_event_level,
                level: settings.log_integration_level,
            });
        }
        if settings.sql_integration {
            integrations.push(Integration::Sqlx);
        }

        Some(Self {
            dsn: dsn.to_string(),
            release,
            environment: settings.environment,
            traces_sample_rate: settings.traces_sample_rate,
            integrations,
        })
    }

    #[must_use]
    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integrations.push(integration);
        self
    }

    /// Whether a response with `status` counts as a failed request
    pub fn is_failed_status(&self, status: u16) -> bool {
        self.integrations.iter().any(|integration| match integration {
            Integration::Axum {
                failed_status_codes,
                ..
            } => failed_status_codes.iter().any(|range| range.contains(&status)),
            _ => false,
        })
    }
}
