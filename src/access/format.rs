//! Access-log template parsing and rendering

use super::fields::AccessAtoms;
use crate::core::log_record::sanitize;
use crate::core::{LogError, Result};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FORMAT: &str = r#"%(client_addr)s - "%(request_line)s" %(status_code)s %(L)ss - "%(a)s""#;

const KNOWN_TOKENS: &[&str] = &[
    "h",
    "client_addr",
    "l",
    "u",
    "t",
    "r",
    "R",
    "request_line",
    "m",
    "U",
    "q",
    "H",
    "s",
    "st",
    "status_code",
    "B",
    "b",
    "f",
    "a",
    "T",
    "M",
    "D",
    "L",
    "p",
    "session",
    "full_path",
];

/// `{header}i` for a request header, `{header}o` for a response header
fn is_header_token(token: &str) -> bool {
    token.len() > 3
        && token.starts_with('{')
        && (token.ends_with("}i") || token.ends_with("}o"))
        && !token[1..token.len() - 2].is_empty()
}

pub fn is_known_token(token: &str) -> bool {
    KNOWN_TOKENS.contains(&token) || is_header_token(token)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(String),
}

/// Parsed access-log template
///
/// Every token is checked when the template is parsed, so rendering never
/// meets an unknown name.
///
/// ```
/// use axum_structlog::access::{AccessFields, AccessLogFormat};
///
/// let format = AccessLogFormat::parse("%(m)s %(U)s -> %(s)s").unwrap();
/// let atoms = AccessFields::new("GET", "/health").with_status(204).atoms();
/// assert_eq!(format.render(&atoms), "GET /health -> 204");
///
/// assert!(AccessLogFormat::parse("%(zzz)s").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogFormat {
    template: String,
    segments: Vec<Segment>,
}

impl AccessLogFormat {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(pos) = rest.find('%') {
            literal.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];

            if let Some(after) = rest.strip_prefix('%') {
                literal.push('%');
                rest = after;
                continue;
            }

            let Some(body) = rest.strip_prefix('(') else {
                return Err(LogError::config(
                    "access_log",
                    format!("expected '%(name)s' or '%%' in format '{}'", template),
                ));
            };
            let Some(close) = body.find(')') else {
                return Err(LogError::config(
                    "access_log",
                    format!("unterminated token in format '{}'", template),
                ));
            };
            let token = &body[..close];
            let Some(after) = body[close + 1..].strip_prefix('s') else {
                return Err(LogError::config(
                    "access_log",
                    format!("token '{}' must use the 's' conversion in format '{}'", token, template),
                ));
            };
            if !is_known_token(token) {
                return Err(LogError::unknown_token(token, template));
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Token(token.to_string()));
            rest = after;
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Token(t) => Some(t.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render one line; control characters are escaped
    pub fn render(&self, atoms: &AccessAtoms) -> String {
        let mut line = String::with_capacity(self.template.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => line.push_str(text),
                Segment::Token(token) => line.push_str(&atoms.render_value(token)),
            }
        }
        sanitize(&line)
    }
}

impl Default for AccessLogFormat {
    fn default() -> Self {
        Self {
            template: DEFAULT_FORMAT.to_string(),
            segments: vec![
                Segment::Token("client_addr".into()),
                Segment::Literal(" - \"".into()),
                Segment::Token("request_line".into()),
                Segment::Literal("\" ".into()),
                Segment::Token("status_code".into()),
                Segment::Literal(" ".into()),
                Segment::Token("L".into()),
                Segment::Literal("s - \"".into()),
                Segment::Token("a".into()),
                Segment::Literal("\"".into()),
            ],
        }
    }
}

impl FromStr for AccessLogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for AccessLogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessFields;
    use chrono::DateTime;
    use std::time::Duration;

    fn fixture() -> AccessFields {
        AccessFields::new("GET", "/items")
            .with_client("10.1.2.3:4000".parse().unwrap())
            .with_query("page=1")
            .with_status(200)
            .with_request_header("user-agent", "pytest/1.0")
            .with_elapsed(Duration::from_nanos(1_234_567_000))
            .with_timestamp(DateTime::parse_from_rfc3339("2024-03-05T14:07:09+02:00").unwrap())
    }

    #[test]
    fn test_default_matches_parsed_default() {
        assert_eq!(AccessLogFormat::default(), AccessLogFormat::parse(DEFAULT_FORMAT).unwrap());
    }

    #[test]
    fn test_default_format_render() {
        let line = AccessLogFormat::default().render(&fixture().atoms());
        assert_eq!(
            line,
            r#"10.1.2.3:4000 - "GET /items?page=1 HTTP/1.1" 200 OK 1.234567s - "pytest/1.0""#
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let format = AccessLogFormat::default();
        let atoms = fixture().atoms();
        assert_eq!(format.render(&atoms), format.render(&atoms));
    }

    #[test]
    fn test_percent_literal_and_time() {
        let format = AccessLogFormat::parse("100%% %(t)s").unwrap();
        assert_eq!(format.render(&fixture().atoms()), "100% [05/Mar/2024:14:07:09 +0200]");
    }

    #[test]
    fn test_header_tokens() {
        let format = AccessLogFormat::parse("%({User-Agent}i)s|%({x-missing}o)s").unwrap();
        assert_eq!(format.render(&fixture().atoms()), "pytest/1.0|-");
    }

    #[test]
    fn test_unknown_token_fails_at_parse() {
        let err = AccessLogFormat::parse("%(h)s %(zzz)s").unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, LogError::UnknownToken { ref token, .. } if token == "zzz"));
    }

    #[test]
    fn test_malformed_templates() {
        assert!(AccessLogFormat::parse("%(h").is_err());
        assert!(AccessLogFormat::parse("%(h)d").is_err());
        assert!(AccessLogFormat::parse("50% done").is_err());
        assert!(AccessLogFormat::parse("%({}i)s").is_err());
    }

    #[test]
    fn test_newlines_are_escaped() {
        let fields = fixture().with_request_header("user-agent", "evil\nagent");
        let line = AccessLogFormat::parse("%(a)s").unwrap().render(&fields.atoms());
        assert!(!line.contains('\n'));
    }
}
