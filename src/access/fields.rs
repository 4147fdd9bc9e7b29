//! Request/response metadata and the token values derived from it

use crate::core::{FieldValue, LogContext};
use chrono::{DateTime, FixedOffset, Local};
use http::StatusCode;
use std::net::SocketAddr;
use std::time::Duration;

/// Placeholder for any value that is not available
pub const MISSING: &str = "-";

const SIZE_SUFFIXES: [&str; 9] = ["bytes", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// Human readable byte count, e.g. `1.00 KiB`
///
/// ```
/// use axum_structlog::access::human_size;
///
/// assert_eq!(human_size(0), "0.00 bytes");
/// assert_eq!(human_size(1536), "1.50 KiB");
/// ```
pub fn human_size(size: u64) -> String {
    let order = if size == 0 {
        0
    } else {
        (63 - size.leading_zeros() as usize) / 10
    };
    let scaled = size as f64 / (1u128 << (order * 10)) as f64;
    format!("{:.2} {}", scaled, SIZE_SUFFIXES[order])
}

/// Reason phrase for a status code, `-` when unknown
pub fn status_phrase(status: u16) -> &'static str {
    if status == 499 {
        return "Client Closed Request";
    }
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or(MISSING)
}

/// Everything known about one request/response cycle
///
/// Built by the access-log middleware, or by hand in tests:
///
/// ```
/// use axum_structlog::access::AccessFields;
/// use std::time::Duration;
///
/// let fields = AccessFields::new("GET", "/items")
///     .with_query("page=2")
///     .with_status(200)
///     .with_elapsed(Duration::from_millis(15));
/// let atoms = fields.atoms();
/// assert_eq!(atoms.render_value("request_line"), "GET /items?page=2 HTTP/1.1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AccessFields {
    pub client: Option<SocketAddr>,
    pub method: String,
    pub root_path: String,
    pub path: String,
    pub query: String,
    pub http_version: String,
    /// 0 when no response was produced
    pub status: u16,
    pub request_headers: Vec<(String, String)>,
    pub response_headers: Vec<(String, String)>,
    pub elapsed: Duration,
    pub timestamp: DateTime<FixedOffset>,
    pub pid: u32,
    pub session: Option<FieldValue>,
}

impl AccessFields {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            client: None,
            method: method.into(),
            root_path: String::new(),
            path: path.into(),
            query: String::new(),
            http_version: "1.1".to_string(),
            status: 0,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            elapsed: Duration::ZERO,
            timestamp: Local::now().fixed_offset(),
            pid: std::process::id(),
            session: None,
        }
    }

    #[must_use]
    pub fn with_client(mut self, addr: SocketAddr) -> Self {
        self.client = Some(addr);
        self
    }

    #[must_use]
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Version without the `HTTP/` prefix, e.g. `2`
    #[must_use]
    pub fn with_http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = version.into();
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: impl Into<FieldValue>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// `ip:port`, or an empty string when the peer is unknown
    pub fn client_addr(&self) -> String {
        self.client.map(|addr| addr.to_string()).unwrap_or_default()
    }

    /// Path with the query string appended when there is one
    pub fn full_path(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// Resolve every token
    pub fn atoms(&self) -> AccessAtoms {
        let mut atoms = LogContext::new();

        for (name, value) in &self.request_headers {
            atoms.add_field(format!("{{{}}}i", name.to_ascii_lowercase()), value.as_str());
        }
        for (name, value) in &self.response_headers {
            let name = name.to_ascii_lowercase();
            let value = if name == "content-length" {
                value
                    .trim()
                    .parse::<u64>()
                    .map_or_else(|_| value.clone(), human_size)
            } else {
                value.clone()
            };
            atoms.add_field(format!("{{{}}}o", name), value);
        }

        let protocol = format!("HTTP/{}", self.http_version);
        let phrase = status_phrase(self.status);
        let client_addr = self.client_addr();
        let request_line = format!("{} {}{} {}", self.method, self.root_path, self.path, protocol);
        let full_request_line = format!("{} {} {}", self.method, self.full_path(), protocol);
        let content_length = atoms.get("{content-length}o").cloned();
        let referer = atoms.get("{referer}i").cloned();
        let user_agent = atoms.get("{user-agent}i").cloned();
        let secs = self.elapsed.as_secs_f64();

        atoms.add_field("h", client_addr.as_str());
        atoms.add_field("client_addr", client_addr);
        atoms.add_field("l", MISSING);
        atoms.add_field("u", MISSING);
        atoms.add_field("t", self.timestamp.format("[%d/%b/%Y:%H:%M:%S %z]").to_string());
        atoms.add_field("r", request_line);
        atoms.add_field("request_line", full_request_line.as_str());
        atoms.add_field("R", full_request_line);
        atoms.add_field("m", self.method.as_str());
        atoms.add_field("U", self.path.as_str());
        atoms.add_field("q", self.query.as_str());
        atoms.add_field("H", protocol);
        atoms.add_field("s", i64::from(self.status));
        atoms.add_field("status_code", format!("{} {}", self.status, phrase));
        atoms.add_field("st", phrase);
        atoms.add_field("B", content_length.clone());
        atoms.add_field("b", content_length);
        atoms.add_field("f", referer);
        atoms.add_field("a", user_agent);
        atoms.add_field("T", self.elapsed.as_secs() as i64);
        atoms.add_field("M", self.elapsed.as_millis() as i64);
        atoms.add_field("D", self.elapsed.as_micros() as i64);
        atoms.add_field("L", format!("{:.6}", secs));
        atoms.add_field("p", format!("<{}>", self.pid));
        atoms.add_field("full_path", self.full_path());
        atoms.add_field("session", self.session.clone());

        AccessAtoms(atoms)
    }
}

/// Token name to value, in resolution order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccessAtoms(LogContext);

impl AccessAtoms {
    pub fn get(&self, token: &str) -> Option<&FieldValue> {
        if token.starts_with('{') {
            self.0.get(&token.to_ascii_lowercase())
        } else {
            self.0.get(token)
        }
    }

    /// Display value of `token`; `-` when missing or null
    pub fn render_value(&self, token: &str) -> String {
        match self.get(token) {
            None | Some(FieldValue::Null) => MISSING.to_string(),
            Some(FieldValue::String(s)) if s.is_empty() => MISSING.to_string(),
            Some(value) => value.to_string(),
        }
    }

    pub fn as_context(&self) -> &LogContext {
        &self.0
    }

    pub fn into_context(self) -> LogContext {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> AccessFields {
        AccessFields::new("POST", "/api/items")
            .with_client("127.0.0.1:51000".parse().unwrap())
            .with_root_path("/v1")
            .with_query("limit=10")
            .with_status(201)
            .with_request_header("User-Agent", "curl/8.0")
            .with_request_header("Referer", "https://example.com")
            .with_response_header("Content-Length", "2048")
            .with_elapsed(Duration::from_nanos(1_234_567_000))
            .with_pid(4242)
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0.00 bytes");
        assert_eq!(human_size(512), "512.00 bytes");
        assert_eq!(human_size(1024), "1.00 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(human_size(u64::MAX), "16.00 EiB");
    }

    #[test]
    fn test_status_phrase() {
        assert_eq!(status_phrase(200), "OK");
        assert_eq!(status_phrase(404), "Not Found");
        assert_eq!(status_phrase(499), "Client Closed Request");
        assert_eq!(status_phrase(599), "-");
        assert_eq!(status_phrase(0), "-");
    }

    #[test]
    fn test_timing_tokens_share_one_sample() {
        let atoms = fixture().atoms();
        assert_eq!(atoms.render_value("T"), "1");
        assert_eq!(atoms.render_value("M"), "1234");
        assert_eq!(atoms.render_value("D"), "1234567");
        assert_eq!(atoms.render_value("L"), "1.234567");
    }

    #[test]
    fn test_request_tokens() {
        let atoms = fixture().atoms();
        assert_eq!(atoms.render_value("h"), "127.0.0.1:51000");
        assert_eq!(atoms.render_value("client_addr"), "127.0.0.1:51000");
        assert_eq!(atoms.render_value("r"), "POST /v1/api/items HTTP/1.1");
        assert_eq!(atoms.render_value("R"), "POST /api/items?limit=10 HTTP/1.1");
        assert_eq!(atoms.render_value("U"), "/api/items");
        assert_eq!(atoms.render_value("q"), "limit=10");
        assert_eq!(atoms.render_value("s"), "201");
        assert_eq!(atoms.render_value("status_code"), "201 Created");
        assert_eq!(atoms.render_value("a"), "curl/8.0");
        assert_eq!(atoms.render_value("f"), "https://example.com");
        assert_eq!(atoms.render_value("p"), "<4242>");
    }

    #[test]
    fn test_content_length_is_human_readable() {
        let atoms = fixture().atoms();
        assert_eq!(atoms.render_value("B"), "2.00 KiB");
        assert_eq!(atoms.render_value("b"), "2.00 KiB");
        assert_eq!(atoms.render_value("{Content-Length}o"), "2.00 KiB");
    }

    #[test]
    fn test_missing_values_render_dash() {
        let atoms = AccessFields::new("GET", "/").atoms();
        assert_eq!(atoms.render_value("a"), "-");
        assert_eq!(atoms.render_value("B"), "-");
        assert_eq!(atoms.render_value("h"), "-");
        assert_eq!(atoms.render_value("session"), "-");
        assert_eq!(atoms.render_value("{x-unknown}i"), "-");
    }
}
