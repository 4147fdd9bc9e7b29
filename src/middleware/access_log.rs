//! One access-log line per request

use super::scope;
use crate::access::{AccessFields, AccessLogFormat};
use crate::core::{FieldValue, LogContext, LogLevel, Logger, Result};
use axum::extract::connect_info::MockConnectInfo;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::{HeaderMap, Method, Version};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Name of the logger access lines are emitted on
pub const ACCESS_LOGGER: &str = "api.access";

/// Session data attached to a request by the application
///
/// When present as a request extension it is bound as `session` and
/// rendered by the `%(session)s` token.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSession(pub FieldValue);

/// State for the [`access_log`] middleware
#[derive(Clone)]
pub struct AccessLogLayer {
    logger: Logger,
    format: Arc<AccessLogFormat>,
    methods: Option<Arc<HashSet<Method>>>,
    bind_session: bool,
}

impl AccessLogLayer {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.child(ACCESS_LOGGER),
            format: Arc::new(AccessLogFormat::default()),
            methods: None,
            bind_session: true,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: AccessLogFormat) -> Self {
        self.format = Arc::new(format);
        self
    }

    /// Parse and install a template; unknown tokens fail here
    pub fn with_template(self, template: &str) -> Result<Self> {
        Ok(self.with_format(AccessLogFormat::parse(template)?))
    }

    /// Only log these methods; an empty set logs everything
    #[must_use]
    pub fn with_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        let methods: HashSet<Method> = methods.into_iter().collect();
        self.methods = (!methods.is_empty()).then(|| Arc::new(methods));
        self
    }

    #[must_use]
    pub fn with_session(mut self, enabled: bool) -> Self {
        self.bind_session = enabled;
        self
    }

    /// Handle emitting on `api.access`
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn format(&self) -> &AccessLogFormat {
        &self.format
    }

    fn should_log(&self, method: &Method) -> bool {
        self.methods.as_ref().map_or(true, |m| m.contains(method))
    }
}

impl std::fmt::Debug for AccessLogLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLogLayer")
            .field("format", &self.format.template())
            .field("methods", &self.methods)
            .field("bind_session", &self.bind_session)
            .finish()
    }
}

fn version_number(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    let extensions = request.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0)
        .or_else(|| extensions.get::<MockConnectInfo<SocketAddr>>().map(|mock| mock.0))
}

pub async fn access_log(State(layer): State<AccessLogLayer>, request: Request, next: Next) -> Response {
    if !layer.should_log(request.method()) {
        return next.run(request).await;
    }

    let uri = request.uri();
    let mut fields = AccessFields::new(request.method().as_str(), uri.path())
        .with_query(uri.query().unwrap_or_default())
        .with_http_version(version_number(request.version()));
    fields.request_headers = header_pairs(request.headers());
    if let Some(addr) = peer_addr(&request) {
        fields = fields.with_client(addr);
    }

    let request_info = LogContext::new()
        .with_field("method", fields.method.as_str())
        .with_field("path", fields.full_path())
        .with_field("client_addr", fields.client_addr());
    scope::bind("request", request_info.clone());
    let mut call_site = LogContext::new().with_field("request", request_info);

    if layer.bind_session {
        if let Some(AccessSession(session)) = request.extensions().get::<AccessSession>() {
            scope::bind("session", session.clone());
            call_site.add_field("session", session.clone());
            fields = fields.with_session(session.clone());
        }
    }

    let started = Instant::now();
    let response = next.run(request).await;
    fields.elapsed = started.elapsed();
    fields.status = response.status().as_u16();
    fields.response_headers = header_pairs(response.headers());

    let response_info = LogContext::new().with_field("status_code", fields.status);
    scope::bind("response", response_info.clone());
    call_site.add_field("response", response_info);

    let atoms = fields.atoms();
    let line = layer.format.render(&atoms);
    layer
        .logger
        .emit(LogLevel::Info, &line, call_site, atoms.into_context(), None, None);

    response
}
