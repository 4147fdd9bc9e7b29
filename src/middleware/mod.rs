//! axum middleware for per-request logging
//!
//! [`install`] registers them in the required order, outermost first:
//! request scope, correlation id, access log, panic catcher.

pub mod access_log;
pub mod correlation;
pub mod errors;
pub mod scope;

pub use access_log::{access_log, AccessLogLayer, AccessSession, ACCESS_LOGGER};
pub use correlation::{correlation_id, RequestId, REQUEST_ID_HEADER};
pub use errors::{PanicLogger, ERROR_LOGGER};
pub use scope::request_scope;

use axum::Router;

/// Wrap every route of `router` with the logging middleware
///
/// Handler panics are logged on `api.error` and answered with a 500, which
/// the access log then records.
///
/// ```
/// use axum::{routing::get, Router};
/// use axum_structlog::middleware::{self, AccessLogLayer};
/// use axum_structlog::Logger;
///
/// let logger = Logger::disabled();
/// let app: Router = middleware::install(
///     Router::new().route("/", get(|| async { "ok" })),
///     AccessLogLayer::new(&logger),
/// );
/// ```
pub fn install<S>(router: Router<S>, access: AccessLogLayer) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let panics = PanicLogger::new(access.logger());
    // layers added last run first
    router
        .layer(panics.layer())
        .layer(axum::middleware::from_fn_with_state(access, access_log))
        .layer(axum::middleware::from_fn(correlation_id))
        .layer(axum::middleware::from_fn(request_scope))
}
