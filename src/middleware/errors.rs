//! Panics escaping a handler, logged on `api.error`

use crate::core::dispatcher::panic_message;
use crate::core::{LogContext, LogLevel, Logger, Traceback};
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use std::any::Any;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};

/// Name of the logger handler panics are reported on
pub const ERROR_LOGGER: &str = "api.error";

/// Turns a caught handler panic into an ERROR record and a bare 500
///
/// The record is emitted while the request scope is still active, so it
/// carries `request_id` and the `request` map bound by the outer layers.
#[derive(Debug, Clone)]
pub struct PanicLogger {
    logger: Logger,
}

impl PanicLogger {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.child(ERROR_LOGGER),
        }
    }

    pub fn layer(self) -> CatchPanicLayer<Self> {
        CatchPanicLayer::custom(self)
    }
}

impl ResponseForPanic for PanicLogger {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Self::ResponseBody> {
        let message = panic_message(err.as_ref());
        self.logger.emit(
            LogLevel::Error,
            &message,
            LogContext::new(),
            LogContext::new(),
            Some(Traceback::from_text(&message)),
            None,
        );
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}
