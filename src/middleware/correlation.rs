//! Correlation id propagation through `x-request-id`

use super::scope;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::{HeaderName, HeaderValue};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Longest inbound id that is reused as-is
const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id of the current request, stored as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn inbound_id(request: &Request) -> Option<String> {
    let value = request.headers().get(&REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > MAX_REQUEST_ID_LEN {
        return None;
    }
    Some(value.to_string())
}

/// Reuse the inbound `x-request-id` or generate one, bind it as
/// `request_id` and echo it on the response
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = inbound_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());
    scope::bind("request_id", id.as_str());
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
