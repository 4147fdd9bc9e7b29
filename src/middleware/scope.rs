//! Per-request logging context
//!
//! Fields bound here are merged into every record emitted from the same
//! task while the scope is active. Outside a scope, binding is a no-op.

use crate::core::{FieldValue, LogContext};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static REQUEST_CONTEXT: RefCell<LogContext>;
}

/// Run `fut` inside a fresh, empty request scope
pub async fn with_scope<F: Future>(fut: F) -> F::Output {
    REQUEST_CONTEXT.scope(RefCell::new(LogContext::new()), fut).await
}

/// Snapshot of the current scope, if any
pub fn current() -> Option<LogContext> {
    REQUEST_CONTEXT.try_with(|ctx| ctx.borrow().clone()).ok()
}

/// Bind a field in the current scope; returns `false` outside a scope
pub fn bind<K, V>(key: K, value: V) -> bool
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.borrow_mut().add_field(key, value))
        .is_ok()
}

pub fn unbind(key: &str) {
    let _ = REQUEST_CONTEXT.try_with(|ctx| ctx.borrow_mut().remove(key));
}

/// Outermost middleware: every request starts with an empty context
pub async fn request_scope(request: Request, next: Next) -> Response {
    with_scope(next.run(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_inside_scope() {
        let ctx = with_scope(async {
            assert!(bind("user", "bob"));
            bind("attempt", 2);
            unbind("attempt");
            current()
        })
        .await
        .unwrap();

        assert_eq!(ctx.get("user").and_then(FieldValue::as_str), Some("bob"));
        assert!(!ctx.contains_key("attempt"));
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        with_scope(async { bind("leak", true) }).await;
        let fresh = with_scope(async { current() }).await.unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_no_scope_is_noop() {
        assert!(!bind("k", "v"));
        assert!(current().is_none());
    }
}
