//! Tower middleware that opens a request scope around each request.
//!
//! Per request: open a namespace (unless scoping is disabled), run the
//! registered interceptors against the request head, attach the scope handle
//! to the request extensions, and call the inner service. The response future
//! holds a handle, so the namespace lives until the request completes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use axum::Json;
use gaekit_core::ContextStore;
use http::{Request, StatusCode};
use serde_json::json;
use tower::{Layer, Service};
use tracing::error;

use super::interceptor::{InterceptError, InterceptorRegistry};

// ---------------------------------------------------------------------------
// RequestScopeLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with request scope creation.
#[derive(Debug, Clone)]
pub struct RequestScopeLayer {
    store: Arc<ContextStore>,
    interceptors: Arc<InterceptorRegistry>,
}

impl RequestScopeLayer {
    #[must_use]
    pub fn new(store: Arc<ContextStore>, interceptors: InterceptorRegistry) -> Self {
        Self {
            store,
            interceptors: Arc::new(interceptors),
        }
    }
}

impl<S> Layer<S> for RequestScopeLayer {
    type Service = RequestScopeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestScopeService {
            inner,
            store: Arc::clone(&self.store),
            interceptors: Arc::clone(&self.interceptors),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestScopeService
// ---------------------------------------------------------------------------

/// Service wrapper that runs each request inside its own namespace.
#[derive(Debug, Clone)]
pub struct RequestScopeService<S> {
    inner: S,
    store: Arc<ContextStore>,
    interceptors: Arc<InterceptorRegistry>,
}

impl<S, B> Service<Request<B>> for RequestScopeService<S>
where
    S: Service<Request<B>, Response = Response> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if !self.store.is_enabled() {
            return Box::pin(self.inner.call(req));
        }

        let scope = self.store.open_scope();
        let (mut parts, body) = req.into_parts();

        if let Err(err) = self.interceptors.run(&parts, &scope) {
            error!(
                scope_id = scope.id(),
                method = %parts.method,
                uri = %parts.uri,
                error = %err,
                "request scope interceptor failed"
            );
            return Box::pin(async move { Ok(err.into_response()) });
        }

        parts.extensions.insert(scope.clone());
        let fut = self.inner.call(Request::from_parts(parts, body));

        Box::pin(async move {
            let result = fut.await;
            drop(scope);
            result
        })
    }
}

impl IntoResponse for InterceptError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal server error" })),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
