//! Attaches a per-request [`Logger`] to each request.
//!
//! Runs after `SetRequestIdLayer`, so the `x-request-id` header is present.
//! Only installed in the hosted environment; elsewhere requests carry no
//! logger and the logging interceptor tolerates that.

use std::task::{Context, Poll};

use http::{HeaderMap, Request};
use tower::{Layer, Service};
use uuid::Uuid;

use super::logger::{parse_cloud_trace_context, Logger};

const REQUEST_ID_HEADER: &str = "x-request-id";
const CLOUD_TRACE_HEADER: &str = "x-cloud-trace-context";

/// Tower layer that inserts a request-bound [`Logger`] into request extensions.
#[derive(Debug, Clone, Copy)]
pub struct RequestLoggerLayer {
    enabled: bool,
}

impl RequestLoggerLayer {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggerService {
            inner,
            enabled: self.enabled,
        }
    }
}

/// Service wrapper created by [`RequestLoggerLayer`].
#[derive(Debug, Clone)]
pub struct RequestLoggerService<S> {
    inner: S,
    enabled: bool,
}

impl<S, B> Service<Request<B>> for RequestLoggerService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if self.enabled {
            let logger = request_logger(req.headers());
            req.extensions_mut().insert(logger);
        }
        self.inner.call(req)
    }
}

/// Builds the logger for a request from its headers.
fn request_logger(headers: &HeaderMap) -> Logger {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let trace_id = headers
        .get(CLOUD_TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cloud_trace_context);
    Logger::for_request(request_id, trace_id)
}
