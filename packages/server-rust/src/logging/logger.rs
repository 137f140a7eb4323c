//! Root and per-request loggers.
//!
//! A [`Logger`] is a `tracing` span plus the request identity it was created
//! for. Events emitted through it are recorded inside the span, so JSON output
//! carries the request id and trace id on every line. The root logger has no
//! span and emits plain events.

use std::fmt::Display;

use gaekit_core::{RequestScope, RequestScopeConfig, ScopeKey};
use tracing::{debug, error, info, info_span, warn, Span};

/// Namespace key under which the request logger is bundled.
pub const LOGGER_KEY: ScopeKey<Logger> = ScopeKey::new("_LOGGER");

/// Handle for emitting log events, optionally bound to one request.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
    request_id: Option<String>,
    trace_id: Option<String>,
}

impl Logger {
    /// The process-wide logger.
    #[must_use]
    pub fn root() -> Self {
        Self {
            span: Span::none(),
            request_id: None,
            trace_id: None,
        }
    }

    /// A logger bound to one request.
    #[must_use]
    pub fn for_request(request_id: impl Into<String>, trace_id: Option<String>) -> Self {
        let request_id = request_id.into();
        let span = info_span!(
            "request",
            request_id = %request_id,
            trace_id = trace_id.as_deref().unwrap_or_default(),
        );
        Self {
            span,
            request_id: Some(request_id),
            trace_id,
        }
    }

    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    #[must_use]
    pub fn is_request_scoped(&self) -> bool {
        self.request_id.is_some()
    }

    /// Runs `f` inside this logger's span.
    pub fn in_scope<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.span.in_scope(f)
    }

    pub fn debug(&self, message: impl Display) {
        self.in_scope(|| debug!("{message}"));
    }

    pub fn info(&self, message: impl Display) {
        self.in_scope(|| info!("{message}"));
    }

    pub fn warn(&self, message: impl Display) {
        self.in_scope(|| warn!("{message}"));
    }

    pub fn error(&self, message: impl Display) {
        self.in_scope(|| error!("{message}"));
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::root()
    }
}

/// Returns the logger for the current request if log bundling put one in
/// `scope`, otherwise the root logger.
///
/// With log bundling disabled the namespace is not consulted at all.
#[must_use]
pub fn logger(scope: &RequestScope, config: &RequestScopeConfig) -> Logger {
    if !config.log_bundling_enabled {
        return Logger::root();
    }
    scope.get_or(&LOGGER_KEY, Logger::root())
}

/// Extracts the trace id from an `X-Cloud-Trace-Context` header value
/// (`TRACE_ID/SPAN_ID;o=OPTIONS`).
#[must_use]
pub fn parse_cloud_trace_context(value: &str) -> Option<String> {
    let trace = value.split(['/', ';']).next()?.trim();
    if trace.is_empty() || !trace.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trace.to_ascii_lowercase())
}
