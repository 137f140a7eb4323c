//! Logging: global subscriber setup, root and per-request loggers, and
//! bundling of the request logger into the request scope.

#[cfg(test)]
pub(crate) mod capture;
pub mod interceptor;
pub mod logger;
pub mod middleware;
pub mod telemetry;

pub use interceptor::LoggingRequestScopeInterceptor;
pub use logger::{logger, Logger, LOGGER_KEY};
pub use middleware::{RequestLoggerLayer, RequestLoggerService};
pub use telemetry::{
    cloud_logging_layer, init_tracing, CloudLoggingFormat, LogFormat, HOSTED_ENV_MARKER,
};
