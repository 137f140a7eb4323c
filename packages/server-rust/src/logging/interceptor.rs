use gaekit_core::{RequestScope, RequestScopeConfig};
use http::request::Parts;

use super::logger::{Logger, LOGGER_KEY};
use crate::scope::RequestScopeInterceptor;

/// Bundles the per-request logger into the request scope.
///
/// The logger is put on the request by [`RequestLoggerLayer`], which only runs
/// in the hosted environment. In the hosted environment every request that
/// does not get its logger bundled (bundling off or no logger attached) is
/// reported on the root logger; elsewhere this is silent.
///
/// [`RequestLoggerLayer`]: super::RequestLoggerLayer
#[derive(Debug, Clone)]
pub struct LoggingRequestScopeInterceptor {
    bundling_enabled: bool,
    hosted: bool,
}

impl LoggingRequestScopeInterceptor {
    #[must_use]
    pub fn new(config: &RequestScopeConfig, hosted: bool) -> Self {
        Self {
            bundling_enabled: config.log_bundling_enabled,
            hosted,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.bundling_enabled
    }
}

impl RequestScopeInterceptor for LoggingRequestScopeInterceptor {
    fn name(&self) -> &'static str {
        "LoggingRequestScopeInterceptor"
    }

    fn intercept(&self, request: &Parts, scope: &RequestScope) -> anyhow::Result<()> {
        match (self.bundling_enabled, request.extensions.get::<Logger>()) {
            (true, Some(logger)) => scope.set(&LOGGER_KEY, logger.clone())?,
            _ if self.hosted => Logger::root().warn(format_args!(
                "{}: Logger does not exist on Request, so cannot set it within request scope.",
                self.name()
            )),
            _ => {}
        }
        Ok(())
    }
}
