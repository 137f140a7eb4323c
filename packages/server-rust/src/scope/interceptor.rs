use std::sync::Arc;

use gaekit_core::RequestScope;
use http::request::Parts;

// ---------------------------------------------------------------------------
// RequestScopeInterceptor trait
// ---------------------------------------------------------------------------

/// Seeds the request scope from an incoming request.
///
/// Interceptors are registered once at startup and invoked synchronously, in
/// registration order, for every request that gets a scope. An error aborts
/// the request before any handler runs.
pub trait RequestScopeInterceptor: Send + Sync {
    /// Returns the unique name of this interceptor, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Inspect `request` and optionally write into `scope`.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the request being intercepted.
    fn intercept(&self, request: &Parts, scope: &RequestScope) -> anyhow::Result<()>;
}

/// Failure raised while running interceptors for a request.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("interceptor {name} failed: {source}")]
    Failed {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// InterceptorRegistry
// ---------------------------------------------------------------------------

/// Ordered list of interceptors run for each scoped request.
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    interceptors: Vec<Arc<dyn RequestScopeInterceptor>>,
}

impl InterceptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Append an interceptor. Registration order is invocation order.
    pub fn register<T: RequestScopeInterceptor + 'static>(&mut self, interceptor: T) {
        self.interceptors.push(Arc::new(interceptor));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<T: RequestScopeInterceptor + 'static>(mut self, interceptor: T) -> Self {
        self.register(interceptor);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Interceptor names in invocation order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run every interceptor in registration order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`InterceptError::Failed`] naming the interceptor that failed.
    pub fn run(&self, request: &Parts, scope: &RequestScope) -> Result<(), InterceptError> {
        for interceptor in &self.interceptors {
            interceptor
                .intercept(request, scope)
                .map_err(|source| InterceptError::Failed {
                    name: interceptor.name(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("interceptors", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
