//! Axum extractor for the request scope attached by [`RequestScopeLayer`].
//!
//! [`RequestScopeLayer`]: super::RequestScopeLayer

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use gaekit_core::{RequestContext, RequestScope};
use http::request::Parts;

/// The scope of the request being handled.
///
/// Never rejects: requests that passed through without a scope (scoping
/// disabled, or the layer not installed) extract an inactive handle.
#[derive(Debug, Clone, Default)]
pub struct CurrentScope(pub RequestScope);

impl CurrentScope {
    /// Starts a collaborator context for this request.
    #[must_use]
    pub fn into_context(self) -> RequestContext {
        RequestContext::new(self.0)
    }
}

impl<S> FromRequestParts<S> for CurrentScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<RequestScope>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}
