//! Request scope integration for the HTTP pipeline.
//!
//! - [`interceptor`]: `RequestScopeInterceptor` trait and the ordered registry
//! - [`middleware`]: Tower layer that opens a scope per request and runs interceptors
//! - [`extract`]: axum extractor handing the scope to handlers

pub mod extract;
pub mod interceptor;
pub mod middleware;

pub use extract::CurrentScope;
pub use interceptor::{InterceptError, InterceptorRegistry, RequestScopeInterceptor};
pub use middleware::{RequestScopeLayer, RequestScopeService};
