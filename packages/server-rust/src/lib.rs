//! gaekit server: request scope middleware, request-scoped logging, cloud
//! logging setup, and the account invite/activation flow on axum.

pub mod auth;
pub mod config;
pub mod logging;
pub mod network;
pub mod scope;

pub use config::{AppConfig, ServerArgs};
pub use network::module::default_interceptors;
pub use network::{AppState, NetworkModule};
pub use scope::{CurrentScope, InterceptorRegistry, RequestScopeInterceptor, RequestScopeLayer};
