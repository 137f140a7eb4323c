//! Networking: configuration, middleware stack, handlers, and server lifecycle.

pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod module;

pub use config::NetworkConfig;
pub use handlers::AppState;
pub use lifecycle::{HealthState, InFlightGuard, InFlightLayer, Lifecycle};
pub use middleware::build_http_layers;
pub use module::NetworkModule;
