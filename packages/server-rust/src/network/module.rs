//! Network module with deferred startup lifecycle.
//!
//! `new()` creates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. Tests drive the router
//! returned by `build_router()` directly.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use gaekit_core::ContextStore;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::handlers::{
    activate_handler, health_handler, invite_handler, liveness_handler, readiness_handler,
    AppState,
};
use super::lifecycle::Lifecycle;
use super::middleware::build_http_layers;
use crate::auth::InviteUserService;
use crate::config::AppConfig;
use crate::logging::LoggingRequestScopeInterceptor;
use crate::scope::InterceptorRegistry;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interceptors installed by default: request logger bundling.
#[must_use]
pub fn default_interceptors(config: &AppConfig) -> InterceptorRegistry {
    InterceptorRegistry::new().with(LoggingRequestScopeInterceptor::new(
        &config.request_scope,
        config.hosted,
    ))
}

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    config: Arc<AppConfig>,
    store: Arc<ContextStore>,
    interceptors: InterceptorRegistry,
    invites: Arc<InviteUserService>,
    lifecycle: Arc<Lifecycle>,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        invites: Arc<InviteUserService>,
        interceptors: InterceptorRegistry,
    ) -> Self {
        Self {
            store: Arc::new(ContextStore::new(&config.request_scope)),
            config,
            interceptors,
            invites,
            lifecycle: Arc::new(Lifecycle::new()),
            listener: None,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    #[must_use]
    pub fn context_store(&self) -> Arc<ContextStore> {
        Arc::clone(&self.store)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    /// - `POST /auth/invite` -- invite a user
    /// - `POST /auth/activate` -- activate an invited account
    pub fn build_router(&self) -> Router {
        let state = AppState {
            lifecycle: Arc::clone(&self.lifecycle),
            config: Arc::clone(&self.config),
            invites: Arc::clone(&self.invites),
            start_time: Instant::now(),
        };

        let layers = build_http_layers(
            &self.config,
            Arc::clone(&self.store),
            self.interceptors.clone(),
            Arc::clone(&self.lifecycle),
        );

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/auth/invite", post(invite_handler))
            .route("/auth/activate", post(activate_handler))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let network = &self.config.network;
        let addr = format!("{}:{}", network.host, network.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(
            host = %network.host,
            port,
            request_scope = self.config.request_scope.enabled,
            log_bundling = self.config.request_scope.log_bundling_enabled,
            hosted = self.config.hosted,
            "TCP listener bound"
        );

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then drains in-flight
    /// requests for up to 30 seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, or if the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let lifecycle = Arc::clone(&self.lifecycle);

        lifecycle.mark_ready();
        info!("Serving HTTP connections");

        let drain_lifecycle = Arc::clone(&lifecycle);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                drain_lifecycle.begin_drain();
            })
            .await?;

        if lifecycle.drained(DRAIN_TIMEOUT).await {
            info!("All requests drained");
        } else {
            warn!("Drain timeout expired with in-flight requests remaining");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::in_memory_backends;
    use crate::network::HealthState;

    fn module(config: AppConfig) -> NetworkModule {
        let config = Arc::new(config);
        let invites = Arc::new(InviteUserService::new(
            Arc::clone(&config),
            in_memory_backends(),
        ));
        let interceptors = default_interceptors(&config);
        NetworkModule::new(config, invites, interceptors)
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module(AppConfig::default());
        assert!(module.listener.is_none());
        assert_eq!(module.lifecycle().state(), HealthState::Starting);
        assert!(!module.context_store().is_enabled());
    }

    #[test]
    fn default_interceptors_install_logging() {
        let registry = default_interceptors(&AppConfig::default());
        assert_eq!(registry.names(), vec!["LoggingRequestScopeInterceptor"]);
    }

    #[test]
    fn build_router_creates_router() {
        let _router = module(AppConfig::default()).build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module(AppConfig::default());
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_fails() {
        let err = module(AppConfig::default())
            .serve(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "start() must be called before serve()");
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let mut module = module(AppConfig::default());
        module.start().await.unwrap();
        let lifecycle = module.lifecycle();

        module.serve(async {}).await.unwrap();

        assert_eq!(lifecycle.state(), HealthState::Stopped);
    }
}
