//! Application configuration.
//!
//! [`AppConfig`] is built once at startup (from [`ServerArgs`] in the binary,
//! or directly in tests) and shared by `Arc` with every component that needs
//! it.

use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use gaekit_core::RequestScopeConfig;

use crate::network::NetworkConfig;

/// Default public base URL used in activation links.
pub const DEFAULT_PUBLIC_HOST: &str = "http://localhost:8080";

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Public base URL of the application, used to build activation links.
    pub host: String,
    /// Request scope switches.
    pub request_scope: RequestScopeConfig,
    /// Whether the process runs in the hosted environment.
    pub hosted: bool,
    /// Cloud project id, used to qualify trace ids in hosted log output.
    pub project_id: Option<String>,
    /// Listener and HTTP middleware settings.
    pub network: NetworkConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PUBLIC_HOST.to_string(),
            request_scope: RequestScopeConfig::default(),
            hosted: false,
            project_id: None,
            network: NetworkConfig::default(),
        }
    }
}

/// Command-line and environment configuration for the server binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "gaekit-server", version, about = "Account invite service with request-scoped logging")]
pub struct ServerArgs {
    /// Public base URL used in activation links.
    #[arg(long, env = "GAEKIT_HOST", default_value = DEFAULT_PUBLIC_HOST)]
    pub public_host: String,

    /// Create a request scope for every request.
    #[arg(
        long,
        env = "REQUEST_SCOPE_ENABLED",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub request_scope_enabled: bool,

    /// Bundle the per-request logger into the request scope.
    #[arg(
        long,
        env = "REQUEST_SCOPE_LOG_BUNDLING_ENABLED",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub log_bundling_enabled: bool,

    /// Address to bind.
    #[arg(long, env = "GAEKIT_BIND_HOST", default_value = "0.0.0.0")]
    pub bind_host: String,

    /// Port to listen on. 0 means OS-assigned.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Maximum time a request may take, in seconds.
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Allowed CORS origin. Repeat for several; `*` allows any.
    #[arg(long = "cors-origin", default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Set by the hosted platform; its presence switches on hosted behaviour.
    #[arg(long, env = "APP_ENGINE_ENVIRONMENT", hide = true)]
    pub app_engine_environment: Option<String>,

    /// Cloud project id, set by the hosted platform.
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT", hide = true)]
    pub google_cloud_project: Option<String>,
}

impl ServerArgs {
    /// Converts parsed arguments into the application configuration.
    #[must_use]
    pub fn into_config(self) -> AppConfig {
        AppConfig {
            host: self.public_host,
            request_scope: RequestScopeConfig {
                enabled: self.request_scope_enabled,
                log_bundling_enabled: self.log_bundling_enabled,
            },
            hosted: self.app_engine_environment.is_some(),
            project_id: self.google_cloud_project,
            network: NetworkConfig {
                host: self.bind_host,
                port: self.port,
                cors_origins: self.cors_origins,
                request_timeout: Duration::from_secs(self.request_timeout_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.host, "http://localhost:8080");
        assert!(!config.request_scope.enabled);
        assert!(!config.request_scope.log_bundling_enabled);
        assert!(!config.hosted);
    }

    #[test]
    fn args_convert_to_config() {
        let args = ServerArgs::try_parse_from([
            "gaekit-server",
            "--public-host",
            "https://app.example.com",
            "--request-scope-enabled",
            "--log-bundling-enabled",
            "--bind-host",
            "127.0.0.1",
            "--port",
            "9000",
            "--request-timeout-secs",
            "5",
            "--cors-origin",
            "https://a.example.com",
            "--cors-origin",
            "https://b.example.com",
            "--app-engine-environment",
            "standard",
            "--google-cloud-project",
            "demo-project",
        ])
        .unwrap();

        let config = args.into_config();
        assert_eq!(config.host, "https://app.example.com");
        assert!(config.request_scope.enabled);
        assert!(config.request_scope.log_bundling_enabled);
        assert!(config.hosted);
        assert_eq!(config.project_id.as_deref(), Some("demo-project"));
        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.network.port, 9000);
        assert_eq!(config.network.request_timeout, Duration::from_secs(5));
        assert_eq!(
            config.network.cors_origins,
            vec!["https://a.example.com", "https://b.example.com"]
        );
    }

    #[test]
    fn flags_default_off() {
        let args = ServerArgs::try_parse_from(["gaekit-server", "--port", "0"]).unwrap();
        assert_eq!(args.request_timeout_secs, 30);
        assert_eq!(args.cors_origins, vec!["*"]);
    }

    #[test]
    fn scope_switches_accept_boolish_env_values() {
        std::env::set_var("REQUEST_SCOPE_ENABLED", "1");
        std::env::set_var("REQUEST_SCOPE_LOG_BUNDLING_ENABLED", "off");
        let parsed = ServerArgs::try_parse_from(["gaekit-server"]);
        std::env::remove_var("REQUEST_SCOPE_ENABLED");
        std::env::remove_var("REQUEST_SCOPE_LOG_BUNDLING_ENABLED");

        let config = parsed.unwrap().into_config();
        assert!(config.request_scope.enabled);
        assert!(!config.request_scope.log_bundling_enabled);
    }
}
