//! gaekit server binary.
//!
//! Reads configuration from flags and environment, installs logging, wires the
//! in-memory account backends, and serves until Ctrl-C / SIGTERM.

use std::sync::Arc;

use clap::Parser;
use gaekit_server::auth::{in_memory_backends, InviteUserService};
use gaekit_server::logging::{init_tracing, LogFormat};
use gaekit_server::{default_interceptors, NetworkModule, ServerArgs};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(ServerArgs::parse().into_config());
    init_tracing(
        LogFormat::for_environment(config.hosted),
        config.project_id.clone(),
    )?;

    let invites = Arc::new(InviteUserService::new(
        Arc::clone(&config),
        in_memory_backends(),
    ));
    let interceptors = default_interceptors(&config);

    let mut module = NetworkModule::new(Arc::clone(&config), invites, interceptors);
    let port = module.start().await?;
    info!(port, "gaekit server starting");

    module.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
