//! HTTP handler definitions for the gaekit server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod auth;
pub mod health;

pub use auth::{activate_handler, invite_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::Lifecycle;
use crate::auth::InviteUserService;
use crate::config::AppConfig;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Health state and in-flight tracking.
    pub lifecycle: Arc<Lifecycle>,
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Invite and activation operations.
    pub invites: Arc<InviteUserService>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
