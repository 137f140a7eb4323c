//! JSON endpoints for the invite and activation flow.

use axum::extract::State;
use axum::Json;
use gaekit_core::User;
use serde::Deserialize;

use super::AppState;
use crate::auth::AuthError;
use crate::logging::logger;
use crate::scope::CurrentScope;

/// Body of `POST /auth/invite`.
#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Body of `POST /auth/activate`.
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub code: String,
    pub name: String,
    pub password: String,
}

/// Invites a user and returns the (disabled) account.
pub async fn invite_handler(
    State(state): State<AppState>,
    scope: CurrentScope,
    Json(body): Json<InviteRequest>,
) -> Result<Json<User>, AuthError> {
    let ctx = scope.into_context();
    let user = state
        .invites
        .invite_user(&ctx, &body.email, &body.roles)
        .await?;
    Ok(Json(user))
}

/// Activates an invited account and returns it.
pub async fn activate_handler(
    State(state): State<AppState>,
    scope: CurrentScope,
    Json(body): Json<ActivateRequest>,
) -> Result<Json<User>, AuthError> {
    let ctx = scope.into_context();
    let user = state
        .invites
        .activate_account(&ctx, &body.code, &body.name, &body.password)
        .await?;
    logger(&ctx.scope, &state.config.request_scope)
        .debug(format_args!("account {} activated", user.id));
    Ok(Json(user))
}
