use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use tracing::error;

/// Errors returned by the invite and activation flow.
///
/// Every variant except [`Collaborator`](Self::Collaborator) is a business
/// rule violation reported to the caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email already exists")]
    EmailExists,
    #[error("Cannot assign super role to users")]
    SuperRole,
    #[error("Invalid invite code")]
    InvalidInviteCode,
    #[error("Invite code has expired")]
    InviteExpired,
    #[error("Account already registered")]
    AccountAlreadyRegistered,
    /// A datastore, mail or transaction collaborator failed.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl AuthError {
    /// Whether this error is a rule violation the client can correct.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Collaborator(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.is_validation() {
            let body = Json(json!({ "error": self.to_string() }));
            return (StatusCode::BAD_REQUEST, body).into_response();
        }
        error!(error = %self, "auth collaborator failure");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal server error" })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        for err in [
            AuthError::EmailExists,
            AuthError::SuperRole,
            AuthError::InvalidInviteCode,
            AuthError::InviteExpired,
            AuthError::AccountAlreadyRegistered,
        ] {
            assert!(err.is_validation());
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn collaborator_errors_map_to_server_error() {
        let err = AuthError::from(anyhow::anyhow!("datastore unavailable"));
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "datastore unavailable");
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
