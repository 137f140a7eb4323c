use serde::{Deserialize, Serialize};

/// Role that can never be granted through an invite.
pub const SUPER_ROLE: &str = "super";

/// Application user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier assigned by the user service.
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    /// Roles granted to this user for authorization checks.
    pub roles: Vec<String>,
    /// Disabled users exist (e.g. pending an invite) but cannot sign in.
    pub enabled: bool,
}

/// Fields for creating a user. The id is assigned by the user service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub enabled: bool,
}

/// Partial update applied to an existing user. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub roles: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

impl User {
    /// Applies `patch` in place.
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(roles) = patch.roles {
            self.roles = roles;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
    }
}

/// Kind of stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Password,
}

/// Stored authentication record, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The email address this credential authenticates.
    pub id: String,
    pub kind: CredentialKind,
    /// PHC-formatted password hash.
    pub password_hash: String,
    pub user_id: String,
}

/// Pending account invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    /// Activation code embedded in the invite link.
    pub id: String,
    pub email: String,
    /// Creation time in milliseconds since Unix epoch.
    pub created_at: u64,
    pub roles: Vec<String>,
    pub user_id: String,
}

/// Outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}
