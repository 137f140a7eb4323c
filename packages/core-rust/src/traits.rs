//! Collaborator seams for the account invite flow.
//!
//! Each trait is implemented by a datastore or delivery backend outside this
//! crate. Every call receives the [`RequestContext`] so implementations can
//! join the enclosing transaction and read request-scoped values.

use async_trait::async_trait;

use crate::context::{RequestContext, TransactionId};
use crate::types::{Credential, Invite, MailMessage, NewUser, User, UserPatch};

/// Credential storage keyed by email.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Load the credential for `email`, if one exists.
    async fn get(&self, ctx: &RequestContext, email: &str) -> anyhow::Result<Option<Credential>>;

    /// Insert or replace a credential.
    async fn save(&self, ctx: &RequestContext, credential: Credential) -> anyhow::Result<()>;
}

/// User account management.
#[async_trait]
pub trait UserService: Send + Sync {
    async fn get_by_email(&self, ctx: &RequestContext, email: &str)
        -> anyhow::Result<Option<User>>;

    /// Create a user and return it with its assigned id.
    async fn create(&self, ctx: &RequestContext, user: NewUser) -> anyhow::Result<User>;

    /// Apply `patch` to the user with `id` and return the updated user.
    /// Fails if no such user exists.
    async fn update(&self, ctx: &RequestContext, id: &str, patch: UserPatch)
        -> anyhow::Result<User>;
}

/// Pending invite storage keyed by activation code.
#[async_trait]
pub trait InviteRepository: Send + Sync {
    async fn get(&self, ctx: &RequestContext, code: &str) -> anyhow::Result<Option<Invite>>;

    async fn save(&self, ctx: &RequestContext, invite: Invite) -> anyhow::Result<()>;

    async fn delete(&self, ctx: &RequestContext, code: &str) -> anyhow::Result<()>;
}

/// Outbound email delivery.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, ctx: &RequestContext, message: MailMessage) -> anyhow::Result<()>;
}

/// Datastore transaction boundary.
///
/// Atomicity is the implementation's concern; callers only open, commit and
/// roll back.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self, ctx: &RequestContext) -> anyhow::Result<TransactionId>;

    async fn commit(&self, tx: TransactionId) -> anyhow::Result<()>;

    async fn rollback(&self, tx: TransactionId) -> anyhow::Result<()>;
}
