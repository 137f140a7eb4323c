//! Account invitation and activation.
//!
//! Inviting creates (or reuses) a disabled user, stores a time-limited invite
//! and emails an activation link. Activating with the link's code sets the
//! user's name and password and enables the account. Both operations run in a
//! single transaction.

use std::sync::Arc;

use anyhow::anyhow;
use gaekit_core::{
    ClockSource, Credential, CredentialKind, CredentialRepository, Invite, InviteRepository,
    MailMessage, MailSender, NewUser, RequestContext, TransactionManager, User, UserPatch,
    UserService, SUPER_ROLE,
};
use uuid::Uuid;

use super::error::AuthError;
use super::password::hash_password;
use super::transaction::transactional;
use crate::config::AppConfig;
use crate::logging::logger;

/// How long an invite stays valid: 7 days, in milliseconds.
pub const INVITE_CODE_EXPIRY: u64 = 7 * 24 * 60 * 60 * 1000;

const INVITE_SUBJECT: &str = "Activate account";

/// Collaborators used by [`InviteUserService`].
#[derive(Clone)]
pub struct AuthBackends {
    pub credentials: Arc<dyn CredentialRepository>,
    pub users: Arc<dyn UserService>,
    pub invites: Arc<dyn InviteRepository>,
    pub mail: Arc<dyn MailSender>,
    pub transactions: Arc<dyn TransactionManager>,
    pub clock: Arc<dyn ClockSource>,
}

/// Invite and activation operations.
pub struct InviteUserService {
    config: Arc<AppConfig>,
    backends: AuthBackends,
}

impl InviteUserService {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, backends: AuthBackends) -> Self {
        Self { config, backends }
    }

    /// Invites `email` with `roles` and sends the activation email.
    ///
    /// Returns the (still disabled) user the invite is linked to.
    ///
    /// # Errors
    ///
    /// - [`AuthError::EmailExists`] if a credential already exists for `email`
    /// - [`AuthError::SuperRole`] if `roles` contains the super role
    /// - [`AuthError::Collaborator`] if a collaborator fails
    pub async fn invite_user(
        &self,
        ctx: &RequestContext,
        email: &str,
        roles: &[String],
    ) -> Result<User, AuthError> {
        transactional(self.backends.transactions.as_ref(), ctx, |ctx| async move {
            self.invite_user_in_tx(&ctx, email, roles).await
        })
        .await
    }

    /// Activates the account behind invite `code`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidInviteCode`] if no invite exists for `code`
    /// - [`AuthError::InviteExpired`] if the invite is older than [`INVITE_CODE_EXPIRY`]
    /// - [`AuthError::AccountAlreadyRegistered`] if the email already has a credential
    /// - [`AuthError::Collaborator`] if a collaborator fails
    pub async fn activate_account(
        &self,
        ctx: &RequestContext,
        code: &str,
        name: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        transactional(self.backends.transactions.as_ref(), ctx, |ctx| async move {
            self.activate_account_in_tx(&ctx, code, name, password)
                .await
        })
        .await
    }

    async fn invite_user_in_tx(
        &self,
        ctx: &RequestContext,
        email: &str,
        roles: &[String],
    ) -> Result<User, AuthError> {
        let log = logger(&ctx.scope, &self.config.request_scope);
        log.info(format_args!("Inviting user with email: {email}"));

        if self.backends.credentials.get(ctx, email).await?.is_some() {
            return Err(AuthError::EmailExists);
        }

        if roles.iter().any(|role| role == SUPER_ROLE) {
            return Err(AuthError::SuperRole);
        }

        let user = match self.backends.users.get_by_email(ctx, email).await? {
            Some(user) => user,
            None => {
                self.backends
                    .users
                    .create(
                        ctx,
                        NewUser {
                            email: email.to_string(),
                            enabled: false,
                            ..NewUser::default()
                        },
                    )
                    .await?
            }
        };

        let invite_id = Uuid::new_v4().to_string();
        self.backends
            .invites
            .save(
                ctx,
                Invite {
                    id: invite_id.clone(),
                    email: email.to_string(),
                    created_at: self.backends.clock.now(),
                    roles: roles.to_vec(),
                    user_id: user.id.clone(),
                },
            )
            .await?;

        let address = activation_link(&self.config.host, &invite_id);
        log.info(format_args!(
            "Sending invitation email to {email} with link {address}"
        ));

        self.backends
            .mail
            .send(
                ctx,
                MailMessage {
                    to: email.to_string(),
                    subject: INVITE_SUBJECT.to_string(),
                    html: invite_email_html(&address),
                },
            )
            .await?;

        Ok(user)
    }

    async fn activate_account_in_tx(
        &self,
        ctx: &RequestContext,
        code: &str,
        name: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let invite = self
            .backends
            .invites
            .get(ctx, code)
            .await?
            .ok_or(AuthError::InvalidInviteCode)?;

        if self.backends.clock.now().saturating_sub(invite.created_at) > INVITE_CODE_EXPIRY {
            return Err(AuthError::InviteExpired);
        }

        if self
            .backends
            .credentials
            .get(ctx, &invite.email)
            .await?
            .is_some()
        {
            return Err(AuthError::AccountAlreadyRegistered);
        }

        let user = self
            .backends
            .users
            .update(
                ctx,
                &invite.user_id,
                UserPatch {
                    name: Some(name.to_string()),
                    roles: Some(invite.roles.clone()),
                    enabled: Some(true),
                },
            )
            .await?;

        logger(&ctx.scope, &self.config.request_scope).info(format_args!(
            "Accepting invitation and activating account for email {}, code {code}, name {name}",
            user.email
        ));

        // Hashing is CPU-bound; keep it off the async workers.
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| anyhow!("password hashing task failed: {e}"))??;

        self.backends
            .credentials
            .save(
                ctx,
                Credential {
                    id: invite.email.clone(),
                    kind: CredentialKind::Password,
                    password_hash,
                    user_id: user.id.clone(),
                },
            )
            .await?;

        self.backends.invites.delete(ctx, code).await?;

        Ok(user)
    }
}

/// Link the invitee follows to activate their account.
#[must_use]
pub fn activation_link(host: &str, invite_id: &str) -> String {
    format!("{}/activate/{invite_id}", host.trim_end_matches('/'))
}

fn invite_email_html(address: &str) -> String {
    format!(
        "<html>\n<head></head>\n<body><a href=\"{address}\">Activate your account</a></body>\n</html>\n"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use gaekit_core::FixedClock;

    use super::*;
    use crate::auth::mail::Outbox;
    use crate::auth::memory::{
        InMemoryCredentials, InMemoryInvites, InMemoryUsers, RecordingTransactions,
        TransactionEvent,
    };
    use crate::auth::password::verify_password;

    const NOW: u64 = 1_700_000_000_000;

    struct Fixture {
        service: InviteUserService,
        credentials: Arc<InMemoryCredentials>,
        users: Arc<InMemoryUsers>,
        invites: Arc<InMemoryInvites>,
        outbox: Arc<Outbox>,
        transactions: Arc<RecordingTransactions>,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let credentials = Arc::new(InMemoryCredentials::new());
        let users = Arc::new(InMemoryUsers::new());
        let invites = Arc::new(InMemoryInvites::new());
        let outbox = Arc::new(Outbox::new());
        let transactions = Arc::new(RecordingTransactions::new());
        let clock = Arc::new(FixedClock::new(NOW));

        let config = AppConfig {
            host: "https://app.example.com/".to_string(),
            ..AppConfig::default()
        };
        let service = InviteUserService::new(
            Arc::new(config),
            AuthBackends {
                credentials: credentials.clone(),
                users: users.clone(),
                invites: invites.clone(),
                mail: outbox.clone(),
                transactions: transactions.clone(),
                clock: clock.clone(),
            },
        );

        Fixture {
            service,
            credentials,
            users,
            invites,
            outbox,
            transactions,
            clock,
        }
    }

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn code_from_mail(f: &Fixture) -> String {
        let html = &f.outbox.sent()[0].html;
        let start = html.find("/activate/").unwrap() + "/activate/".len();
        let end = html[start..].find('"').unwrap() + start;
        html[start..end].to_string()
    }

    async fn register_credential(f: &Fixture, email: &str) {
        f.credentials
            .save(
                &RequestContext::default(),
                Credential {
                    id: email.to_string(),
                    kind: CredentialKind::Password,
                    password_hash: "existing".to_string(),
                    user_id: "u0".to_string(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invite_creates_disabled_user_invite_and_email() {
        let f = fixture();
        let ctx = RequestContext::default();

        let user = f
            .service
            .invite_user(&ctx, "a@x.com", &roles(&["editor"]))
            .await
            .unwrap();

        assert_eq!(user.email, "a@x.com");
        assert!(!user.enabled);
        assert_eq!(f.users.len(), 1);

        let sent = f.outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[0].subject, "Activate account");

        let code = code_from_mail(&f);
        assert!(sent[0]
            .html
            .contains(&format!("https://app.example.com/activate/{code}")));

        let invite = f.invites.get(&ctx, &code).await.unwrap().unwrap();
        assert_eq!(invite.created_at, NOW);
        assert_eq!(invite.roles, roles(&["editor"]));
        assert_eq!(invite.user_id, user.id);

        assert_eq!(
            f.transactions.events(),
            vec![
                TransactionEvent::Begin(gaekit_core::TransactionId(1)),
                TransactionEvent::Commit(gaekit_core::TransactionId(1)),
            ]
        );
    }

    #[tokio::test]
    async fn invite_reuses_existing_user() {
        let f = fixture();
        let ctx = RequestContext::default();
        let existing = f
            .users
            .create(
                &ctx,
                NewUser {
                    email: "a@x.com".to_string(),
                    ..NewUser::default()
                },
            )
            .await
            .unwrap();

        let user = f.service.invite_user(&ctx, "a@x.com", &[]).await.unwrap();

        assert_eq!(user.id, existing.id);
        assert_eq!(f.users.len(), 1);
    }

    #[tokio::test]
    async fn invite_existing_credential_fails_without_email() {
        let f = fixture();
        register_credential(&f, "a@x.com").await;

        let err = f
            .service
            .invite_user(&RequestContext::default(), "a@x.com", &roles(&["editor"]))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::EmailExists));
        assert_eq!(err.to_string(), "Email already exists");
        assert!(f.outbox.sent().is_empty());
        assert!(f.invites.is_empty());
        assert!(matches!(
            f.transactions.events().last(),
            Some(TransactionEvent::Rollback(_))
        ));
    }

    #[tokio::test]
    async fn invite_super_role_rejected() {
        let f = fixture();

        let err = f
            .service
            .invite_user(&RequestContext::default(), "a@x.com", &roles(&["super"]))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::SuperRole));
        assert_eq!(err.to_string(), "Cannot assign super role to users");
        assert!(f.users.is_empty());
        assert!(f.outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn activate_unknown_code_fails() {
        let f = fixture();
        let err = f
            .service
            .activate_account(&RequestContext::default(), "nope", "Ada", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInviteCode));
    }

    #[tokio::test]
    async fn activate_expired_invite_fails() {
        let f = fixture();
        let ctx = RequestContext::default();
        f.service.invite_user(&ctx, "a@x.com", &[]).await.unwrap();
        let code = code_from_mail(&f);

        f.clock.advance(INVITE_CODE_EXPIRY + 1);

        let err = f
            .service
            .activate_account(&ctx, &code, "Ada", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InviteExpired));
        assert_eq!(err.to_string(), "Invite code has expired");
        assert!(f.credentials.is_empty());
    }

    #[tokio::test]
    async fn activate_at_exact_expiry_succeeds() {
        let f = fixture();
        let ctx = RequestContext::default();
        f.service.invite_user(&ctx, "a@x.com", &[]).await.unwrap();
        let code = code_from_mail(&f);

        f.clock.advance(INVITE_CODE_EXPIRY);

        f.service
            .activate_account(&ctx, &code, "Ada", "pw")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn activate_registered_email_fails() {
        let f = fixture();
        let ctx = RequestContext::default();
        f.service.invite_user(&ctx, "a@x.com", &[]).await.unwrap();
        let code = code_from_mail(&f);
        register_credential(&f, "a@x.com").await;

        let err = f
            .service
            .activate_account(&ctx, &code, "Ada", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountAlreadyRegistered));
        assert_eq!(f.invites.len(), 1);
    }

    #[tokio::test]
    async fn invite_then_activate_round_trip() {
        let f = fixture();
        let ctx = RequestContext::default();
        f.service
            .invite_user(&ctx, "a@x.com", &roles(&["editor"]))
            .await
            .unwrap();
        let code = code_from_mail(&f);

        let user = f
            .service
            .activate_account(&ctx, &code, "Ada", "s3cret")
            .await
            .unwrap();

        assert!(user.enabled);
        assert_eq!(user.roles, roles(&["editor"]));
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert!(f.invites.is_empty());

        let credential = f
            .credentials
            .get(&ctx, "a@x.com")
            .await
            .unwrap()
            .expect("credential stored");
        assert_eq!(credential.kind, CredentialKind::Password);
        assert_eq!(credential.user_id, user.id);
        assert!(verify_password(&credential.password_hash, "s3cret"));

        // A used code cannot be replayed.
        let err = f
            .service
            .activate_account(&ctx, &code, "Ada", "s3cret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInviteCode));
    }

    #[test]
    fn activation_link_trims_trailing_slash() {
        assert_eq!(
            activation_link("https://h.example/", "abc"),
            "https://h.example/activate/abc"
        );
        assert_eq!(
            activation_link("http://localhost:8080", "abc"),
            "http://localhost:8080/activate/abc"
        );
    }
}
