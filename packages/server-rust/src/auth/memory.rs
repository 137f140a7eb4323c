//! In-memory collaborators for development and tests.
//!
//! Writes are visible immediately; transactions hand out ids but provide no
//! isolation or rollback of earlier writes. [`RecordingTransactions`] also
//! keeps every lifecycle event and is meant for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use gaekit_core::{
    Credential, CredentialRepository, Invite, InviteRepository, NewUser, RequestContext,
    SystemClock, TransactionId, TransactionManager, User, UserPatch, UserService,
};
use parking_lot::Mutex;
use uuid::Uuid;

use super::invite::AuthBackends;
use super::mail::LogMailSender;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Credential store keyed by email.
#[derive(Debug, Default)]
pub struct InMemoryCredentials {
    by_email: DashMap<String, Credential>,
}

impl InMemoryCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentials {
    async fn get(&self, _ctx: &RequestContext, email: &str) -> anyhow::Result<Option<Credential>> {
        Ok(self.by_email.get(email).map(|e| e.value().clone()))
    }

    async fn save(&self, _ctx: &RequestContext, credential: Credential) -> anyhow::Result<()> {
        self.by_email.insert(credential.id.clone(), credential);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// User store keyed by generated id.
#[derive(Debug, Default)]
pub struct InMemoryUsers {
    by_id: DashMap<String, User>,
}

impl InMemoryUsers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[async_trait]
impl UserService for InMemoryUsers {
    async fn get_by_email(
        &self,
        _ctx: &RequestContext,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        Ok(self
            .by_id
            .iter()
            .find(|e| e.value().email == email)
            .map(|e| e.value().clone()))
    }

    async fn create(&self, _ctx: &RequestContext, user: NewUser) -> anyhow::Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: user.email,
            name: user.name,
            roles: user.roles,
            enabled: user.enabled,
        };
        self.by_id.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        id: &str,
        patch: UserPatch,
    ) -> anyhow::Result<User> {
        let mut entry = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        entry.apply(patch);
        Ok(entry.value().clone())
    }
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

/// Invite store keyed by activation code.
#[derive(Debug, Default)]
pub struct InMemoryInvites {
    by_code: DashMap<String, Invite>,
}

impl InMemoryInvites {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

#[async_trait]
impl InviteRepository for InMemoryInvites {
    async fn get(&self, _ctx: &RequestContext, code: &str) -> anyhow::Result<Option<Invite>> {
        Ok(self.by_code.get(code).map(|e| e.value().clone()))
    }

    async fn save(&self, _ctx: &RequestContext, invite: Invite) -> anyhow::Result<()> {
        self.by_code.insert(invite.id.clone(), invite);
        Ok(())
    }

    async fn delete(&self, _ctx: &RequestContext, code: &str) -> anyhow::Result<()> {
        self.by_code.remove(code);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Transaction lifecycle event recorded by [`RecordingTransactions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    Begin(TransactionId),
    Commit(TransactionId),
    Rollback(TransactionId),
}

/// Transaction manager that hands out sequential ids and records lifecycle events.
#[derive(Debug)]
pub struct RecordingTransactions {
    next_id: AtomicU64,
    events: Mutex<Vec<TransactionEvent>>,
    fail_begin: bool,
}

impl RecordingTransactions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            events: Mutex::new(Vec::new()),
            fail_begin: false,
        }
    }

    /// A manager whose `begin` always fails, for exercising error paths.
    #[must_use]
    pub fn failing_begin() -> Self {
        Self {
            fail_begin: true,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn events(&self) -> Vec<TransactionEvent> {
        self.events.lock().clone()
    }
}

impl Default for RecordingTransactions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionManager for RecordingTransactions {
    async fn begin(&self, _ctx: &RequestContext) -> anyhow::Result<TransactionId> {
        if self.fail_begin {
            anyhow::bail!("transaction manager unavailable");
        }
        let tx = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.events.lock().push(TransactionEvent::Begin(tx));
        Ok(tx)
    }

    async fn commit(&self, tx: TransactionId) -> anyhow::Result<()> {
        self.events.lock().push(TransactionEvent::Commit(tx));
        Ok(())
    }

    async fn rollback(&self, tx: TransactionId) -> anyhow::Result<()> {
        self.events.lock().push(TransactionEvent::Rollback(tx));
        Ok(())
    }
}

/// Transaction manager that hands out sequential ids and keeps no history.
#[derive(Debug)]
pub struct InMemoryTransactions {
    next_id: AtomicU64,
}

impl InMemoryTransactions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryTransactions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactions {
    async fn begin(&self, _ctx: &RequestContext) -> anyhow::Result<TransactionId> {
        let tx = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(tx = tx.0, "transaction begin");
        Ok(tx)
    }

    async fn commit(&self, tx: TransactionId) -> anyhow::Result<()> {
        tracing::trace!(tx = tx.0, "transaction commit");
        Ok(())
    }

    async fn rollback(&self, tx: TransactionId) -> anyhow::Result<()> {
        tracing::trace!(tx = tx.0, "transaction rollback");
        Ok(())
    }
}

/// Backends wired entirely in memory, mail written to the log.
#[must_use]
pub fn in_memory_backends() -> AuthBackends {
    AuthBackends {
        credentials: Arc::new(InMemoryCredentials::new()),
        users: Arc::new(InMemoryUsers::new()),
        invites: Arc::new(InMemoryInvites::new()),
        mail: Arc::new(LogMailSender),
        transactions: Arc::new(InMemoryTransactions::new()),
        clock: Arc::new(SystemClock),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
