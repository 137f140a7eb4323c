//! Request-scoped value propagation.
//!
//! A [`Namespace`] is an isolated key/value store owned by one logical request.
//! It is never looked up ambiently: the [`RequestScope`] handle is passed
//! explicitly (request extensions, extractors, [`RequestContext`]) to everything
//! that runs on behalf of the request. The namespace is torn down when the last
//! handle is dropped, which happens when the request's call chain unwinds.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Request scope switches, read once at startup.
///
/// Both flags default to `false`: scoping must be opted into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestScopeConfig {
    /// Whether a namespace is created for each request.
    pub enabled: bool,
    /// Whether the per-request logger is stored in the namespace.
    pub log_bundling_enabled: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by request scope accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The accessor was used outside a request scope, or scoping is disabled.
    #[error("No active context namespace exists")]
    NoActiveNamespace,
}

// ---------------------------------------------------------------------------
// ScopeKey
// ---------------------------------------------------------------------------

/// Typed key for a namespace entry.
///
/// Keys are identified by name; the type parameter only drives the downcast
/// on read. Declare keys as constants next to the code that owns the value.
pub struct ScopeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScopeKey<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for ScopeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeKey").field(&self.name).finish()
    }
}

impl<T> Clone for ScopeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ScopeKey<T> {}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

type ScopeValue = Arc<dyn Any + Send + Sync>;

/// Per-request key/value store. Last write to a key wins.
pub struct Namespace {
    id: u64,
    entries: DashMap<&'static str, ScopeValue>,
}

impl Namespace {
    fn new(id: u64) -> Self {
        Self {
            id,
            entries: DashMap::new(),
        }
    }

    /// Process-unique identifier, useful for log correlation.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&'static str> = self.entries.iter().map(|e| *e.key()).collect();
        keys.sort_unstable();
        f.debug_struct("Namespace")
            .field("id", &self.id)
            .field("keys", &keys)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RequestScope
// ---------------------------------------------------------------------------

/// Handle to the namespace of the current request, or an inactive handle.
///
/// Cloning is cheap and every clone refers to the same namespace. An inactive
/// handle (scoping disabled, or used outside a request) answers every read
/// with "absent" and every required read or write with
/// [`ScopeError::NoActiveNamespace`].
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    namespace: Option<Arc<Namespace>>,
}

impl RequestScope {
    /// A handle with no namespace behind it.
    #[must_use]
    pub fn inactive() -> Self {
        Self { namespace: None }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.namespace.is_some()
    }

    /// Identifier of the backing namespace, if any.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.namespace.as_ref().map(|ns| ns.id)
    }

    /// Returns the value stored under `key`, or `None` when the key is absent,
    /// holds a value of another type, or no namespace is active.
    #[must_use]
    pub fn get<T>(&self, key: &ScopeKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let ns = self.namespace.as_ref()?;
        let entry = ns.entries.get(key.name)?;
        entry.value().downcast_ref::<T>().cloned()
    }

    /// Returns the value stored under `key`, or `default` when it cannot be read.
    #[must_use]
    pub fn get_or<T>(&self, key: &ScopeKey<T>, default: T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get(key).unwrap_or(default)
    }

    /// Like [`get`](Self::get), but distinguishes "no active namespace".
    ///
    /// A missing key inside an active namespace is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::NoActiveNamespace`] when the handle is inactive.
    pub fn get_required<T>(&self, key: &ScopeKey<T>) -> Result<Option<T>, ScopeError>
    where
        T: Clone + Send + Sync + 'static,
    {
        if self.namespace.is_none() {
            return Err(ScopeError::NoActiveNamespace);
        }
        Ok(self.get(key))
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::NoActiveNamespace`] when the handle is inactive.
    pub fn set<T>(&self, key: &ScopeKey<T>, value: T) -> Result<(), ScopeError>
    where
        T: Send + Sync + 'static,
    {
        let ns = self
            .namespace
            .as_ref()
            .ok_or(ScopeError::NoActiveNamespace)?;
        ns.entries.insert(key.name, Arc::new(value));
        Ok(())
    }

    /// Weak reference to the backing namespace. Lets callers observe teardown
    /// without keeping the namespace alive.
    #[must_use]
    pub fn downgrade(&self) -> Option<Weak<Namespace>> {
        self.namespace.as_ref().map(Arc::downgrade)
    }
}

// ---------------------------------------------------------------------------
// ContextStore
// ---------------------------------------------------------------------------

/// Creates request namespaces, or refuses to when scoping is disabled.
#[derive(Debug)]
pub struct ContextStore {
    enabled: bool,
    next_id: AtomicU64,
}

impl ContextStore {
    #[must_use]
    pub fn new(config: &RequestScopeConfig) -> Self {
        Self {
            enabled: config.enabled,
            next_id: AtomicU64::new(1),
        }
    }

    /// A store that never creates a namespace.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(&RequestScopeConfig::default())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Opens a fresh namespace. Returns an inactive handle when disabled.
    #[must_use]
    pub fn open_scope(&self) -> RequestScope {
        if !self.enabled {
            return RequestScope::inactive();
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(scope_id = id, "request scope opened");
        RequestScope {
            namespace: Some(Arc::new(Namespace::new(id))),
        }
    }

    /// Runs `f` with a fresh namespace. The namespace outlives `f`'s
    /// synchronous body for as long as anything it started still holds a
    /// clone of the handle.
    pub async fn run_in_new_scope<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(RequestScope) -> Fut,
        Fut: Future<Output = T>,
    {
        let scope = self.open_scope();
        f(scope).await
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::disabled()
    }
}

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

/// Identifier of a datastore transaction opened by a `TransactionManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

/// Per-request context threaded through collaborator calls.
///
/// Carries the request scope and, inside a transactional block, the id of the
/// enclosing transaction.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Namespace handle of the request being served.
    pub scope: RequestScope,
    /// Transaction the call participates in, if any.
    pub transaction: Option<TransactionId>,
}

impl RequestContext {
    #[must_use]
    pub fn new(scope: RequestScope) -> Self {
        Self {
            scope,
            transaction: None,
        }
    }

    /// Copy of this context bound to `tx`.
    #[must_use]
    pub fn with_transaction(&self, tx: TransactionId) -> Self {
        Self {
            scope: self.scope.clone(),
            transaction: Some(tx),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
