//! gaekit core: request scope store, account domain types, and collaborator traits.

pub mod clock;
pub mod context;
pub mod traits;
pub mod types;

pub use clock::{ClockSource, FixedClock, SystemClock};
pub use context::{
    ContextStore, Namespace, RequestContext, RequestScope, RequestScopeConfig, ScopeError,
    ScopeKey, TransactionId,
};
pub use traits::{
    CredentialRepository, InviteRepository, MailSender, TransactionManager, UserService,
};
pub use types::{Credential, CredentialKind, Invite, MailMessage, NewUser, User, UserPatch, SUPER_ROLE};
