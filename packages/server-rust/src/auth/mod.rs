//! Account invitation and activation.
//!
//! - [`invite`]: `InviteUserService` with the invite/activate operations
//! - [`transaction`]: explicit transactional blocks
//! - [`password`]: argon2 password hashing
//! - [`memory`], [`mail`]: in-process collaborators for development and tests

pub mod error;
pub mod invite;
pub mod mail;
pub mod memory;
pub mod password;
pub mod transaction;

pub use error::AuthError;
pub use invite::{activation_link, AuthBackends, InviteUserService, INVITE_CODE_EXPIRY};
pub use memory::in_memory_backends;
pub use password::{hash_password, verify_password};
pub use transaction::transactional;
