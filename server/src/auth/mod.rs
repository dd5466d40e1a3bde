//! Credential service: password hashing, bearer tokens and role gating.

pub mod middleware;
pub mod password;
pub mod role;
pub mod token;

use thiserror::Error;

pub use middleware::{require_admin, require_user};
pub use password::{hash_password, verify_password};
pub use role::{Role, UnknownRole};
pub use token::{CredentialService, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("requires role '{required}'")]
    Forbidden { required: Role },

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("credential service failure: {0}")]
    Internal(String),
}
