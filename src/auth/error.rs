//! Authentication error types.

use thiserror::Error;

/// Why a session token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("a user with this email already exists")]
    DuplicateEmail,

    #[error("user not found")]
    UserNotFound,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
