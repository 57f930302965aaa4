//! Credentials, password hashing and session tokens.

pub mod credentials;
pub mod error;
pub mod password;
pub mod token;

pub use error::{CredentialError, TokenError};
pub use token::{SessionClaims, TokenIssuer, SESSION_TTL_SECS};
