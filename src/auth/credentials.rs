//! Credential store: registration, credential checks and password changes.
//!
//! Emails are compared case-insensitively: they are trimmed and lower-cased
//! before they reach the database (the column is `COLLATE NOCASE` as well).

use lazy_static::lazy_static;
use sqlx::SqlitePool;
use tracing::info;

use super::error::CredentialError;
use super::password::{hash_password, verify_password};
use crate::db::User;

lazy_static! {
    /// Verified against when the email is unknown, so both failure paths cost one hash check
    static ref DUMMY_HASH: String =
        hash_password("llm-connect-dummy-password").unwrap_or_default();
}

/// Canonical form of an email address used for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Argon2 runs on the blocking pool
async fn hash_blocking(password: &str) -> Result<String, CredentialError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| CredentialError::Hash(e.to_string()))?
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

async fn verify_blocking(password: &str, hash: &str) -> bool {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

/// Create a new user. Fails with `DuplicateEmail` if the email is taken.
pub async fn register(
    db: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<User, CredentialError> {
    let email = normalize_email(email);

    if User::find_by_email(db, &email).await?.is_some() {
        return Err(CredentialError::DuplicateEmail);
    }

    let password_hash = hash_blocking(password).await?;

    let user = User::create(db, &email, &password_hash)
        .await
        .map_err(|e| match &e {
            // Lost a race with a concurrent registration
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CredentialError::DuplicateEmail
            }
            _ => CredentialError::Database(e),
        })?;

    info!(user_id = user.id, email = %user.email, "User registered");
    Ok(user)
}

/// Return the user only if `password` matches the stored hash.
///
/// An unknown email and a wrong password are indistinguishable to the caller.
pub async fn verify(
    db: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<Option<User>, CredentialError> {
    let email = normalize_email(email);

    match User::find_by_email(db, &email).await? {
        Some(user) => {
            if verify_blocking(password, &user.password_hash).await {
                Ok(Some(user))
            } else {
                Ok(None)
            }
        }
        None => {
            verify_blocking(password, &DUMMY_HASH).await;
            Ok(None)
        }
    }
}

/// Replace a user's password. The previous password stops working immediately.
pub async fn set_password(
    db: &SqlitePool,
    user_id: i64,
    password: &str,
) -> Result<(), CredentialError> {
    let password_hash = hash_blocking(password).await?;

    if !User::update_password_hash(db, user_id, &password_hash).await? {
        return Err(CredentialError::UserNotFound);
    }

    info!(user_id, "Password changed");
    Ok(())
}
