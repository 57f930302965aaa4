//! Session gate: turns a request's token into an authenticated user.
//!
//! The token is read from the HTTP-only `token` cookie. An
//! `Authorization: Bearer` header is still honored when no cookie is sent,
//! for older clients.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::TokenIssuer;
use crate::db::{DbPool, User};
use crate::AppState;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "token";

/// The authenticated principal, resolved before the handler runs
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Extract the token from the session cookie, falling back to a Bearer header
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve a token to a user.
///
/// Missing, invalid and expired tokens are 401. A valid token whose user
/// no longer exists is 404.
pub async fn authenticate(
    db: &DbPool,
    tokens: &TokenIssuer,
    token: Option<&str>,
) -> Result<User, ApiError> {
    let token = token.ok_or_else(|| ApiError::unauthorized("Token is missing"))?;
    let user_id = tokens.verify(token)?;

    User::find_by_id(db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers);
        let user = authenticate(&state.db, &state.tokens, token.as_deref()).await?;
        Ok(CurrentUser(user))
    }
}
