use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::session::{CurrentUser, SESSION_COOKIE};
use super::validation::{validate_email, validate_password};
use crate::auth::credentials;
use crate::db::{
    ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
    UserResponse,
};
use crate::AppState;

/// Build the session cookie carrying `token`
fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Register endpoint
///
/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(request) = payload?;
    let email = request.email.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("email", validate_email(&email))
        .check("password", validate_password(&password));
    errors.finish()?;

    credentials::register(&state.db, &email, &password).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully.")),
    ))
}

/// Login endpoint
///
/// POST /login
///
/// The token is set as an HTTP-only cookie and also returned in the body.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let Json(request) = payload?;

    let mut errors = ValidationErrorBuilder::new();
    let email = match request.email.filter(|e| !e.trim().is_empty()) {
        Some(email) => email,
        None => {
            errors.add("email", "Email is required");
            String::new()
        }
    };
    let password = match request.password.filter(|p| !p.is_empty()) {
        Some(password) => password,
        None => {
            errors.add("password", "Password is required");
            String::new()
        }
    };
    errors.finish()?;

    let user = match credentials::verify(&state.db, &email, &password).await? {
        Some(user) => user,
        None => {
            tracing::warn!("Failed login attempt");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    let token = state.tokens.issue(user.id)?;
    tracing::info!(user_id = user.id, "User logged in");

    let jar = jar.add(session_cookie(
        token.clone(),
        state.config.server.secure_cookies,
    ));

    Ok((
        jar,
        Json(LoginResponse {
            message: "Login successful.".to_string(),
            token,
        }),
    ))
}

/// Logout endpoint. Only clears the cookie; issued tokens stay valid until they expire.
///
/// POST /logout
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (jar, Json(MessageResponse::new("Logged out.")))
}

/// Current user endpoint
///
/// GET /user
pub async fn current_user(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Change the password of the current user
///
/// PUT /user/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    let current_password = request.current_password.unwrap_or_default();
    let new_password = request.new_password.unwrap_or_default();

    let mut errors = ValidationErrorBuilder::new();
    if current_password.is_empty() {
        errors.add("current_password", "Current password is required");
    }
    errors.check("new_password", validate_password(&new_password));
    errors.finish()?;

    if credentials::verify(&state.db, &user.email, &current_password)
        .await?
        .is_none()
    {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    credentials::set_password(&state.db, user.id, &new_password).await?;

    Ok(Json(MessageResponse::new("Password updated.")))
}
