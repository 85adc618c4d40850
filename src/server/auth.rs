use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::auth::{RequireUser, issue_session};
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{LoginRequest, LoginResponse, RegisterRequest};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{validate_account_password, validate_email, validate_username};
use crate::types::NewUser;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let username = req.username.trim();
    let email = req.email.trim();

    validate_username(username)?;
    validate_email(email)?;
    validate_account_password(&req.password, state.config.links.min_account_password_len)?;

    let password_hash = state
        .hasher
        .hash(&req.password)
        .api_err("Failed to hash password")?;

    let user = state
        .store
        .create_user(&NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
        })
        .map_err(|e| match e {
            Error::AlreadyExists => ApiError::conflict("Username or email already registered"),
            other => ApiError::from(other),
        })?;

    tracing::info!("Registered user {}", user.username);

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user_by_login(req.login.trim())
        .api_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    let valid = state
        .hasher
        .verify(&req.password, &user.password_hash)
        .api_err("Failed to verify password")?;
    if !valid {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let (token, raw_token) = issue_session(&state, &user).api_err("Failed to create session")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(LoginResponse {
        token: raw_token,
        expires_at: token.expires_at,
        user,
    })))
}

pub async fn logout(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .store
        .delete_token(&auth.token.id)
        .api_err("Failed to revoke token")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
