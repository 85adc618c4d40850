use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::{TokenGenerator, parse_token};
use crate::error::{Error, Result};
use crate::server::AppState;
use crate::types::{Token, User};

const MAX_LOOKUP_ATTEMPTS: u32 = 3;

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub user: User,
}

/// Validates a raw token string against the store.
pub fn validate_token(
    state: &Arc<AppState>,
    raw_token: &str,
) -> std::result::Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) = parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = state
        .store
        .get_token_by_lookup(&lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.expires_at < Utc::now() {
        return Err(TokenValidationError::TokenExpired);
    }

    let user = state
        .store
        .get_user(token.user_id)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    if let Err(e) = state.store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

/// Extracts token from a Bearer Authorization header.
/// Returns None if no auth header is present.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> std::result::Result<Option<String>, TokenValidationError> {
    match auth_header {
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim().to_string()))
            .ok_or(TokenValidationError::InvalidScheme),
        None => Ok(None),
    }
}

/// Creates a session token for `user` and returns it with the raw credential.
pub fn issue_session(state: &AppState, user: &User) -> Result<(Token, String)> {
    let generator = TokenGenerator::new();
    let ttl = Duration::try_hours(state.config.session_ttl_hours)
        .ok_or_else(|| Error::Config("session_ttl_hours is out of range".to_string()))?;

    for _ in 0..MAX_LOOKUP_ATTEMPTS {
        let (raw_token, lookup, hash) = generator.generate()?;
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::Config("session_ttl_hours is out of range".to_string()))?;
        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            user_id: user.id,
            created_at: now,
            expires_at,
            last_used_at: None,
        };

        match state.store.create_token(&token) {
            Ok(()) => return Ok((token, raw_token)),
            Err(Error::TokenLookupCollision) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(Error::TokenLookupCollision)
}
