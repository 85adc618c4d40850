use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use url::Url;

use crate::links::{Resolution, Resolver};
use crate::server::AppState;
use crate::server::dto::{CredentialParams, PasswordRequiredResponse};
use crate::server::response::{ApiError, ApiResponse, LINK_NOT_FOUND, StoreResultExt};
use crate::types::ClickInfo;

/// Visitor details captured for click analytics.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo(pub ClickInfo);

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientInfo(ClickInfo {
            ip_address,
            referrer: header_str(&parts.headers, header::REFERER),
            user_agent: header_str(&parts.headers, header::USER_AGENT),
        }))
    }
}

fn location(destination: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(destination).ok().or_else(|| {
        Url::parse(destination)
            .ok()
            .and_then(|u| HeaderValue::from_str(u.as_str()).ok())
    })
}

fn respond(
    state: &AppState,
    username: &str,
    code: &str,
    credential: Option<&str>,
    client: ClientInfo,
) -> Result<Response, ApiError> {
    let resolution = Resolver::new(state.store.as_ref(), &state.hasher)
        .resolve(username, code, credential, Utc::now())
        .api_err("Failed to resolve link")?;

    match resolution {
        Resolution::Redirect {
            link_id,
            destination,
        } => {
            let location = location(&destination).ok_or_else(|| {
                tracing::error!("Link {link_id} has an unusable destination");
                ApiError::internal("Invalid destination")
            })?;

            state.clicks.spawn(link_id, client.0);

            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
        Resolution::PasswordRequired {
            short_code,
            display_name,
        } => {
            let error = credential
                .filter(|c| !c.is_empty())
                .map(|_| "Incorrect password".to_string());
            let body = ApiResponse {
                data: Some(PasswordRequiredResponse {
                    short_code,
                    display_name,
                    password_required: true,
                }),
                error,
            };
            Ok((StatusCode::UNAUTHORIZED, Json(body)).into_response())
        }
        Resolution::NotFound => Err(ApiError::not_found(LINK_NOT_FOUND)),
    }
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Path((username, code)): Path<(String, String)>,
    Query(params): Query<CredentialParams>,
    client: ClientInfo,
) -> Result<Response, ApiError> {
    respond(&state, &username, &code, params.password.as_deref(), client)
}

pub async fn password_check(
    State(state): State<Arc<AppState>>,
    Path((username, code)): Path<(String, String)>,
    client: ClientInfo,
    Form(form): Form<CredentialParams>,
) -> Result<Response, ApiError> {
    respond(&state, &username, &code, form.password.as_deref(), client)
}
