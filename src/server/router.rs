use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderMap, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use super::dto::BannerResponse;
use super::response::ApiResponse;
use super::{auth, links, qr, redirect};
use crate::auth::SecretHasher;
use crate::config::ServerConfig;
use crate::links::ClickRecorder;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clicks: ClickRecorder,
    pub hasher: SecretHasher,
    pub config: ServerConfig,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clicks: ClickRecorder, config: ServerConfig) -> Self {
        Self {
            store,
            clicks,
            hasher: SecretHasher::new(),
            config,
        }
    }

    /// Base URL used to build short links. Falls back to the request's host.
    #[must_use]
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        match &self.config.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => get_host_from_headers(headers),
        }
    }
}

#[must_use]
fn get_host_from_headers(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    format!("{scheme}://{host}")
}

async fn index() -> impl IntoResponse {
    Json(ApiResponse::success(BannerResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        // Accounts
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        // Link management
        .route("/create_link", post(links::create_link))
        .route("/update_url", post(links::update_url))
        .route("/toggle_status/{id}", post(links::toggle_status))
        .route("/delete_link/{id}", post(links::delete_link))
        .route("/bulk_toggle_status", post(links::bulk_toggle_status))
        .route("/bulk_delete", post(links::bulk_delete))
        .route("/history", get(links::history))
        .route("/api/links", get(links::list_links))
        .route(
            "/api/links/{id}",
            get(links::get_link).patch(links::update_link),
        )
        .route("/api/links/{id}/clicks", get(links::list_link_clicks))
        .route("/api/stats", get(links::stats))
        // QR codes
        .route("/download_qr/{id}", get(qr::download_qr))
        .route("/qr_image/{id}", get(qr::qr_image))
        .route("/bulk_qr_download", post(qr::bulk_qr_download))
        // Public redirects
        .route(
            "/password_check/{username}/{code}",
            post(redirect::password_check),
        )
        .route("/{username}/{code}", get(redirect::resolve))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_host_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(get_host_from_headers(&headers), "http://localhost");

        headers.insert(header::HOST, HeaderValue::from_static("lf.example"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(get_host_from_headers(&headers), "https://lf.example");
    }
}
