use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};

use crate::auth::RequireUser;
use crate::qr::{ArchiveEntry, QrSize, qr_filename, render_archive, render_png};
use crate::server::AppState;
use crate::server::dto::BulkQrRequest;
use crate::server::response::{ApiError, LINK_NOT_FOUND, StoreOptionExt, StoreResultExt};
use crate::types::Link;

fn load_link(state: &AppState, owner_id: i64, id: i64) -> Result<Link, ApiError> {
    state
        .store
        .get_link_for_owner(owner_id, id)
        .api_err("Failed to get link")?
        .or_not_found(LINK_NOT_FOUND)
}

/// `Content-Disposition` with an ASCII `filename` and an RFC 5987 `filename*`.
fn attachment_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn file_response(content_type: &'static str, body: Vec<u8>, disposition: Option<String>) -> Response {
    let mut response = ([(header::CONTENT_TYPE, content_type)], body).into_response();
    if let Some(value) = disposition.and_then(|d| HeaderValue::from_str(&d).ok()) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

pub async fn qr_image(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let link = load_link(&state, auth.user.id, id)?;
    let short_url = format!("{}/{}", state.base_url(&headers), link.short_code);

    let png = render_png(&short_url, QrSize::Small)?;
    Ok(file_response("image/png", png, None))
}

pub async fn download_qr(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let link = load_link(&state, auth.user.id, id)?;
    let short_url = format!("{}/{}", state.base_url(&headers), link.short_code);

    let png = render_png(&short_url, QrSize::Large)?;
    let disposition = attachment_disposition(&qr_filename(&link.display_name));

    Ok(file_response("image/png", png, Some(disposition)))
}

/// Zips one large QR code per selected link. Links the caller does not own are skipped.
pub async fn bulk_qr_download(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BulkQrRequest>,
) -> Result<Response, ApiError> {
    if req.link_ids.is_empty() {
        return Err(ApiError::bad_request("No links selected"));
    }

    let links: Vec<Link> = state
        .store
        .list_links(auth.user.id, None)
        .api_err("Failed to list links")?
        .into_iter()
        .filter(|link| req.link_ids.contains(&link.id))
        .collect();

    if links.is_empty() {
        return Err(ApiError::not_found(LINK_NOT_FOUND));
    }

    let base_url = state.base_url(&headers);
    let entries: Vec<ArchiveEntry> = links
        .iter()
        .map(|link| ArchiveEntry {
            filename: qr_filename(&link.display_name),
            data: format!("{base_url}/{}", link.short_code),
        })
        .collect();

    let archive = render_archive(&entries)?;
    let filename = format!("linkforge_qr_codes_{}.zip", auth.user.username);

    tracing::info!(
        "User {} downloaded {} QR codes",
        auth.user.username,
        entries.len()
    );

    Ok(file_response(
        "application/zip",
        archive,
        Some(attachment_disposition(&filename)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_disposition_ascii() {
        assert_eq!(
            attachment_disposition("My_Link_qr_code.png"),
            "attachment; filename=\"My_Link_qr_code.png\"; filename*=UTF-8''My_Link_qr_code.png"
        );
    }

    #[test]
    fn test_attachment_disposition_non_ascii() {
        let value = attachment_disposition("café_qr_code.png");
        assert_eq!(
            value,
            "attachment; filename=\"caf__qr_code.png\"; filename*=UTF-8''caf%C3%A9_qr_code.png"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
