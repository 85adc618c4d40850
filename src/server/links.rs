use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::links::{LinkService, LinkUpdate};
use crate::server::AppState;
use crate::server::dto::{
    BulkDeleteRequest, BulkDeleteResponse, BulkToggleRequest, BulkToggleResponse,
    CreateLinkRequest, HistoryParams, LinkResponse, ListLinksParams, UpdateLinkRequest,
    UpdateUrlRequest,
};
use crate::server::response::{ApiError, ApiResponse, LINK_NOT_FOUND, StoreOptionExt, StoreResultExt};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

fn service(state: &AppState) -> LinkService<'_> {
    LinkService::new(state.store.as_ref(), &state.config.links, &state.hasher)
}

pub async fn create_link(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateLinkRequest>,
) -> impl IntoResponse {
    let link = service(&state).create(&auth.user, req.into())?;
    let base_url = state.base_url(&headers);

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(LinkResponse::new(link, &base_url))),
    ))
}

/// Repoints a link at a new destination. The short code stays the same.
pub async fn update_url(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UpdateUrlRequest>,
) -> impl IntoResponse {
    let update = LinkUpdate {
        original_url: Some(req.new_url),
        ..LinkUpdate::default()
    };
    let link = service(&state).update(&auth.user, req.link_id, update)?;
    let base_url = state.base_url(&headers);

    Ok::<_, ApiError>(Json(ApiResponse::success(LinkResponse::new(link, &base_url))))
}

pub async fn toggle_status(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let link = service(&state).toggle(&auth.user, id)?;
    let base_url = state.base_url(&headers);

    Ok::<_, ApiError>(Json(ApiResponse::success(LinkResponse::new(link, &base_url))))
}

pub async fn delete_link(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    service(&state).delete(&auth.user, id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn bulk_toggle_status(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkToggleRequest>,
) -> impl IntoResponse {
    if req.link_ids.is_empty() {
        return Err(ApiError::bad_request("No links selected"));
    }

    let updated_count = service(&state).bulk_set_active(&auth.user, &req.link_ids, req.is_active)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(BulkToggleResponse { updated_count })))
}

pub async fn bulk_delete(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkDeleteRequest>,
) -> impl IntoResponse {
    if req.link_ids.is_empty() {
        return Err(ApiError::bad_request("No links selected"));
    }

    let deleted_count = service(&state).bulk_delete(&auth.user, &req.link_ids)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(BulkDeleteResponse { deleted_count })))
}

pub async fn history(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let clicks = state
        .store
        .list_recent_clicks(auth.user.id, limit)
        .api_err("Failed to load click history")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(clicks)))
}

pub async fn list_links(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListLinksParams>,
) -> impl IntoResponse {
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let links = state
        .store
        .list_links(auth.user.id, search)
        .api_err("Failed to list links")?;

    let base_url = state.base_url(&headers);
    let links: Vec<LinkResponse> = links
        .into_iter()
        .map(|link| LinkResponse::new(link, &base_url))
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(links)))
}

pub async fn get_link(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let link = service(&state).get(&auth.user, id)?;
    let base_url = state.base_url(&headers);

    Ok::<_, ApiError>(Json(ApiResponse::success(LinkResponse::new(link, &base_url))))
}

pub async fn update_link(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateLinkRequest>,
) -> impl IntoResponse {
    let link = service(&state).update(&auth.user, id, req.into())?;
    let base_url = state.base_url(&headers);

    Ok::<_, ApiError>(Json(ApiResponse::success(LinkResponse::new(link, &base_url))))
}

pub async fn list_link_clicks(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let link = state
        .store
        .get_link_for_owner(auth.user.id, id)
        .api_err("Failed to get link")?
        .or_not_found(LINK_NOT_FOUND)?;

    let clicks = state
        .store
        .list_link_clicks(link.id)
        .api_err("Failed to list clicks")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(clicks)))
}

pub async fn stats(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = service(&state).stats(&auth.user)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(stats)))
}
