// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Favorites: stored synthesis profiles with CRUD, export and import.
//!
//! When `auth.favorites_token` is configured, every favorites route
//! requires `Authorization: Bearer <token>`.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use voxhub_core::favorites::{FavoriteInput, FavoriteProfile, ImportMode};
use voxhub_core::HubError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Enforce the optional bearer token.
fn check_auth(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.config.auth.favorites_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError(HubError::Unauthorized("missing or invalid bearer token".to_string())))
    }
}

/// `GET /favorites`
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FavoriteProfile>>> {
    check_auth(&state, &headers)?;
    Ok(Json(state.favorites.list()))
}

/// `POST /favorites`
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<FavoriteInput>,
) -> ApiResult<impl IntoResponse> {
    check_auth(&state, &headers)?;
    let profile = state.favorites.create(input)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// `GET /favorites/{id}`
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<FavoriteProfile>> {
    check_auth(&state, &headers)?;
    state
        .favorites
        .find(&id)
        .map(Json)
        .ok_or_else(|| ApiError(HubError::NotFound(format!("favorite '{id}' not found"))))
}

/// `PATCH /favorites/{id}`
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<FavoriteInput>,
) -> ApiResult<Json<FavoriteProfile>> {
    check_auth(&state, &headers)?;
    Ok(Json(state.favorites.update(&id, patch)?))
}

/// `DELETE /favorites/{id}`
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    check_auth(&state, &headers)?;
    state.favorites.delete(&id)?;
    Ok(Json(serde_json::json!({"deleted": id})))
}

/// `GET /favorites/export`
pub async fn export(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    check_auth(&state, &headers)?;
    Ok(Json(state.favorites.export()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub mode: Option<ImportMode>,
}

/// `POST /favorites/import?mode=merge|replace`
pub async fn import(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ImportQuery>,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    check_auth(&state, &headers)?;
    let mode = query.mode.unwrap_or_default();
    let imported = state.favorites.import(&payload, mode)?;
    Ok(Json(serde_json::json!({"imported": imported})))
}
