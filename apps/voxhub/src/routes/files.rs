// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Artifact serving and the SPA fallback.
//!
//! `/audio/<path>` serves from the output directory plus the cloning
//! engine's reference root; `/image/drawthings/<path>` serves image
//! artifacts. Everything else falls back to the SPA bundle when one exists.

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::Path;
use voxhub_core::paths::{resolve_within, resolve_within_any};
use voxhub_core::HubError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

async fn serve_file(path: &Path) -> ApiResult<Response> {
    if !path.is_file() {
        return Err(ApiError(HubError::NotFound("artifact not found".to_string())));
    }
    let bytes = tokio::fs::read(path).await?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.as_ref().to_string())], bytes).into_response())
}

/// `GET /audio/{*path}`
///
/// Roots are tried in order and the first root holding the file wins; a
/// path escaping every root is a scope violation, not a 404.
pub async fn serve_audio(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
) -> ApiResult<Response> {
    let output_dir = state.config.paths.output_dir.as_path();
    let voices_dir = state.xtts.voices_dir();
    let candidate = Path::new(&path);
    for root in [output_dir, voices_dir] {
        if let Ok(resolved) = resolve_within(root, candidate) {
            if resolved.is_file() {
                return serve_file(&resolved).await;
            }
        }
    }
    // Distinguish "outside every root" from "inside but missing".
    resolve_within_any(&[output_dir, voices_dir], candidate)?;
    Err(ApiError(HubError::NotFound("artifact not found".to_string())))
}

/// `GET /image/drawthings/{*path}`
pub async fn serve_image(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
) -> ApiResult<Response> {
    let images_dir = state.config.paths.output_dir.join("images").join("drawthings");
    let resolved = resolve_within(&images_dir, Path::new(&path))?;
    serve_file(&resolved).await
}

/// Fallback for non-API paths: the SPA bundle when present, a liveness
/// body otherwise. API-shaped paths get the JSON 404 envelope.
pub async fn spa_fallback(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let prefix = state.config.api_prefix();

    let is_api = !prefix.is_empty()
        && (path == prefix || path.starts_with(&format!("{prefix}/")));
    if is_api || path.starts_with("audio/") || path.starts_with("image/") {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Not found", "status": 404})),
        )
            .into_response();
    }

    let dist = &state.config.paths.frontend_dist;
    if dist.join("index.html").is_file() {
        let candidate = resolve_within(dist, Path::new(path)).ok().filter(|p| p.is_file());
        let target = candidate.unwrap_or_else(|| dist.join("index.html"));
        return match serve_file(&target).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };
    }

    Json(serde_json::json!({"status": "ok"})).into_response()
}
