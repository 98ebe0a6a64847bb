// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Voice catalog endpoints and preview generation.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use voxhub_core::types::CatalogPayload;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EngineQuery {
    pub engine: Option<String>,
}

/// Fetch a catalog with preview URLs attached. Unavailable engines get an
/// empty payload instead of an error so pickers can render the state.
async fn catalog_for(state: &AppState, engine_id: Option<&str>) -> ApiResult<(String, CatalogPayload)> {
    let engine = state.registry.get(engine_id)?;
    let id = engine.descriptor().id.clone();
    if !engine.available().await {
        return Ok((id, CatalogPayload::unavailable("engine is not available")));
    }
    let default_language =
        engine.descriptor().defaults.language.clone().unwrap_or_else(|| "en-us".to_string());
    let mut payload = engine.voices().await?;
    for voice in &mut payload.voices {
        if voice.preview_url.is_none() {
            voice.preview_url = state.previews.url_for(&id, &voice.id, &default_language);
        }
    }
    Ok((id, payload))
}

/// `GET /voices?engine=`
pub async fn voices(
    State(state): State<AppState>,
    Query(query): Query<EngineQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let (engine, payload) = catalog_for(&state, query.engine.as_deref()).await?;
    Ok(Json(serde_json::json!({
        "engine": engine,
        "available": payload.available,
        "voices": payload.voices,
        "accentGroups": payload.accent_groups,
        "groups": payload.accent_groups,
        "count": payload.count,
        "message": payload.message,
    })))
}

/// `GET /voices_grouped?engine=`: groups only.
pub async fn voices_grouped(
    State(state): State<AppState>,
    Query(query): Query<EngineQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let (engine, payload) = catalog_for(&state, query.engine.as_deref()).await?;
    Ok(Json(serde_json::json!({
        "engine": engine,
        "available": payload.available,
        "accentGroups": payload.accent_groups,
        "groups": payload.accent_groups,
        "count": payload.count,
    })))
}

/// `GET /voices_catalog?engine=`: voices, filters and the engine list.
pub async fn voices_catalog(
    State(state): State<AppState>,
    Query(query): Query<EngineQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let (engine, payload) = catalog_for(&state, query.engine.as_deref()).await?;
    let engines = state.registry.meta().await;
    Ok(Json(serde_json::json!({
        "engine": engine,
        "available": payload.available,
        "voices": payload.voices,
        "accentGroups": payload.accent_groups,
        "filters": payload.filters,
        "count": payload.count,
        "engines": engines,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub engine: Option<String>,
    #[serde(alias = "voice")]
    pub voice_id: String,
    pub language: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// `POST /voices/preview`: build (or reuse) a short preview clip.
pub async fn preview(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = state.registry.get(request.engine.as_deref())?;
    let id = engine.descriptor().id.clone();
    let language = request
        .language
        .or_else(|| engine.descriptor().defaults.language.clone())
        .unwrap_or_else(|| "en-us".to_string());

    let existed = state.previews.url_for(&id, &request.voice_id, &language).is_some();
    state
        .previews
        .get_or_create(&state.dispatcher, &id, &request.voice_id, &language, request.force)
        .await?;
    let preview_url = state
        .previews
        .url_for(&id, &request.voice_id, &language)
        .unwrap_or_default();

    Ok(Json(serde_json::json!({
        "engine": id,
        "voiceId": request.voice_id,
        "preview_url": preview_url,
        "cached": existed && !request.force,
    })))
}
