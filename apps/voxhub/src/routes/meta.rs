// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Capability snapshot, liveness and sample-text endpoints.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::random_text;
use crate::routes::proxy::list_ollama_models;
use crate::state::AppState;

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /meta`: the capability snapshot the SPA boots from.
pub async fn meta(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let engines = state.registry.meta().await;
    let default_engine = state.registry.default_engine().to_string();

    // The bundled bank drives the landing page voice picker; other
    // engines are fetched on demand.
    let mut accent_groups = serde_json::Value::Array(Vec::new());
    let mut voice_count = 0;
    if let Ok(engine) = state.registry.get(Some("kokoro")) {
        if engine.available().await {
            if let Ok(payload) = engine.voices().await {
                accent_groups =
                    serde_json::to_value(&payload.accent_groups).unwrap_or_default();
                voice_count = payload.count;
            }
        }
    }

    let ollama = list_ollama_models(&state).await;
    let bundle_index = state.config.paths.frontend_dist.join("index.html");

    Ok(Json(serde_json::json!({
        "api_prefix": state.config.api_prefix(),
        "address": state.config.server.address,
        "engines": engines,
        "default_engine": default_engine,
        "random_categories": random_text::CATEGORIES,
        "accent_groups": accent_groups,
        "voice_count": voice_count,
        "frontend_bundle": {
            "path": state.config.paths.frontend_dist.to_string_lossy(),
            "available": bundle_index.is_file(),
        },
        "ollama_available": !ollama.models.is_empty(),
        "whisperx_available": state.jobs.stt_available(),
        "urls": {
            "ollama": state.config.upstreams.ollama_url,
            "drawthings": state.config.upstreams.drawthings_url,
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct RandomTextQuery {
    pub category: Option<String>,
}

/// `GET /random_text?category=`: LLM-generated when the upstream answers,
/// local snippet otherwise.
pub async fn random_text(
    State(state): State<AppState>,
    Query(query): Query<RandomTextQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let category = random_text::normalize_category(query.category.as_deref());

    let generated = random_text::generate_via_ollama(
        &state.http,
        &state.config.upstreams.ollama_url,
        &state.config.upstreams.ollama_model,
        category,
    )
    .await;

    let (text, source) = match generated {
        Some(text) => (text, "ollama"),
        None => (random_text::local_snippet(category), "local"),
    };

    Ok(Json(serde_json::json!({
        "text": text,
        "source": source,
        "category": category,
        "categories": random_text::CATEGORIES,
    })))
}
