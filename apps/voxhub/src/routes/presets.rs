// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Dialogue speaker presets.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePresetRequest {
    pub label: String,
    pub speaker: String,
    #[serde(default)]
    pub seed: Option<i64>,
}

/// `POST /chattts/presets`: persist a sampled speaker for reuse.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreatePresetRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = state.chattts.save_preset(&request.label, &request.speaker, request.seed)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": id,
            "label": request.label,
            "seed": request.seed,
        })),
    ))
}
