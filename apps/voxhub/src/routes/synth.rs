// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Synthesis and audition endpoints.

use axum::extract::State;
use axum::Json;
use voxhub_core::types::RawSynthRequest;
use voxhub_engines::audition::{run_audition, AuditionRequest, AuditionResult};
use voxhub_engines::DispatchOptions;

use crate::error::ApiResult;
use crate::state::AppState;

/// `POST /synthesise` (alias `/synthesize`).
pub async fn synthesise(
    State(state): State<AppState>,
    Json(raw): Json<RawSynthRequest>,
) -> ApiResult<Json<voxhub_core::types::SynthResult>> {
    let result = state.dispatcher.synthesize(raw, DispatchOptions::default()).await?;
    state.maybe_cleanup();
    Ok(Json(result))
}

/// `POST /audition`: several voices over the same text, optionally with
/// announcer interstitials.
pub async fn audition(
    State(state): State<AppState>,
    Json(request): Json<AuditionRequest>,
) -> ApiResult<Json<AuditionResult>> {
    let result = run_audition(&state.dispatcher, request).await?;
    state.maybe_cleanup();
    Ok(Json(result))
}
