// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Route table assembly.
//!
//! All JSON endpoints mount under `/<api_prefix>` with legacy duplicates
//! at the root; artifact serving and the SPA fallback live at the root
//! only.

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub mod custom_voice;
pub mod favorites;
pub mod files;
pub mod media;
pub mod meta;
pub mod presets;
pub mod proxy;
pub mod synth;
pub mod voices;

/// The JSON API surface (mounted twice: prefixed and legacy root).
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/meta", get(meta::meta))
        .route("/health", get(meta::health))
        .route("/random_text", get(meta::random_text))
        .route("/voices", get(voices::voices))
        .route("/voices_grouped", get(voices::voices_grouped))
        .route("/voices_catalog", get(voices::voices_catalog))
        .route("/voices/preview", post(voices::preview))
        .route("/synthesise", post(synth::synthesise))
        .route("/synthesize", post(synth::synthesise))
        .route("/audition", post(synth::audition))
        .route("/xtts/custom_voice", post(custom_voice::create))
        .route(
            "/xtts/custom_voice/{id}",
            get(custom_voice::get).patch(custom_voice::update).delete(custom_voice::delete),
        )
        .route("/chattts/presets", post(presets::create))
        .route("/ollama_models", get(proxy::ollama_models))
        .route("/ollama/delete", post(proxy::ollama_delete))
        .route("/ollama/{op}", get(proxy::ollama_get).post(proxy::ollama_post))
        .route("/drawthings/{op}", get(proxy::drawthings_get).post(proxy::drawthings_generate))
        .route("/telegram/draw", post(proxy::telegram_draw))
        .route("/media/transcribe", post(media::transcribe))
        .route("/media/align", post(media::align))
        .route("/media/align_region", post(media::align_region))
        .route("/media/replace_preview", post(media::replace_preview))
        .route("/media/apply", post(media::apply))
        .route("/media/probe", post(media::probe))
        .route("/media/estimate", post(media::estimate))
        .route("/media/stats", get(media::stats))
        .route("/favorites", get(favorites::list).post(favorites::create))
        .route("/favorites/export", get(favorites::export))
        .route("/favorites/import", post(favorites::import))
        .route(
            "/favorites/{id}",
            get(favorites::get).patch(favorites::update).delete(favorites::delete),
        )
}

/// Root router: prefixed API + legacy duplicates + artifacts + SPA
/// fallback.
pub fn root_router(state: &AppState) -> Router<AppState> {
    let api = api_router();
    let prefix = state.config.api_prefix();

    let mut router = Router::new();
    if !prefix.is_empty() {
        router = router.nest(&format!("/{prefix}"), api.clone());
    }
    router
        .merge(api)
        .route("/audio/{*path}", get(files::serve_audio))
        .route("/image/drawthings/{*path}", get(files::serve_image))
        .fallback(files::spa_fallback)
}
