// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The synthesis dispatcher: favorite expansion, availability gating,
//! `prepare` -> `synthesize` -> output normalization.

use crate::registry::{EngineRegistry, PrepareContext};
use std::path::PathBuf;
use std::sync::Arc;
use voxhub_core::favorites::FavoritesStore;
use voxhub_core::types::{RawSynthRequest, SynthResult};
use voxhub_core::{HubError, Result};

/// Per-call dispatch options.
#[derive(Debug, Default)]
pub struct DispatchOptions {
    /// Additional whitelisted roots for client-supplied voice paths
    /// (the media pipeline passes the active job directory).
    pub extra_voice_roots: Vec<PathBuf>,
}

pub struct Dispatcher {
    registry: Arc<EngineRegistry>,
    favorites: Arc<FavoritesStore>,
    output_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<EngineRegistry>,
        favorites: Arc<FavoritesStore>,
        output_dir: PathBuf,
    ) -> Self {
        Self { registry, favorites, output_dir }
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    /// Fill missing request fields from a stored favorite when the request
    /// references one by id or slug.
    ///
    /// # Errors
    ///
    /// `not_found` when the referenced favorite does not exist.
    fn expand_favorite(&self, mut raw: RawSynthRequest) -> Result<RawSynthRequest> {
        let Some(key) = raw.favorite.take() else {
            return Ok(raw);
        };
        let profile = self
            .favorites
            .find(&key)
            .ok_or_else(|| HubError::NotFound(format!("favorite '{key}' not found")))?;

        if raw.engine.is_none() {
            raw.engine = Some(profile.engine.clone());
        }
        if raw.voice.is_none() {
            raw.voice = Some(profile.voice_id.clone());
        }
        if raw.language.is_none() {
            raw.language = profile.language.clone();
        }
        if raw.speed.is_none() {
            raw.speed = profile.speed.map(|s| serde_json::json!(s));
        }
        if raw.trim_silence.is_none() {
            raw.trim_silence = profile.trim_silence;
        }
        if let Some(style) = &profile.style {
            raw.extra
                .entry("style".to_string())
                .or_insert_with(|| serde_json::json!(style));
        }
        if let Some(seed) = profile.seed {
            raw.extra
                .entry("seed".to_string())
                .or_insert_with(|| serde_json::json!(seed));
        }
        tracing::debug!(favorite = %profile.slug, engine = %profile.engine, "expanded favorite profile");
        Ok(raw)
    }

    /// Run the full dispatch pipeline and return the materialized result.
    pub async fn synthesize(
        &self,
        raw: RawSynthRequest,
        opts: DispatchOptions,
    ) -> Result<SynthResult> {
        let raw = self.expand_favorite(raw)?;
        let engine = self.registry.get(raw.engine.as_deref())?;
        let id = engine.descriptor().id.clone();

        if !engine.available().await {
            return Err(HubError::EngineUnavailable(format!(
                "TTS engine '{id}' is not available"
            )));
        }

        let ctx = PrepareContext { extra_voice_roots: opts.extra_voice_roots };
        let request = engine.prepare(raw, &ctx).await?;
        let mut result = engine.synthesize(&request).await?;

        if result.engine.is_empty() {
            result.engine = id.clone();
        }

        let artifact = self.output_dir.join(&result.filename);
        if !artifact.is_file() {
            return Err(HubError::EngineFailure(format!(
                "engine '{id}' reported success but produced no output artifact"
            )));
        }

        if request.trim_silence {
            self.trim_artifact(&artifact, &mut result);
        }

        tracing::info!(
            engine = %result.engine,
            voice = %result.voice,
            filename = %result.filename,
            "synthesis complete"
        );
        Ok(result)
    }

    /// Post-pass silence trim on the materialized file. A failed trim keeps
    /// the untrimmed artifact rather than failing the request.
    fn trim_artifact(&self, path: &std::path::Path, result: &mut SynthResult) {
        let trimmed = voxhub_audio::load_mono(path, None).and_then(|(samples, rate)| {
            let trimmed = voxhub_audio::trim_silence(&samples, rate, 40.0, 20, 50);
            voxhub_audio::save_wav(path, &trimmed, rate)?;
            Ok((trimmed.len(), rate))
        });
        match trimmed {
            Ok((len, rate)) if rate > 0 => {
                result.duration = Some(len as f64 / f64::from(rate));
            },
            Ok(_) => {},
            Err(e) => {
                tracing::warn!(error = %e, "silence trim failed, keeping raw synthesis output");
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::test_support::FakeEngine;
    use voxhub_core::favorites::FavoriteInput;

    fn setup() -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = EngineRegistry::new("fake");
        registry.register(Arc::new(FakeEngine::new("fake", dir.path().to_path_buf())));
        let favorites = Arc::new(FavoritesStore::new(dir.path().join("favorites.json")));
        let dispatcher =
            Dispatcher::new(Arc::new(registry), favorites, dir.path().to_path_buf());
        (dir, dispatcher)
    }

    fn raw(json: serde_json::Value) -> RawSynthRequest {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn dispatch_materializes_artifact() {
        let (dir, dispatcher) = setup();
        let result = dispatcher
            .synthesize(
                raw(serde_json::json!({"text": "hello", "voice": "v1"})),
                DispatchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.engine, "fake");
        assert!(dir.path().join(&result.filename).is_file());
        assert!(result.path.starts_with("/audio/"));
    }

    #[tokio::test]
    async fn unavailable_engine_maps_to_503() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = FakeEngine::new("fake", dir.path().to_path_buf());
        engine.available = false;
        let mut registry = EngineRegistry::new("fake");
        registry.register(Arc::new(engine));
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::new(FavoritesStore::new(dir.path().join("f.json"))),
            dir.path().to_path_buf(),
        );
        let err = dispatcher
            .synthesize(
                raw(serde_json::json!({"text": "hello", "voice": "v1"})),
                DispatchOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "engine_unavailable");
    }

    #[tokio::test]
    async fn favorite_expansion_fills_missing_fields() {
        let (_dir, dispatcher) = setup();
        let profile = dispatcher
            .favorites
            .create(FavoriteInput {
                label: Some("My Voice".to_string()),
                engine: Some("fake".to_string()),
                voice_id: Some("v2".to_string()),
                speed: Some(1.5),
                ..FavoriteInput::default()
            })
            .unwrap();

        let result = dispatcher
            .synthesize(
                raw(serde_json::json!({"text": "hello", "favorite": profile.slug})),
                DispatchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.voice, "v2");
        assert_eq!(result.speed, Some(1.5));
    }

    #[tokio::test]
    async fn missing_favorite_is_not_found() {
        let (_dir, dispatcher) = setup();
        let err = dispatcher
            .synthesize(
                raw(serde_json::json!({"text": "hello", "favorite": "ghost"})),
                DispatchOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
