// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Short per-voice preview clips.
//!
//! Previews live at a deterministic path under the output directory;
//! presence means valid, there is no TTL. Building one goes through the
//! dispatcher like any other synthesis, then the clip is truncated, faded
//! and peak-normalized.

use crate::dispatcher::{DispatchOptions, Dispatcher};
use std::path::{Path, PathBuf};
use voxhub_core::types::RawSynthRequest;
use voxhub_core::Result;

/// Maximum preview length in seconds.
const PREVIEW_SECS: f64 = 5.0;
/// Fade-out applied to the clip tail, in milliseconds.
const FADE_MS: u32 = 50;
/// Peak level previews are normalized to.
const TARGET_PEAK: f32 = 0.95;
/// Bumped when the post-processing recipe changes, invalidating old clips.
const VERSION: u32 = 1;

/// Neutral per-language preview sentences; English is the fallback.
const PREVIEW_TEXTS: &[(&str, &str)] = &[
    ("en", "Hi there! This is a short preview of my voice."),
    ("es", "¡Hola! Esta es una breve muestra de mi voz."),
    ("fr", "Bonjour ! Voici un court aperçu de ma voix."),
    ("de", "Hallo! Dies ist eine kurze Hörprobe meiner Stimme."),
    ("it", "Ciao! Questa è una breve anteprima della mia voce."),
    ("pt", "Olá! Esta é uma breve amostra da minha voz."),
    ("hi", "नमस्ते! यह मेरी आवाज़ की एक छोटी झलक है।"),
    ("ja", "こんにちは。これは私の声の短いプレビューです。"),
    ("zh", "你好！这是我声音的简短预览。"),
];

pub struct PreviewCache {
    previews_dir: PathBuf,
}

impl PreviewCache {
    /// `output_dir` is the artifact root; previews nest underneath it.
    pub fn new(output_dir: &Path) -> Self {
        Self { previews_dir: output_dir.join("voice_previews") }
    }

    /// The language component of a preview filename.
    fn language_key(language: &str) -> String {
        let key: String = language
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        if key.is_empty() {
            "en".to_string()
        } else {
            key
        }
    }

    /// Deterministic clip path for an (engine, voice, language) triple.
    pub fn path_for(&self, engine: &str, voice_id: &str, language: &str) -> PathBuf {
        let safe_voice: String = voice_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
            .collect();
        self.previews_dir.join(engine).join(format!(
            "{safe_voice}-{}-v{VERSION}.wav",
            Self::language_key(language)
        ))
    }

    /// Public URL for a cached clip, when it exists.
    pub fn url_for(&self, engine: &str, voice_id: &str, language: &str) -> Option<String> {
        let path = self.path_for(engine, voice_id, language);
        path.is_file().then(|| {
            format!(
                "/audio/voice_previews/{engine}/{}",
                path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
            )
        })
    }

    fn preview_text(language: &str) -> &'static str {
        let base = language.split(['-', '_']).next().unwrap_or("en").to_lowercase();
        PREVIEW_TEXTS
            .iter()
            .find(|(tag, _)| *tag == base)
            .or_else(|| PREVIEW_TEXTS.first())
            .map_or("", |(_, text)| text)
    }

    /// Return the preview path, building the clip on a miss (or when
    /// `force` is set). Idempotent: a present clip short-circuits before
    /// any synthesis happens.
    pub async fn get_or_create(
        &self,
        dispatcher: &Dispatcher,
        engine: &str,
        voice_id: &str,
        language: &str,
        force: bool,
    ) -> Result<PathBuf> {
        let target = self.path_for(engine, voice_id, language);
        if target.is_file() && !force {
            return Ok(target);
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let raw = RawSynthRequest {
            engine: Some(engine.to_string()),
            text: Some(Self::preview_text(language).to_string()),
            voice: Some(voice_id.to_string()),
            language: Some(language.to_lowercase()),
            ..RawSynthRequest::default()
        };
        let result = dispatcher.synthesize(raw, DispatchOptions::default()).await?;
        let artifact = dispatcher.output_dir().join(&result.filename);

        let (samples, rate) = voxhub_audio::load_mono(&artifact, None)?;
        let keep = ((f64::from(rate) * PREVIEW_SECS) as usize).min(samples.len());
        let mut clip = samples[..keep].to_vec();
        voxhub_audio::fade_out(&mut clip, rate, FADE_MS);
        voxhub_audio::peak_normalize(&mut clip, TARGET_PEAK);
        voxhub_audio::save_wav(&target, &clip, rate)?;

        // The full-length intermediate is only scaffolding for the clip.
        let _ = std::fs::remove_file(&artifact);

        tracing::info!(engine, voice = voice_id, path = %target.display(), "preview built");
        Ok(target)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::test_support::FakeEngine;
    use crate::registry::EngineRegistry;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use voxhub_core::favorites::FavoritesStore;

    fn setup() -> (tempfile::TempDir, Dispatcher, Arc<FakeEngine>, PreviewCache) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new("fake", dir.path().to_path_buf()));
        let mut registry = EngineRegistry::new("fake");
        registry.register(engine.clone());
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::new(FavoritesStore::new(dir.path().join("favorites.json"))),
            dir.path().to_path_buf(),
        );
        let previews = PreviewCache::new(dir.path());
        (dir, dispatcher, engine, previews)
    }

    #[tokio::test]
    async fn preview_is_idempotent() {
        let (_dir, dispatcher, engine, previews) = setup();
        let first =
            previews.get_or_create(&dispatcher, "fake", "v1", "en-us", false).await.unwrap();
        let second =
            previews.get_or_create(&dispatcher, "fake", "v1", "en-us", false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.synth_calls.load(Ordering::SeqCst), 1, "second call must not recompute");
    }

    #[tokio::test]
    async fn force_rebuilds() {
        let (_dir, dispatcher, engine, previews) = setup();
        previews.get_or_create(&dispatcher, "fake", "v1", "en-us", false).await.unwrap();
        previews.get_or_create(&dispatcher, "fake", "v1", "en-us", true).await.unwrap();
        assert_eq!(engine.synth_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn preview_is_bounded_and_normalized() {
        let (_dir, dispatcher, _engine, previews) = setup();
        let path =
            previews.get_or_create(&dispatcher, "fake", "v2", "fr", false).await.unwrap();
        let (samples, rate) = voxhub_audio::load_mono(&path, None).unwrap();
        assert!(samples.len() as f64 / f64::from(rate) <= PREVIEW_SECS + 0.01);
        let peak = voxhub_audio::peak(&samples);
        assert!(peak <= TARGET_PEAK + 0.02, "peak {peak}");
    }

    #[test]
    fn path_is_deterministic_and_safe() {
        let dir = tempfile::tempdir().unwrap();
        let previews = PreviewCache::new(dir.path());
        let a = previews.path_for("xtts", "alice/../x", "en-US");
        let b = previews.path_for("xtts", "alice/../x", "en-US");
        assert_eq!(a, b);
        assert!(a.to_string_lossy().contains("alice----x-en-us-v1.wav"));
    }

    #[test]
    fn url_only_for_existing_clips() {
        let dir = tempfile::tempdir().unwrap();
        let previews = PreviewCache::new(dir.path());
        assert!(previews.url_for("kokoro", "af_heart", "en-us").is_none());
        let path = previews.path_for("kokoro", "af_heart", "en-us");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"riff").unwrap();
        let url = previews.url_for("kokoro", "af_heart", "en-us").unwrap();
        assert_eq!(url, "/audio/voice_previews/kokoro/af_heart-en-us-v1.wav");
    }
}
