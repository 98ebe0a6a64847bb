// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Multi-voice auditions: the same text rendered by several voices,
//! concatenated with gaps and optional announcer interstitials.

use crate::dispatcher::{DispatchOptions, Dispatcher};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use voxhub_core::types::{artifact_filename, RawSynthRequest};
use voxhub_core::{HubError, Result};

/// Announcer configuration carried inside an audition request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncerConfig {
    #[serde(default)]
    pub enabled: bool,
    pub voice: Option<String>,
    pub template: Option<String>,
    pub speed: Option<f64>,
    #[serde(default, alias = "gap_seconds")]
    pub gap_seconds: Option<f64>,
}

/// An audition request: shared text and parameters plus the voice list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditionRequest {
    pub engine: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub voices: Vec<String>,
    pub language: Option<String>,
    pub speed: Option<Value>,
    #[serde(default, alias = "trim_silence")]
    pub trim_silence: Option<bool>,
    #[serde(default, alias = "gap_seconds")]
    pub gap_seconds: Option<f64>,
    #[serde(default)]
    pub announcer: AnnouncerConfig,
}

/// The audition result mirrors a synthesis result plus the voice list.
#[derive(Debug, Clone, Serialize)]
pub struct AuditionResult {
    pub id: String,
    pub filename: String,
    pub path: String,
    pub engine: String,
    pub voice: String,
    pub voices: Vec<String>,
    pub sample_rate: u32,
    pub announcer: AnnouncerEcho,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnouncerEcho {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

const DEFAULT_ANNOUNCER_TEMPLATE: &str = "Now auditioning {voice_label}";
const DEFAULT_GAP_SECONDS: f64 = 1.0;
const DEFAULT_ANNOUNCER_GAP_SECONDS: f64 = 0.5;

/// Render the announcer line for one voice.
fn announcer_text(template: &str, voice_id: &str, voice_label: &str) -> String {
    template
        .replace("{voice_label}", voice_label)
        .replace("{voice}", voice_id)
}

/// Run a full audition through the dispatcher.
///
/// Every clip is synthesized through the normal engine path and loaded
/// back; a sample-rate mismatch between any two clips is an
/// `engine_failure` since the segments cannot be concatenated losslessly.
pub async fn run_audition(
    dispatcher: &Dispatcher,
    request: AuditionRequest,
) -> Result<AuditionResult> {
    let engine = dispatcher.registry().get(request.engine.as_deref())?;
    let descriptor = engine.descriptor();
    if !descriptor.supports.audition {
        return Err(HubError::BadRequest(format!(
            "auditions are not supported for engine '{}'",
            descriptor.id
        )));
    }
    let engine_id = descriptor.id.clone();

    let text = request
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| HubError::BadRequest("field 'text' is required".to_string()))?
        .to_string();
    if request.voices.len() < 2 {
        return Err(HubError::BadRequest(
            "provide at least two voices to build an audition".to_string(),
        ));
    }

    let catalog = engine.voices().await?;
    for voice in &request.voices {
        if !catalog.voices.iter().any(|v| &v.id == voice) {
            return Err(HubError::BadRequest(format!("unknown voice id '{voice}'")));
        }
    }

    let gap_seconds = request.gap_seconds.unwrap_or(DEFAULT_GAP_SECONDS).max(0.0);
    let announcer = request.announcer.clone();
    let announcer_gap = announcer.gap_seconds.unwrap_or(DEFAULT_ANNOUNCER_GAP_SECONDS).max(0.0);
    let template = announcer
        .template
        .clone()
        .unwrap_or_else(|| DEFAULT_ANNOUNCER_TEMPLATE.to_string());

    let mut sample_rate: Option<u32> = None;
    let mut clips: Vec<Vec<f32>> = Vec::with_capacity(request.voices.len());

    for voice_id in &request.voices {
        let label = catalog
            .voices
            .iter()
            .find(|v| &v.id == voice_id)
            .map_or_else(|| voice_id.clone(), |v| v.label.clone());
        let mut segments: Vec<Vec<f32>> = Vec::new();

        if announcer.enabled {
            let (samples, rate) = synth_clip(
                dispatcher,
                &engine_id,
                announcer.voice.as_deref().unwrap_or(voice_id),
                &announcer_text(&template, voice_id, &label),
                &request,
                announcer.speed,
            )
            .await?;
            check_rate(&mut sample_rate, rate)?;
            segments.push(samples);
            if announcer_gap > 0.0 {
                segments.push(voxhub_audio::silence(rate, announcer_gap));
            }
        }

        let (samples, rate) =
            synth_clip(dispatcher, &engine_id, voice_id, &text, &request, None).await?;
        check_rate(&mut sample_rate, rate)?;
        segments.push(samples);
        clips.push(segments.concat());
    }

    let Some(sample_rate) = sample_rate else {
        return Err(HubError::EngineFailure("audition produced no audio".to_string()));
    };

    // Concatenate with gaps between clips (not after the last one).
    let gap = voxhub_audio::silence(sample_rate, gap_seconds);
    let mut combined: Vec<f32> = Vec::new();
    for (index, clip) in clips.iter().enumerate() {
        if index > 0 {
            combined.extend_from_slice(&gap);
        }
        combined.extend_from_slice(clip);
    }

    let filename = artifact_filename("audition", "wav");
    let output_path = dispatcher.output_dir().join(&filename);
    voxhub_audio::save_wav(&output_path, &combined, sample_rate)?;

    Ok(AuditionResult {
        id: filename.clone(),
        filename: filename.clone(),
        path: format!("/audio/{filename}"),
        engine: engine_id,
        voice: "audition".to_string(),
        voices: request.voices,
        sample_rate,
        announcer: AnnouncerEcho {
            enabled: announcer.enabled,
            voice: announcer.voice,
            template: announcer.template,
        },
    })
}

fn check_rate(expected: &mut Option<u32>, rate: u32) -> Result<()> {
    match expected {
        None => {
            *expected = Some(rate);
            Ok(())
        },
        Some(current) if *current == rate => Ok(()),
        Some(current) => Err(HubError::EngineFailure(format!(
            "sample rate mismatch between audition segments ({current} vs {rate})"
        ))),
    }
}

/// Synthesize one clip through the dispatcher and load it back as PCM.
/// Intermediate artifacts are deleted; only the combined file survives.
async fn synth_clip(
    dispatcher: &Dispatcher,
    engine_id: &str,
    voice: &str,
    text: &str,
    request: &AuditionRequest,
    speed_override: Option<f64>,
) -> Result<(Vec<f32>, u32)> {
    let raw = RawSynthRequest {
        engine: Some(engine_id.to_string()),
        text: Some(text.to_string()),
        voice: Some(voice.to_string()),
        language: request.language.clone(),
        speed: speed_override.map_or_else(|| request.speed.clone(), |s| Some(serde_json::json!(s))),
        trim_silence: request.trim_silence,
        ..RawSynthRequest::default()
    };
    let result = dispatcher.synthesize(raw, DispatchOptions::default()).await?;
    let artifact = dispatcher.output_dir().join(&result.filename);
    let loaded = voxhub_audio::load_mono(&artifact, None);
    let _ = std::fs::remove_file(&artifact);
    loaded
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::test_support::FakeEngine;
    use crate::registry::EngineRegistry;
    use std::sync::Arc;
    use voxhub_core::favorites::FavoritesStore;

    fn setup() -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = EngineRegistry::new("fake");
        registry.register(Arc::new(FakeEngine::new("fake", dir.path().to_path_buf())));
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::new(FavoritesStore::new(dir.path().join("favorites.json"))),
            dir.path().to_path_buf(),
        );
        (dir, dispatcher)
    }

    fn request(voices: &[&str], announcer: bool) -> AuditionRequest {
        serde_json::from_value(serde_json::json!({
            "engine": "fake",
            "text": "compare us",
            "voices": voices,
            "gapSeconds": 1.0,
            "announcer": {"enabled": announcer}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn audition_concatenates_clips_and_gaps() {
        let (dir, dispatcher) = setup();
        let result = run_audition(&dispatcher, request(&["v1", "v2"], false)).await.unwrap();

        let (samples, rate) =
            voxhub_audio::load_mono(&dir.path().join(&result.filename), None).unwrap();
        assert_eq!(rate, 24_000);
        // Two 1 s clips + one 1 s gap.
        assert_eq!(samples.len(), 3 * 24_000);
        assert_eq!(result.voices, vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn announcer_adds_interstitials() {
        let (dir, dispatcher) = setup();
        let result = run_audition(&dispatcher, request(&["v1", "v2"], true)).await.unwrap();
        let (samples, rate) =
            voxhub_audio::load_mono(&dir.path().join(&result.filename), None).unwrap();
        // Per voice: 1 s announcer + 0.5 s gap + 1 s clip; plus 1 s between.
        let expected = (2.5 * 2.0 + 1.0) * f64::from(rate);
        assert_eq!(samples.len(), expected as usize);
    }

    #[tokio::test]
    async fn audition_needs_two_voices() {
        let (_dir, dispatcher) = setup();
        let err = run_audition(&dispatcher, request(&["v1"], false)).await.unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[tokio::test]
    async fn unknown_voice_is_rejected() {
        let (_dir, dispatcher) = setup();
        let err = run_audition(&dispatcher, request(&["v1", "ghost"], false)).await.unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }
}
