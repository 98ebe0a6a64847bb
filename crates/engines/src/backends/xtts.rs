// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The voice-cloning backend, fronted by a remote XTTS server.
//!
//! The engine owns a directory of reference clips (the "voice directory");
//! a request's voice resolves to one of them by id, or to a client-supplied
//! path that must stay inside the voice directory or one of the extra
//! whitelisted roots (the active media job directory). Synthesis is a JSON
//! POST to the configured server; the returned audio URL is downloaded and
//! rewritten into the local output namespace.

use crate::catalog::{self, CatalogCache};
use crate::registry::{
    EngineDefaults, EngineDescriptor, EngineSupports, PrepareContext, SynthEngine,
};
use crate::request;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use voxhub_core::paths::resolve_within_any;
use voxhub_core::types::{
    artifact_filename, CatalogPayload, RawSynthRequest, SynthRequest, SynthResult,
};
use voxhub_core::{HubError, Result};

/// Languages the cloning model accepts (ISO-639-1, `zh-cn` kept verbatim
/// the way the upstream server spells it).
const CLONE_LANGUAGES: &[&str] = &[
    "en", "es", "fr", "de", "it", "pt", "pl", "tr", "ru", "nl", "cs", "ar", "zh-cn", "hu", "ko",
    "ja", "hi",
];

/// Configuration for the cloning backend.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct XttsSettings {
    /// Base URL of the XTTS server, e.g. `http://127.0.0.1:8020`.
    pub server_url: Option<String>,
    /// Directory of reference clips (with optional `.meta.json` sidecars).
    pub voices_dir: PathBuf,
    /// Per-request wall-clock budget in seconds.
    pub timeout_secs: u64,
}

impl Default for XttsSettings {
    fn default() -> Self {
        Self { server_url: None, voices_dir: PathBuf::from("voices/xtts"), timeout_secs: 300 }
    }
}

pub struct XttsEngine {
    settings: XttsSettings,
    output_dir: PathBuf,
    descriptor: EngineDescriptor,
    catalog: CatalogCache,
    client: reqwest::Client,
}

impl XttsEngine {
    pub fn new(settings: XttsSettings, output_dir: PathBuf) -> Self {
        let descriptor = EngineDescriptor {
            id: "xtts".to_string(),
            label: "XTTS v2".to_string(),
            description: "Coqui XTTS voice cloning against local reference clips.".to_string(),
            requires_voice: true,
            supports: EngineSupports { cloning: true, ..EngineSupports::default() },
            defaults: EngineDefaults { voice: None, language: Some("en".to_string()) },
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { settings, output_dir, descriptor, catalog: CatalogCache::default(), client }
    }

    pub fn voices_dir(&self) -> &Path {
        &self.settings.voices_dir
    }

    fn server_url(&self) -> Result<String> {
        self.settings
            .server_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                HubError::EngineUnavailable("no XTTS server URL is configured".to_string())
            })
    }

    fn catalog_snapshot(&self) -> Result<std::sync::Arc<CatalogPayload>> {
        let fingerprint = CatalogCache::fingerprint(&self.settings.voices_dir);
        self.catalog.get_or_rebuild(fingerprint, || {
            Ok(catalog::payload_from(catalog::reference_profiles(
                &self.settings.voices_dir,
                |_| None,
            )))
        })
    }

    /// Resolve a voice value to a reference clip path. Ids and slugs hit
    /// the catalog; anything path-shaped must land inside the voice
    /// directory or one of the per-request extra roots.
    fn resolve_reference(&self, voice: &str, ctx: &PrepareContext) -> Result<PathBuf> {
        let snapshot = self.catalog_snapshot()?;
        if let Some(profile) = snapshot.voices.iter().find(|v| v.id == voice) {
            if let Some(path) = profile.raw.get("referencePath").and_then(Value::as_str) {
                return Ok(PathBuf::from(path));
            }
        }

        let mut roots: Vec<&Path> = vec![&self.settings.voices_dir];
        roots.extend(ctx.extra_voice_roots.iter().map(PathBuf::as_path));
        let resolved = resolve_within_any(&roots, Path::new(voice))?;
        if resolved.is_file() {
            Ok(resolved)
        } else {
            Err(HubError::BadRequest(format!("reference clip '{voice}' does not exist")))
        }
    }

    /// Pull a useful message out of the upstream's error body. Two shapes
    /// are known; anything else falls back to trimmed text.
    fn upstream_message(body: &str) -> String {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            if let Some(message) = value.get("error").and_then(Value::as_str) {
                return message.to_string();
            }
            if value.get("success").and_then(Value::as_bool) == Some(false) {
                if let Some(message) = value.get("message").and_then(Value::as_str) {
                    return message.to_string();
                }
            }
        }
        voxhub_core::exec::tail(body, 300)
    }
}

#[async_trait]
impl SynthEngine for XttsEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn available(&self) -> bool {
        self.settings.server_url.is_some() && self.settings.voices_dir.is_dir()
    }

    async fn prepare(&self, raw: RawSynthRequest, ctx: &PrepareContext) -> Result<SynthRequest> {
        let text = request::require_text(&raw)?;
        let voice = request::require_voice(&raw)?;
        let reference = self.resolve_reference(&voice, ctx)?;

        let tag = request::normalize_language(raw.language.as_deref(), "en");
        let language = if CLONE_LANGUAGES.contains(&tag.as_str()) {
            tag
        } else {
            let base = request::language_base(&tag);
            // `zh` and `zh-cn` both map onto the server's `zh-cn` token.
            CLONE_LANGUAGES
                .iter()
                .find(|l| request::language_base(l) == base)
                .map(|l| (*l).to_string())
                .ok_or_else(|| {
                    HubError::BadRequest(format!("language '{tag}' is not supported for cloning"))
                })?
        };

        let speed = request::coerce_speed(raw.speed.as_ref(), 1.0, 2.0)?;
        let mut extra = raw.extra;
        extra.insert(
            "speaker_wav".to_string(),
            Value::String(reference.to_string_lossy().into_owned()),
        );

        Ok(SynthRequest {
            engine: self.descriptor.id.clone(),
            text,
            voice: Some(voice),
            language,
            speed,
            trim_silence: raw.trim_silence.unwrap_or(false),
            extra,
        })
    }

    async fn synthesize(&self, req: &SynthRequest) -> Result<SynthResult> {
        let base = self.server_url()?;
        let speaker_wav = req
            .extra
            .get("speaker_wav")
            .and_then(Value::as_str)
            .ok_or_else(|| HubError::BadRequest("request carries no reference clip".to_string()))?;

        let payload = serde_json::json!({
            "text": req.text,
            "speaker_wav": speaker_wav,
            "language": req.language,
        });
        let response = self
            .client
            .post(format!("{base}/tts_to_audio/"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HubError::Timeout("XTTS server timed out".to_string())
                } else {
                    HubError::EngineUnavailable(format!("XTTS server unreachable: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::from_upstream_status(status, Self::upstream_message(&body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| HubError::EngineFailure(format!("bad XTTS response: {e}")))?;
        let Some(audio_url) = body.get("audio_url").and_then(Value::as_str) else {
            return Err(HubError::EngineFailure(
                "XTTS response carries no audio_url".to_string(),
            ));
        };

        let absolute = if audio_url.starts_with("http://") || audio_url.starts_with("https://") {
            audio_url.to_string()
        } else {
            format!("{base}/{}", audio_url.trim_start_matches('/'))
        };
        let audio = self
            .client
            .get(&absolute)
            .send()
            .await
            .map_err(|e| HubError::EngineFailure(format!("downloading XTTS audio: {e}")))?;
        if audio.status().as_u16() != 200 {
            return Err(HubError::EngineFailure(format!(
                "downloading XTTS audio returned {}",
                audio.status()
            )));
        }
        let bytes = audio
            .bytes()
            .await
            .map_err(|e| HubError::EngineFailure(format!("reading XTTS audio: {e}")))?;

        let voice = req.voice.clone().unwrap_or_default();
        let ext = Path::new(audio_url)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav")
            .to_lowercase();
        let filename = artifact_filename(&voice, &ext);
        let output_path = self.output_dir.join(&filename);
        tokio::fs::write(&output_path, &bytes).await?;

        let (sample_rate, duration) = if ext == "wav" {
            voxhub_audio::wav_info(&output_path).unwrap_or((24_000, 0.0))
        } else {
            (24_000, 0.0)
        };

        Ok(SynthResult {
            id: filename.clone(),
            filename: filename.clone(),
            path: format!("/audio/{filename}"),
            engine: self.descriptor.id.clone(),
            voice,
            sample_rate,
            language: Some(req.language.clone()),
            speed: Some(req.speed),
            duration: (duration > 0.0).then_some(duration),
        })
    }

    async fn voices(&self) -> Result<CatalogPayload> {
        let mut payload = self.catalog_snapshot()?.as_ref().clone();
        if payload.voices.is_empty() {
            payload.message =
                Some("No reference clips found. Add WAV/MP3 files to the voice directory.".to_string());
        }
        Ok(payload)
    }
}
