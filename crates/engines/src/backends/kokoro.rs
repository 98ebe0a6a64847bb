// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The bundled voice-bank backend.
//!
//! Synthesis runs through the `kokoro` CLI against local ONNX weights and a
//! voice-bank archive. The catalog is derived entirely from the archive's
//! entry names; see [`crate::catalog`] for the taxonomy rules.

use crate::catalog::{self, CatalogCache};
use crate::registry::{
    EngineDefaults, EngineDescriptor, EngineSupports, PrepareContext, SynthEngine,
};
use crate::request;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use voxhub_core::exec::{find_tool, run_checked, ExecSpec};
use voxhub_core::types::{
    artifact_filename, CatalogPayload, RawSynthRequest, SynthRequest, SynthResult,
};
use voxhub_core::{HubError, Result};

/// Language tags the bank carries voices for.
const BANK_LANGUAGES: &[&str] =
    &["en-us", "en-gb", "es-es", "fr-fr", "hi-in", "it-it", "ja-jp", "pt-br", "zh-cn"];

const DEFAULT_VOICE: &str = "af_heart";
const MAX_SPEED: f64 = 3.0;

/// Configuration for the bundled bank backend.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct KokoroSettings {
    /// CLI binary, discovered on PATH.
    pub binary: String,
    /// ONNX model weights.
    pub model_path: PathBuf,
    /// Voice-bank archive whose entries are the voice ids.
    pub voices_path: PathBuf,
    /// Per-invocation wall-clock budget in seconds.
    pub timeout_secs: u64,
}

impl Default for KokoroSettings {
    fn default() -> Self {
        Self {
            binary: "kokoro".to_string(),
            model_path: PathBuf::from("models/kokoro-v1.0.onnx"),
            voices_path: PathBuf::from("models/voices-v1.0.bin"),
            timeout_secs: 120,
        }
    }
}

pub struct KokoroEngine {
    settings: KokoroSettings,
    output_dir: PathBuf,
    descriptor: EngineDescriptor,
    catalog: CatalogCache,
}

impl KokoroEngine {
    pub fn new(settings: KokoroSettings, output_dir: PathBuf) -> Self {
        let descriptor = EngineDescriptor {
            id: "kokoro".to_string(),
            label: "Kokoro (ONNX)".to_string(),
            description: "Bundled Kokoro voices running locally via ONNX.".to_string(),
            requires_voice: true,
            supports: EngineSupports { audition: true, ..EngineSupports::default() },
            defaults: EngineDefaults {
                voice: Some(DEFAULT_VOICE.to_string()),
                language: Some("en-us".to_string()),
            },
        };
        Self { settings, output_dir, descriptor, catalog: CatalogCache::default() }
    }

    fn build_catalog(&self) -> Result<CatalogPayload> {
        let ids = catalog::bank_entries(&self.settings.voices_path)?;
        let voices = ids.iter().map(|id| catalog::bank_profile(id)).collect();
        Ok(catalog::payload_from(voices))
    }

    fn catalog_snapshot(&self) -> Result<std::sync::Arc<CatalogPayload>> {
        let fingerprint = CatalogCache::fingerprint(&self.settings.voices_path);
        self.catalog.get_or_rebuild(fingerprint, || self.build_catalog())
    }

    /// A bank language tag for a request tag: exact match first, then any
    /// bank tag sharing the base subtag.
    fn resolve_language(&self, tag: &str) -> Result<String> {
        if BANK_LANGUAGES.contains(&tag) {
            return Ok(tag.to_string());
        }
        let base = request::language_base(tag);
        BANK_LANGUAGES
            .iter()
            .find(|candidate| request::language_base(candidate) == base)
            .map(|s| (*s).to_string())
            .ok_or_else(|| {
                HubError::BadRequest(format!(
                    "language '{tag}' is not in the voice bank (supported: {})",
                    BANK_LANGUAGES.join(", ")
                ))
            })
    }
}

#[async_trait]
impl SynthEngine for KokoroEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn available(&self) -> bool {
        find_tool(&self.settings.binary).is_some()
            && self.settings.model_path.is_file()
            && self.settings.voices_path.is_file()
    }

    async fn prepare(&self, raw: RawSynthRequest, _ctx: &PrepareContext) -> Result<SynthRequest> {
        let text = request::require_text(&raw)?;
        let voice = request::require_voice(&raw)?;

        let snapshot = self.catalog_snapshot()?;
        if !snapshot.voices.iter().any(|v| v.id == voice) {
            return Err(HubError::BadRequest(format!("unknown voice id '{voice}'")));
        }

        let language =
            self.resolve_language(&request::normalize_language(raw.language.as_deref(), "en-us"))?;
        let speed = request::coerce_speed(raw.speed.as_ref(), 1.0, MAX_SPEED)?;

        Ok(SynthRequest {
            engine: self.descriptor.id.clone(),
            text,
            voice: Some(voice),
            language,
            speed,
            trim_silence: raw.trim_silence.unwrap_or(true),
            extra: raw.extra,
        })
    }

    async fn synthesize(&self, req: &SynthRequest) -> Result<SynthResult> {
        let Some(binary) = find_tool(&self.settings.binary) else {
            return Err(HubError::EngineUnavailable(format!(
                "'{}' not found on PATH",
                self.settings.binary
            )));
        };
        let voice = req.voice.clone().unwrap_or_else(|| DEFAULT_VOICE.to_string());
        let filename = artifact_filename(&voice, "wav");
        let output_path = self.output_dir.join(&filename);

        let spec = ExecSpec::new(binary)
            .arg("--model")
            .arg(self.settings.model_path.to_string_lossy())
            .arg("--voices")
            .arg(self.settings.voices_path.to_string_lossy())
            .arg("--voice")
            .arg(voice.as_str())
            .arg("--lang")
            .arg(req.language.as_str())
            .arg("--speed")
            .arg(format!("{:.2}", req.speed))
            .arg("--output")
            .arg(output_path.to_string_lossy())
            .stdin(req.text.clone().into_bytes())
            .timeout(Duration::from_secs(self.settings.timeout_secs));

        run_checked(spec).await?;

        if !output_path.is_file() {
            return Err(HubError::EngineFailure(
                "kokoro exited cleanly but wrote no audio".to_string(),
            ));
        }
        let (sample_rate, duration) = voxhub_audio::wav_info(&output_path)?;

        Ok(SynthResult {
            id: filename.clone(),
            filename: filename.clone(),
            path: format!("/audio/{filename}"),
            engine: self.descriptor.id.clone(),
            voice,
            sample_rate,
            language: Some(req.language.clone()),
            speed: Some(req.speed),
            duration: Some(duration),
        })
    }

    async fn voices(&self) -> Result<CatalogPayload> {
        Ok(self.catalog_snapshot()?.as_ref().clone())
    }
}
