// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The dialogue backend (ChatTTS CLI).
//!
//! The CLI writes its output into its own working directory, so discovery
//! is a filename snapshot diff with a newest-mtime fallback. Sampled
//! speaker identities are scraped from the process output so clients can
//! persist them as presets.

use crate::catalog::{self, CatalogCache, DialoguePreset};
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
use voxhub_core::exec::{find_tool, newest_match, run_checked, snapshot_names, ExecSpec};
use voxhub_core::paths::slugify;
use voxhub_core::types::{
    artifact_filename, CatalogPayload, RawSynthRequest, SynthRequest, SynthResult, VoiceProfile,
};
use voxhub_core::{HubError, Result};

/// The synthetic catalog entry for letting the model sample a speaker.
pub const RANDOM_VOICE_ID: &str = "random";

/// Configuration for the dialogue backend.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ChatTtsSettings {
    /// CLI binary, discovered on PATH.
    pub binary: String,
    /// Pinned working directory; the CLI writes its WAVs here.
    pub work_dir: PathBuf,
    /// Directory of speaker presets (`.json` structured, `.txt` raw).
    pub presets_dir: PathBuf,
    /// Per-invocation wall-clock budget in seconds.
    pub timeout_secs: u64,
}

impl Default for ChatTtsSettings {
    fn default() -> Self {
        Self {
            binary: "chattts".to_string(),
            work_dir: PathBuf::from("chattts/work"),
            presets_dir: PathBuf::from("chattts/presets"),
            timeout_secs: 300,
        }
    }
}

pub struct ChatTtsEngine {
    settings: ChatTtsSettings,
    output_dir: PathBuf,
    descriptor: EngineDescriptor,
    catalog: CatalogCache,
}

impl ChatTtsEngine {
    pub fn new(settings: ChatTtsSettings, output_dir: PathBuf) -> Self {
        let descriptor = EngineDescriptor {
            id: "chattts".to_string(),
            label: "ChatTTS".to_string(),
            description: "ChatTTS dialogue model with sampled or preset speakers.".to_string(),
            requires_voice: false,
            supports: EngineSupports { dialogue: true, ..EngineSupports::default() },
            defaults: EngineDefaults {
                voice: Some(RANDOM_VOICE_ID.to_string()),
                language: Some("en".to_string()),
            },
        };
        Self { settings, output_dir, descriptor, catalog: CatalogCache::default() }
    }

    pub fn presets_dir(&self) -> &Path {
        &self.settings.presets_dir
    }

    fn find_preset(&self, id: &str) -> Option<DialoguePreset> {
        catalog::load_presets(&self.settings.presets_dir)
            .into_iter()
            .find(|(pid, _)| pid == id)
            .map(|(_, preset)| preset)
    }

    /// Persist a new preset; returns its id.
    pub fn save_preset(&self, label: &str, speaker: &str, seed: Option<i64>) -> Result<String> {
        let label = label.trim();
        let speaker = speaker.trim();
        if label.is_empty() || speaker.is_empty() {
            return Err(HubError::BadRequest(
                "preset requires 'label' and 'speaker'".to_string(),
            ));
        }
        std::fs::create_dir_all(&self.settings.presets_dir)?;
        let id = slugify(label);
        let path = self.settings.presets_dir.join(format!("{id}.json"));
        if path.exists() {
            return Err(HubError::Conflict(format!("preset '{id}' already exists")));
        }
        let body = serde_json::json!({
            "id": id,
            "label": label,
            "speaker": speaker,
            "seed": seed,
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&body)?)?;
        Ok(id)
    }
}

/// Scrape a sampled speaker token from the CLI output.
///
/// The primary marker is a `Use speaker` line whose following line holds
/// the token; otherwise any line mentioning `speaker` with a `:`/`=`
/// separated value is scanned. The token is cut at the first whitespace and
/// trailing punctuation is stripped.
pub fn extract_speaker(stdout: &str, stderr: &str) -> Option<String> {
    let mut lines = stdout.lines();
    while let Some(line) = lines.next() {
        if line.trim().starts_with("Use speaker") {
            if let Some(next) = lines.next() {
                if let Some(token) = sanitize_speaker(next) {
                    return Some(token);
                }
            }
        }
    }
    for line in stderr.lines().chain(stdout.lines()) {
        let lowered = line.to_lowercase();
        if !lowered.contains("speaker") {
            continue;
        }
        if let Some(idx) = line.find([':', '=']) {
            if let Some(token) = sanitize_speaker(&line[idx + 1..]) {
                return Some(token);
            }
        }
    }
    None
}

/// First whitespace-delimited token with trailing punctuation stripped.
fn sanitize_speaker(raw: &str) -> Option<String> {
    let token = raw.trim().split_whitespace().next()?;
    let token = token.trim_end_matches(['.', ',', ';', ':']);
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[async_trait]
impl SynthEngine for ChatTtsEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn available(&self) -> bool {
        find_tool(&self.settings.binary).is_some()
    }

    async fn prepare(&self, raw: RawSynthRequest, _ctx: &PrepareContext) -> Result<SynthRequest> {
        let text = request::require_text(&raw)?;
        let voice = raw
            .voice
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(RANDOM_VOICE_ID)
            .to_string();

        let mut extra = raw.extra;
        if voice != RANDOM_VOICE_ID {
            let preset = self.find_preset(&voice).ok_or_else(|| {
                HubError::BadRequest(format!("unknown speaker preset '{voice}'"))
            })?;
            extra.insert("speaker".to_string(), Value::String(preset.speaker));
            if let Some(seed) = preset.seed {
                extra.entry("seed".to_string()).or_insert_with(|| serde_json::json!(seed));
            }
            if let Some(temperature) = preset.temperature {
                extra
                    .entry("temperature".to_string())
                    .or_insert_with(|| serde_json::json!(temperature));
            }
        }
        if let Some(seed) = extra.get("seed") {
            if request::coerce_i64(seed).is_none() {
                return Err(HubError::BadRequest("field 'seed' must be an integer".to_string()));
            }
        }

        Ok(SynthRequest {
            engine: self.descriptor.id.clone(),
            text,
            voice: Some(voice),
            language: request::normalize_language(raw.language.as_deref(), "en"),
            speed: request::coerce_speed(raw.speed.as_ref(), 1.0, 2.0)?,
            trim_silence: raw.trim_silence.unwrap_or(false),
            extra,
        })
    }

    async fn synthesize(&self, req: &SynthRequest) -> Result<SynthResult> {
        let Some(binary) = find_tool(&self.settings.binary) else {
            return Err(HubError::EngineUnavailable(format!(
                "'{}' not found on PATH",
                self.settings.binary
            )));
        };
        std::fs::create_dir_all(&self.settings.work_dir)?;

        let is_wav = |name: &str| name.to_lowercase().ends_with(".wav");
        let before = snapshot_names(&self.settings.work_dir, is_wav);

        let mut spec = ExecSpec::new(binary)
            .cwd(&self.settings.work_dir)
            // Inference stays deterministic on machines without CUDA and
            // survives missing MPS kernels on macOS.
            .env("CUDA_VISIBLE_DEVICES", "")
            .env("PYTORCH_ENABLE_MPS_FALLBACK", "1")
            .stdin(req.text.clone().into_bytes())
            .timeout(Duration::from_secs(self.settings.timeout_secs));
        if let Some(speaker) = req.extra.get("speaker").and_then(Value::as_str) {
            spec = spec.arg("--speaker").arg(speaker);
        }
        if let Some(seed) = req.extra.get("seed").and_then(request::coerce_i64) {
            spec = spec.arg("--seed").arg(seed.to_string());
        }
        if let Some(temperature) = req.extra.get("temperature").and_then(request::coerce_f64) {
            spec = spec.arg("--temperature").arg(format!("{temperature}"));
        }

        let output = run_checked(spec).await?;

        let after = snapshot_names(&self.settings.work_dir, is_wav);
        let fresh: Vec<&String> = after.iter().filter(|name| !before.contains(name)).collect();
        let produced = match fresh.first() {
            Some(name) => self.settings.work_dir.join(name),
            None => newest_match(&self.settings.work_dir, is_wav).ok_or_else(|| {
                HubError::EngineFailure("chattts exited cleanly but wrote no audio".to_string())
            })?,
        };

        let voice = req.voice.clone().unwrap_or_else(|| RANDOM_VOICE_ID.to_string());
        let speaker = extract_speaker(&output.stdout, &output.stderr);
        let result_voice = match (&speaker, voice.as_str()) {
            (Some(token), RANDOM_VOICE_ID) => token.clone(),
            _ => voice,
        };

        let filename = artifact_filename(&result_voice, "wav");
        let output_path = self.output_dir.join(&filename);
        std::fs::rename(&produced, &output_path)
            .or_else(|_| std::fs::copy(&produced, &output_path).map(|_| ()))?;
        // Leave no scratch behind when the rename degraded to a copy.
        let _ = std::fs::remove_file(&produced);

        let (sample_rate, duration) = voxhub_audio::wav_info(&output_path)?;
        Ok(SynthResult {
            id: filename.clone(),
            filename: filename.clone(),
            path: format!("/audio/{filename}"),
            engine: self.descriptor.id.clone(),
            voice: result_voice,
            sample_rate,
            language: Some(req.language.clone()),
            speed: Some(req.speed),
            duration: Some(duration),
        })
    }

    async fn voices(&self) -> Result<CatalogPayload> {
        let available = self.available().await;
        let fingerprint = CatalogCache::fingerprint(&self.settings.presets_dir);
        let mut payload = self
            .catalog
            .get_or_rebuild(fingerprint, || {
                let mut voices: Vec<VoiceProfile> = Vec::new();
                for (id, preset) in catalog::load_presets(&self.settings.presets_dir) {
                    let mut profile = VoiceProfile::new(
                        &id,
                        preset.label.clone().unwrap_or_else(|| id.clone()),
                    );
                    profile.notes = preset.notes.clone();
                    profile.raw = serde_json::json!({
                        "speaker": preset.speaker,
                        "seed": preset.seed,
                    });
                    voices.push(profile);
                }
                Ok(catalog::payload_from(voices))
            })?
            .as_ref()
            .clone();

        if available {
            let mut random = VoiceProfile::new(RANDOM_VOICE_ID, "Random speaker");
            random.notes = Some("Let the model sample a new speaker.".to_string());
            payload.voices.insert(0, random);
            payload.count = payload.voices.len();
        } else {
            payload.available = false;
        }
        Ok(payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn speaker_extraction_prefers_marker() {
        let stdout = "loading model\nUse speaker\nspk_abc123 saved\n";
        assert_eq!(extract_speaker(stdout, ""), Some("spk_abc123".to_string()));
    }

    #[test]
    fn speaker_extraction_falls_back_to_keyword_scan() {
        let stderr = "INFO sampled speaker: spk_xyz789.\n";
        assert_eq!(extract_speaker("", stderr), Some("spk_xyz789".to_string()));
        assert_eq!(extract_speaker("", "nothing here"), None);
    }

    #[test]
    fn sanitize_takes_first_token_and_strips_punctuation() {
        assert_eq!(sanitize_speaker("  spk_1 extra words "), Some("spk_1".to_string()));
        assert_eq!(sanitize_speaker("spk_2;"), Some("spk_2".to_string()));
        assert_eq!(sanitize_speaker("   "), None);
    }

    #[tokio::test]
    async fn prepare_requires_known_preset() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ChatTtsSettings {
            work_dir: dir.path().join("work"),
            presets_dir: dir.path().join("presets"),
            ..ChatTtsSettings::default()
        };
        std::fs::create_dir_all(&settings.presets_dir).unwrap();
        std::fs::write(settings.presets_dir.join("calm.json"),
            br#"{"label": "Calm", "speaker": "spk_c", "seed": 3}"#).unwrap();
        let engine = ChatTtsEngine::new(settings, dir.path().to_path_buf());

        let ok: RawSynthRequest =
            serde_json::from_value(serde_json::json!({"text": "hi", "voice": "calm"})).unwrap();
        let prepared = engine.prepare(ok, &PrepareContext::default()).await.unwrap();
        assert_eq!(prepared.extra.get("speaker").and_then(Value::as_str), Some("spk_c"));
        assert_eq!(prepared.extra.get("seed").and_then(Value::as_i64), Some(3));

        let missing: RawSynthRequest =
            serde_json::from_value(serde_json::json!({"text": "hi", "voice": "ghost"})).unwrap();
        assert_eq!(
            engine.prepare(missing, &PrepareContext::default()).await.unwrap_err().kind(),
            "bad_request"
        );

        // No voice at all is fine: the model samples a speaker.
        let random: RawSynthRequest =
            serde_json::from_value(serde_json::json!({"text": "hi"})).unwrap();
        let prepared = engine.prepare(random, &PrepareContext::default()).await.unwrap();
        assert_eq!(prepared.voice.as_deref(), Some(RANDOM_VOICE_ID));
    }

    #[tokio::test]
    async fn save_preset_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ChatTtsSettings {
            work_dir: dir.path().join("work"),
            presets_dir: dir.path().join("presets"),
            ..ChatTtsSettings::default()
        };
        let engine = ChatTtsEngine::new(settings, dir.path().to_path_buf());
        let id = engine.save_preset("Calm Host", "spk_1", Some(7)).unwrap();
        assert_eq!(id, "calm-host");
        let err = engine.save_preset("Calm Host", "spk_2", None).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }
}
