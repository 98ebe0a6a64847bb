// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Transcription and forced alignment through the whisperx CLI.
//!
//! The provider shells out to `whisperx` for both jobs: plain transcription
//! (`--output_format json` into a scratch directory) and forced alignment
//! (`--align <transcript.json>`, same JSON shape back). When the binary is
//! missing and stub mode is allowed, transcription degrades to evenly
//! spaced placeholder words so the editing UI stays usable.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use voxhub_core::exec::{find_tool, run_checked, ExecSpec};
use voxhub_core::{HubError, Result};

/// One recognized word with timings in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A sentence-level segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Timing facts recorded alongside a transcription pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptStats {
    pub elapsed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtf: Option<f64>,
}

/// The persisted transcript for a media job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub language: String,
    pub duration: f64,
    pub segments: Vec<Segment>,
    pub words: Vec<Word>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TranscriptStats>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aligned: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stub: bool,
}

/// Configuration for the STT provider.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SttSettings {
    /// CLI binary, discovered on PATH.
    pub binary: String,
    /// ASR model name passed to the CLI.
    pub model: String,
    /// Compute device (`cpu`, `cuda`).
    pub device: String,
    /// Produce placeholder transcripts when the binary is missing.
    pub allow_stub: bool,
    /// Per-invocation wall-clock budget in seconds.
    pub timeout_secs: u64,
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            binary: "whisperx".to_string(),
            model: "small".to_string(),
            device: "cpu".to_string(),
            allow_stub: true,
            timeout_secs: 1800,
        }
    }
}

/// Alignment models per language base tag. English's wav2vec2 checkpoint is
/// the safe default for unlisted Latin-script languages.
const ALIGN_MODELS: &[(&str, &str)] = &[
    ("en", "WAV2VEC2_ASR_BASE_960H"),
    ("de", "VOXPOPULI_ASR_BASE_10K_DE"),
    ("es", "VOXPOPULI_ASR_BASE_10K_ES"),
    ("fr", "VOXPOPULI_ASR_BASE_10K_FR"),
    ("it", "VOXPOPULI_ASR_BASE_10K_IT"),
];

pub struct SttProvider {
    settings: SttSettings,
    /// Language base -> resolved alignment model, memoized per process.
    align_models: Mutex<HashMap<String, String>>,
    /// Resolved ASR model identity (lazy; `None` until first use).
    asr_model: Mutex<Option<String>>,
}

impl SttProvider {
    pub fn new(settings: SttSettings) -> Self {
        Self { settings, align_models: Mutex::new(HashMap::new()), asr_model: Mutex::new(None) }
    }

    pub fn available(&self) -> bool {
        find_tool(&self.settings.binary).is_some()
    }

    /// The ASR model identity, resolved once.
    fn resolve_asr_model(&self) -> String {
        let Ok(mut guard) = self.asr_model.lock() else {
            return self.settings.model.clone();
        };
        guard.get_or_insert_with(|| self.settings.model.clone()).clone()
    }

    /// Alignment model for a language, cache-first.
    pub fn resolve_align_model(&self, language: &str) -> String {
        let base = language.split(['-', '_']).next().unwrap_or("en").to_lowercase();
        if let Ok(mut cache) = self.align_models.lock() {
            if let Some(model) = cache.get(&base) {
                return model.clone();
            }
            let model = ALIGN_MODELS
                .iter()
                .find(|(tag, _)| *tag == base)
                .map_or(ALIGN_MODELS[0].1, |(_, model)| model)
                .to_string();
            cache.insert(base, model.clone());
            return model;
        }
        ALIGN_MODELS[0].1.to_string()
    }

    /// Transcribe a canonical WAV to words with timings.
    pub async fn transcribe(&self, wav: &Path) -> Result<Transcript> {
        let Some(binary) = find_tool(&self.settings.binary) else {
            if self.settings.allow_stub {
                return stub_transcript(wav);
            }
            return Err(HubError::EngineUnavailable(format!(
                "'{}' not found on PATH",
                self.settings.binary
            )));
        };

        let scratch = tempfile::tempdir_in(
            wav.parent().unwrap_or_else(|| Path::new(".")),
        )
        .map_err(|e| HubError::Io(format!("creating scratch dir: {e}")))?;

        let started = Instant::now();
        let spec = ExecSpec::new(binary)
            .arg(wav.to_string_lossy())
            .arg("--model")
            .arg(self.settings.model.as_str())
            .arg("--device")
            .arg(self.settings.device.as_str())
            .args(["--output_format", "json", "--output_dir"])
            .arg(scratch.path().to_string_lossy())
            .timeout(Duration::from_secs(self.settings.timeout_secs));
        run_checked(spec).await?;
        let elapsed = started.elapsed().as_secs_f64();

        let json_path = find_json_output(scratch.path(), wav)?;
        let raw = std::fs::read(&json_path)?;
        let mut transcript = parse_whisper_json(&raw)?;
        if transcript.duration <= 0.0 {
            transcript.duration = voxhub_audio::wav_info(wav).map(|(_, d)| d).unwrap_or(0.0);
        }
        let rtf = (elapsed > 0.0).then(|| transcript.duration / elapsed);
        transcript.stats = Some(TranscriptStats { elapsed, rtf });
        Ok(transcript)
    }

    /// Force-align `text` against a WAV region, returning words with
    /// timings relative to the start of the clip.
    pub async fn align_clip(&self, wav: &Path, text: &str, language: &str) -> Result<Vec<Word>> {
        let Some(binary) = find_tool(&self.settings.binary) else {
            return Err(HubError::EngineUnavailable(format!(
                "'{}' not found on PATH",
                self.settings.binary
            )));
        };
        let align_model = self.resolve_align_model(language);
        let _asr = self.resolve_asr_model();

        let scratch = tempfile::tempdir_in(
            wav.parent().unwrap_or_else(|| Path::new(".")),
        )
        .map_err(|e| HubError::Io(format!("creating scratch dir: {e}")))?;

        // The aligner consumes a transcript sidecar: one segment covering
        // the whole clip.
        let duration = voxhub_audio::wav_info(wav).map(|(_, d)| d).unwrap_or(0.0);
        let sidecar = scratch.path().join("align_input.json");
        let body = serde_json::json!({
            "language": language,
            "segments": [{"text": text, "start": 0.0, "end": duration}],
        });
        std::fs::write(&sidecar, serde_json::to_vec(&body)?)?;

        let spec = ExecSpec::new(binary)
            .arg(wav.to_string_lossy())
            .arg("--align")
            .arg(sidecar.to_string_lossy())
            .arg("--align_model")
            .arg(align_model)
            .arg("--language")
            .arg(language)
            .arg("--device")
            .arg(self.settings.device.as_str())
            .args(["--output_format", "json", "--output_dir"])
            .arg(scratch.path().to_string_lossy())
            .timeout(Duration::from_secs(self.settings.timeout_secs));
        run_checked(spec).await?;

        let json_path = find_json_output(scratch.path(), wav)?;
        let raw = std::fs::read(&json_path)?;
        let aligned = parse_whisper_json(&raw)?;
        Ok(aligned.words)
    }
}

/// Locate the JSON the CLI wrote: `<wav stem>.json` first, else the only
/// `.json` in the scratch dir.
fn find_json_output(scratch: &Path, wav: &Path) -> Result<PathBuf> {
    let stem = wav.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let expected = scratch.join(format!("{stem}.json"));
    if expected.is_file() {
        return Ok(expected);
    }
    let mut jsons: Vec<PathBuf> = std::fs::read_dir(scratch)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().and_then(|e| e.to_str()) == Some("json")
                        && p.file_name().and_then(|n| n.to_str()) != Some("align_input.json")
                })
                .collect()
        })
        .unwrap_or_default();
    jsons.sort();
    jsons
        .into_iter()
        .next()
        .ok_or_else(|| HubError::EngineFailure("transcriber produced no JSON output".to_string()))
}

/// Parse the whisperx JSON shape: `{language, segments: [{text, start,
/// end, words: [{word, start, end, score}]}]}`.
fn parse_whisper_json(raw: &[u8]) -> Result<Transcript> {
    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| HubError::EngineFailure(format!("unreadable transcriber output: {e}")))?;

    let language = value["language"].as_str().unwrap_or("en").to_lowercase();
    let mut segments = Vec::new();
    let mut words = Vec::new();
    let mut duration = 0.0_f64;

    for seg in value["segments"].as_array().map(Vec::as_slice).unwrap_or_default() {
        let text = seg["text"].as_str().unwrap_or("").trim().to_string();
        let start = seg["start"].as_f64().unwrap_or(0.0);
        let end = seg["end"].as_f64().unwrap_or(start);
        duration = duration.max(end);
        segments.push(Segment { text, start, end });

        for word in seg["words"].as_array().map(Vec::as_slice).unwrap_or_default() {
            let text = word["word"]
                .as_str()
                .or_else(|| word["text"].as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            if text.is_empty() {
                continue;
            }
            // Some words come back without timings (digits, punctuation);
            // they inherit the previous word's end.
            let prev_end = words.last().map_or(start, |w: &Word| w.end);
            let w_start = word["start"].as_f64().unwrap_or(prev_end);
            let w_end = word["end"].as_f64().unwrap_or(w_start);
            duration = duration.max(w_end);
            words.push(Word {
                text,
                start: w_start,
                end: w_end,
                confidence: word["score"].as_f64().or_else(|| word["confidence"].as_f64()),
            });
        }
    }
    words.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

    Ok(Transcript {
        language,
        duration,
        segments,
        words,
        stats: None,
        aligned: false,
        stub: false,
    })
}

/// Placeholder transcript: evenly spaced words over the clip duration, so
/// UI development works without the ASR stack installed.
fn stub_transcript(wav: &Path) -> Result<Transcript> {
    let (_, duration) = voxhub_audio::wav_info(wav)?;
    let word_count = ((duration / 0.4).floor() as usize).clamp(1, 200);
    let step = duration / word_count as f64;
    let words: Vec<Word> = (0..word_count)
        .map(|i| Word {
            text: format!("word{}", i + 1),
            start: i as f64 * step,
            end: (i as f64).mul_add(step, step * 0.9),
            confidence: None,
        })
        .collect();
    let text = words.iter().map(|w| w.text.clone()).collect::<Vec<_>>().join(" ");
    tracing::warn!("whisperx missing, producing stub transcript");
    Ok(Transcript {
        language: "en".to_string(),
        duration,
        segments: vec![Segment { text, start: 0.0, end: duration }],
        words,
        stats: Some(TranscriptStats { elapsed: 0.0, rtf: None }),
        aligned: false,
        stub: true,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn whisper_json_parses_words_and_segments() {
        let raw = serde_json::json!({
            "language": "EN",
            "segments": [
                {"text": " Hello world. ", "start": 0.0, "end": 2.0,
                 "words": [
                    {"word": "Hello", "start": 0.1, "end": 0.5, "score": 0.98},
                    {"word": "world.", "start": 0.6, "end": 1.1, "score": 0.95}
                 ]},
                {"text": "Again.", "start": 2.0, "end": 3.5,
                 "words": [{"word": "Again.", "start": 2.1, "end": 3.0}]}
            ]
        });
        let transcript = parse_whisper_json(&serde_json::to_vec(&raw).unwrap()).unwrap();
        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.words.len(), 3);
        assert_eq!(transcript.words[0].text, "Hello");
        assert_eq!(transcript.words[0].confidence, Some(0.98));
        assert_eq!(transcript.duration, 3.5);
        // Monotonic word order.
        for pair in transcript.words.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn timingless_words_inherit_previous_end() {
        let raw = serde_json::json!({
            "language": "en",
            "segments": [
                {"text": "one 2", "start": 0.0, "end": 1.0,
                 "words": [
                    {"word": "one", "start": 0.0, "end": 0.4},
                    {"word": "2"}
                 ]}
            ]
        });
        let transcript = parse_whisper_json(&serde_json::to_vec(&raw).unwrap()).unwrap();
        assert_eq!(transcript.words[1].start, 0.4);
    }

    #[test]
    fn stub_covers_duration_with_monotonic_words() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("clip.wav");
        let samples = vec![0.1_f32; 24_000 * 4]; // 4 s
        voxhub_audio::save_wav(&wav, &samples, 24_000).unwrap();

        let transcript = stub_transcript(&wav).unwrap();
        assert!(transcript.stub);
        assert!((transcript.duration - 4.0).abs() < 0.01);
        assert!(!transcript.words.is_empty());
        let last = transcript.words.last().unwrap();
        assert!(last.end <= transcript.duration + 0.01);
        for pair in transcript.words.windows(2) {
            assert!(pair[0].end <= pair[1].start + 1e-9, "words must not overlap");
        }
    }

    #[test]
    fn align_model_cache_memoizes() {
        let provider = SttProvider::new(SttSettings::default());
        assert_eq!(provider.resolve_align_model("fr-FR"), "VOXPOPULI_ASR_BASE_10K_FR");
        assert_eq!(provider.resolve_align_model("fr"), "VOXPOPULI_ASR_BASE_10K_FR");
        // Unknown language falls back to the English checkpoint.
        assert_eq!(provider.resolve_align_model("sv"), "WAV2VEC2_ASR_BASE_960H");
        assert_eq!(provider.align_models.lock().unwrap().len(), 2);
    }
}
