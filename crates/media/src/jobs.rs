// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media edit jobs: a directory-backed workspace per clip.
//!
//! A job is created by `transcribe`, then mutated by `align`,
//! `align_region`, `replace_preview` and `apply`. All state lives on disk
//! under `media_edits/<job_id>/`; endpoints observe whatever the previous
//! completed call left there. Concurrent mutating calls on the same job
//! are not serialized and not supported.

use crate::align::{
    diff_stats, expand_window, merge_region_words, shift_words, window_text, DiffStats,
};
use crate::ffmpeg::{FfmpegTools, MediaProbe, CANONICAL_RATE};
use crate::stt::{SttProvider, Transcript, Word};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use voxhub_core::stats::{StatRecord, StatsBook};
use voxhub_core::types::now_iso;
use voxhub_engines::{DispatchOptions, Dispatcher};
use voxhub_core::{HubError, Result};

/// Persisted per-job facts beyond the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    pub input_path: String,
    pub has_video: bool,
    #[serde(default)]
    pub created_at: String,
}

/// Response for `POST /media/transcribe`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeResponse {
    pub job_id: String,
    pub media: MediaInfo,
    pub transcript: Transcript,
    pub whisperx_available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub audio_url: String,
    pub duration: f64,
    pub has_video: bool,
}

/// Response for `POST /media/align`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignResponse {
    pub job_id: String,
    pub transcript: Transcript,
}

/// Response for `POST /media/align_region`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignRegionResponse {
    pub job_id: String,
    pub transcript: Transcript,
    pub region: Region,
    pub diff: DiffStats,
    pub stats: RegionStats,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Region {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegionStats {
    pub elapsed: f64,
}

/// Parameters for `POST /media/replace_preview`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceParams {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default = "default_margin_ms")]
    pub margin_ms: u32,
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u32,
    #[serde(default)]
    pub duck_db: Option<f64>,
    #[serde(default = "default_true")]
    pub trim_start: bool,
    #[serde(default = "default_true")]
    pub trim_end: bool,
    #[serde(default)]
    pub align_replace: bool,
}

const fn default_margin_ms() -> u32 {
    250
}
const fn default_fade_ms() -> u32 {
    30
}
const fn default_true() -> bool {
    true
}

/// Response for `POST /media/replace_preview`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceResponse {
    pub job_id: String,
    pub preview_url: String,
    pub latest_preview_url: String,
    pub diff_url: String,
    pub duration: f64,
    pub region: Region,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_words: Option<Vec<Word>>,
}

/// Response for `POST /media/apply`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub job_id: String,
    pub final_url: String,
    pub mode: &'static str,
    pub container: String,
}

pub struct MediaJobs {
    output_dir: PathBuf,
    jobs_dir: PathBuf,
    ffmpeg: Arc<FfmpegTools>,
    stt: Arc<SttProvider>,
    stats: Arc<StatsBook>,
}

impl MediaJobs {
    pub fn new(
        output_dir: PathBuf,
        ffmpeg: Arc<FfmpegTools>,
        stt: Arc<SttProvider>,
        stats: Arc<StatsBook>,
    ) -> Self {
        let jobs_dir = output_dir.join("media_edits");
        Self { output_dir, jobs_dir, ffmpeg, stt, stats }
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    /// Whether the transcription stack is installed.
    pub fn stt_available(&self) -> bool {
        self.stt.available()
    }

    fn new_job_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    /// Resolve and validate a job directory.
    ///
    /// # Errors
    ///
    /// `bad_request` for a malformed id, `not_found` for a missing job.
    pub fn job_dir(&self, job_id: &str) -> Result<PathBuf> {
        if job_id.is_empty()
            || !job_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HubError::BadRequest(format!("invalid job id '{job_id}'")));
        }
        let dir = self.jobs_dir.join(job_id);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(HubError::NotFound(format!("media job '{job_id}' not found")))
        }
    }

    fn transcript_path(dir: &Path) -> PathBuf {
        dir.join("transcript.json")
    }

    pub fn load_transcript(&self, job_id: &str) -> Result<Transcript> {
        let dir = self.job_dir(job_id)?;
        let bytes = std::fs::read(Self::transcript_path(&dir))
            .map_err(|_| HubError::NotFound(format!("job '{job_id}' has no transcript")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HubError::Io(format!("corrupt transcript: {e}")))
    }

    fn save_transcript(dir: &Path, transcript: &Transcript) -> Result<()> {
        voxhub_core::paths::write_atomic(
            &Self::transcript_path(dir),
            &serde_json::to_vec_pretty(transcript)
                .map_err(|e| HubError::Io(format!("serializing transcript: {e}")))?,
        )
    }

    fn load_meta(dir: &Path) -> Result<JobMeta> {
        let bytes = std::fs::read(dir.join("job_meta.json"))
            .map_err(|_| HubError::NotFound("job metadata missing".to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HubError::Io(format!("corrupt job metadata: {e}")))
    }

    fn save_meta(dir: &Path, meta: &JobMeta) -> Result<()> {
        voxhub_core::paths::write_atomic(
            &dir.join("job_meta.json"),
            &serde_json::to_vec_pretty(meta)
                .map_err(|e| HubError::Io(format!("serializing job metadata: {e}")))?,
        )
    }

    fn audio_url(&self, job_id: &str, filename: &str) -> String {
        format!("/audio/media_edits/{job_id}/{filename}")
    }

    /// Create a job from a source media file: persist the original, probe,
    /// normalize to the canonical WAV and transcribe.
    pub async fn transcribe(&self, source: &Path, original_name: &str) -> Result<TranscribeResponse> {
        let started = Instant::now();
        let job_id = Self::new_job_id();
        let dir = self.jobs_dir.join(&job_id);
        tokio::fs::create_dir_all(&dir).await?;

        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_lowercase();
        let original = dir.join(format!("source.{ext}"));
        tokio::fs::copy(source, &original).await?;

        let probe: MediaProbe = self.ffmpeg.probe(&original).await?;
        let wav = dir.join("source.wav");
        self.ffmpeg.normalize_to_wav(&original, &wav, None, None).await?;

        let mut transcript = self.stt.transcribe(&wav).await?;
        if transcript.duration <= 0.0 {
            transcript.duration = probe.duration;
        }
        Self::save_transcript(&dir, &transcript)?;
        Self::save_meta(
            &dir,
            &JobMeta {
                input_path: original.to_string_lossy().into_owned(),
                has_video: probe.has_video,
                created_at: now_iso(),
            },
        )?;

        let elapsed = started.elapsed().as_secs_f64();
        self.stats.record(
            "transcribe",
            StatRecord::new(elapsed).with("duration", transcript.duration),
        );
        tracing::info!(job_id, duration = transcript.duration, "media job created");

        Ok(TranscribeResponse {
            media: MediaInfo {
                audio_url: self.audio_url(&job_id, "source.wav"),
                duration: transcript.duration,
                has_video: probe.has_video,
            },
            transcript,
            whisperx_available: self.stt.available(),
            job_id,
        })
    }

    /// Full forced-alignment pass over the whole clip.
    pub async fn align(&self, job_id: &str) -> Result<AlignResponse> {
        let started = Instant::now();
        let dir = self.job_dir(job_id)?;
        let mut transcript = self.load_transcript(job_id)?;
        let wav = dir.join("source.wav");

        let text = transcript
            .segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        if text.trim().is_empty() {
            return Err(HubError::BadRequest("transcript has no text to align".to_string()));
        }
        let words = self.stt.align_clip(&wav, &text, &transcript.language).await?;
        transcript.words = words;
        transcript.aligned = true;
        Self::save_transcript(&dir, &transcript)?;

        let elapsed = started.elapsed().as_secs_f64();
        self.stats
            .record("align", StatRecord::new(elapsed).with("duration", transcript.duration));
        Ok(AlignResponse { job_id: job_id.to_string(), transcript })
    }

    /// Windowed forced-alignment pass; see the module docs of
    /// [`crate::align`] for the merge semantics.
    pub async fn align_region(
        &self,
        job_id: &str,
        start: f64,
        end: f64,
        margin: f64,
    ) -> Result<AlignRegionResponse> {
        if !(start >= 0.0 && end > start) {
            return Err(HubError::BadRequest(
                "region must satisfy 0 <= start < end".to_string(),
            ));
        }
        let started = Instant::now();
        let dir = self.job_dir(job_id)?;
        let mut transcript = self.load_transcript(job_id)?;
        let wav = dir.join("source.wav");

        let (w0, w1) = expand_window(start, end, margin, transcript.duration);
        let text = window_text(&transcript, w0, w1)?;

        let region_wav = dir.join(format!("region-{:.2}-{:.2}.wav", w0, w1));
        self.ffmpeg.normalize_to_wav(&wav, &region_wav, Some(w0), Some(w1)).await?;

        let clip_words = self.stt.align_clip(&region_wav, &text, &transcript.language).await?;
        let new_words = shift_words(clip_words, w0);

        let prior_window: Vec<Word> = transcript
            .words
            .iter()
            .filter(|w| w.end > w0 && w.start < w1)
            .cloned()
            .collect();
        let diff = diff_stats(&prior_window, &new_words);

        transcript.words = merge_region_words(&transcript.words, new_words, w0, w1);
        transcript.aligned = true;
        Self::save_transcript(&dir, &transcript)?;
        let _ = std::fs::remove_file(&region_wav);

        let elapsed = started.elapsed().as_secs_f64();
        self.stats
            .record("align_region", StatRecord::new(elapsed).with("window", w1 - w0));
        Ok(AlignRegionResponse {
            job_id: job_id.to_string(),
            transcript,
            region: Region { start: w0, end: w1 },
            diff,
            stats: RegionStats { elapsed },
        })
    }

    /// Synthesize a replacement for `[start, end]` and splice it into a
    /// preview of the full clip.
    pub async fn replace_preview(
        &self,
        job_id: &str,
        params: ReplaceParams,
        dispatcher: &Dispatcher,
    ) -> Result<ReplaceResponse> {
        let started = Instant::now();
        let dir = self.job_dir(job_id)?;
        let transcript = self.load_transcript(job_id)?;
        let wav = dir.join("source.wav");

        let (source, rate) = voxhub_audio::load_mono(&wav, Some(CANONICAL_RATE))?;
        let duration = source.len() as f64 / f64::from(rate);
        if !(params.start >= 0.0 && params.end > params.start && params.end <= duration + 0.01) {
            return Err(HubError::BadRequest(format!(
                "region [{:.2}, {:.2}] is outside the source (duration {:.2})",
                params.start, params.end, duration
            )));
        }
        if params.text.trim().is_empty() {
            return Err(HubError::BadRequest("field 'text' is required".to_string()));
        }

        // Resolve the cloning reference: an explicit voice (engine id,
        // slug or in-scope path) or a borrowed cut of the region itself.
        let margin = f64::from(params.margin_ms) / 1000.0;
        let voice = match &params.voice {
            Some(voice) if !voice.trim().is_empty() => voice.trim().to_string(),
            _ => {
                let (b0, b1) = expand_window(params.start, params.end, margin, duration);
                let borrowed = dir.join("region-reference.wav");
                self.ffmpeg.normalize_to_wav(&wav, &borrowed, Some(b0), Some(b1)).await?;
                borrowed.to_string_lossy().into_owned()
            },
        };
        let language = params
            .language
            .clone()
            .or_else(|| Some(transcript.language.clone()))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "en".to_string());

        let raw = voxhub_core::types::RawSynthRequest {
            engine: Some("xtts".to_string()),
            text: Some(params.text.clone()),
            voice: Some(voice),
            language: Some(language),
            speed: params.speed.map(|s| serde_json::json!(s)),
            ..voxhub_core::types::RawSynthRequest::default()
        };
        let synth = dispatcher
            .synthesize(raw, DispatchOptions { extra_voice_roots: vec![dir.clone()] })
            .await?;
        let artifact = dispatcher.output_dir().join(&synth.filename);
        let (mut replacement, _) = voxhub_audio::load_mono(&artifact, Some(rate))?;
        let _ = std::fs::remove_file(&artifact);

        if params.trim_start || params.trim_end {
            // Regional trim only; the dispatcher-level trim flag is not
            // consulted on this path.
            replacement = voxhub_audio::trim_silence(&replacement, rate, 35.0, 10, 10);
        }

        let i0 = (params.start * f64::from(rate)).round() as usize;
        let i1 = ((params.end * f64::from(rate)).round() as usize).min(source.len());
        let region_len = i1.saturating_sub(i0);
        let stretched = voxhub_audio::time_stretch_to_length(&replacement, rate, region_len);

        let duck_gain = params
            .duck_db
            .map(|db| (10.0_f64.powf(db / 20.0) as f32).clamp(0.0, 1.0));
        let preview = voxhub_audio::crossfade_splice(
            &source,
            &stretched,
            rate,
            i0,
            i1,
            params.fade_ms,
            duck_gain,
        );

        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let preview_name = format!("preview-{ts}.wav");
        voxhub_audio::save_wav(&dir.join(&preview_name), &preview, rate)?;
        voxhub_audio::save_wav(&dir.join("latest_preview.wav"), &preview, rate)?;

        // A short diff clip around the region for quick A/B listening.
        let (d0, d1) = expand_window(params.start, params.end, 1.0, duration);
        let di0 = (d0 * f64::from(rate)) as usize;
        let di1 = ((d1 * f64::from(rate)) as usize).min(preview.len());
        let diff_name = format!("diff-{ts}.wav");
        voxhub_audio::save_wav(&dir.join(&diff_name), &preview[di0..di1], rate)?;

        let replace_words = if params.align_replace && self.stt.available() {
            let clip = dir.join("replace-align.wav");
            voxhub_audio::save_wav(&clip, &stretched, rate)?;
            let aligned = self
                .stt
                .align_clip(&clip, &params.text, &transcript.language)
                .await
                .map(|words| shift_words(words, params.start));
            let _ = std::fs::remove_file(&clip);
            match aligned {
                Ok(words) => Some(words),
                Err(e) => {
                    tracing::warn!(error = %e, "replacement alignment failed, omitting words");
                    None
                },
            }
        } else {
            None
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.stats.record(
            "replace_preview",
            StatRecord::new(elapsed).with("region", params.end - params.start),
        );
        Ok(ReplaceResponse {
            job_id: job_id.to_string(),
            preview_url: self.audio_url(job_id, &preview_name),
            latest_preview_url: self.audio_url(job_id, "latest_preview.wav"),
            diff_url: self.audio_url(job_id, &diff_name),
            duration,
            region: Region { start: params.start, end: params.end },
            replace_words,
        })
    }

    /// Produce the final artifact: remux for video sources, plain WAV copy
    /// otherwise.
    pub async fn apply(&self, job_id: &str, format: Option<&str>) -> Result<ApplyResponse> {
        let started = Instant::now();
        let dir = self.job_dir(job_id)?;
        let meta = Self::load_meta(&dir)?;
        let latest = dir.join("latest_preview.wav");
        if !latest.is_file() {
            return Err(HubError::BadRequest(
                "no preview exists yet; call replace_preview first".to_string(),
            ));
        }

        let response = if meta.has_video {
            let input = PathBuf::from(&meta.input_path);
            let container = format
                .map(|f| f.trim_start_matches('.').to_lowercase())
                .filter(|f| !f.is_empty())
                .or_else(|| {
                    input.extension().and_then(|e| e.to_str()).map(str::to_lowercase)
                })
                .unwrap_or_else(|| "mp4".to_string());
            let final_name = format!("final.{container}");
            self.ffmpeg.remux(&input, &latest, &dir.join(&final_name), &container).await?;
            ApplyResponse {
                job_id: job_id.to_string(),
                final_url: self.audio_url(job_id, &final_name),
                mode: "remux",
                container,
            }
        } else {
            tokio::fs::copy(&latest, dir.join("final.wav")).await?;
            ApplyResponse {
                job_id: job_id.to_string(),
                final_url: self.audio_url(job_id, "final.wav"),
                mode: "audio",
                container: "wav".to_string(),
            }
        };

        self.stats.record("apply", StatRecord::new(started.elapsed().as_secs_f64()));
        Ok(response)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stt::{Segment, SttSettings};

    fn service(dir: &Path) -> MediaJobs {
        MediaJobs::new(
            dir.to_path_buf(),
            Arc::new(FfmpegTools::discover(30)),
            Arc::new(SttProvider::new(SttSettings::default())),
            Arc::new(StatsBook::new(dir.join("media_stats.json"))),
        )
    }

    fn seed_job(jobs: &MediaJobs, job_id: &str, words: Vec<Word>) -> PathBuf {
        let dir = jobs.jobs_dir().join(job_id);
        std::fs::create_dir_all(&dir).unwrap();
        let transcript = Transcript {
            language: "en".to_string(),
            duration: 30.0,
            segments: vec![Segment { text: "hello there".to_string(), start: 0.0, end: 30.0 }],
            words,
            stats: None,
            aligned: false,
            stub: false,
        };
        MediaJobs::save_transcript(&dir, &transcript).unwrap();
        MediaJobs::save_meta(
            &dir,
            &JobMeta {
                input_path: dir.join("source.mp4").to_string_lossy().into_owned(),
                has_video: false,
                created_at: now_iso(),
            },
        )
        .unwrap();
        dir
    }

    #[test]
    fn job_id_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = service(tmp.path());
        assert_eq!(jobs.job_dir("../escape").unwrap_err().kind(), "bad_request");
        assert_eq!(jobs.job_dir("").unwrap_err().kind(), "bad_request");
        assert_eq!(jobs.job_dir("deadbeef").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn transcript_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = service(tmp.path());
        seed_job(
            &jobs,
            "abc12345",
            vec![Word { text: "hi".to_string(), start: 0.0, end: 0.4, confidence: None }],
        );
        let loaded = jobs.load_transcript("abc12345").unwrap();
        assert_eq!(loaded.words.len(), 1);
        assert_eq!(loaded.language, "en");
    }

    #[tokio::test]
    async fn apply_without_preview_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = service(tmp.path());
        seed_job(&jobs, "abc12345", vec![]);
        let err = jobs.apply("abc12345", None).await.unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[tokio::test]
    async fn align_region_validates_region() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = service(tmp.path());
        seed_job(&jobs, "abc12345", vec![]);
        let err = jobs.align_region("abc12345", 5.0, 5.0, 0.5).await.unwrap_err();
        assert_eq!(err.kind(), "bad_request");
        let err = jobs.align_region("abc12345", -1.0, 5.0, 0.5).await.unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[test]
    fn new_job_ids_are_short_and_unique() {
        let a = MediaJobs::new_job_id();
        let b = MediaJobs::new_job_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
