// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! ffmpeg/ffprobe orchestration: probing, canonical WAV normalization and
//! the final remux.
//!
//! Tools are discovered on PATH once at construction; a missing tool turns
//! every operation into `engine_unavailable`. Invocation failures carry the
//! trimmed stderr tail as `io_failure`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use voxhub_core::exec::{find_tool, run, ExecSpec};
use voxhub_core::{HubError, Result};

/// The canonical internal audio format: mono, 24 kHz.
pub const CANONICAL_RATE: u32 = 24_000;

/// Containers that get Opus audio on remux; everything else gets AAC.
const OPUS_CONTAINERS: &[&str] = &["webm"];
const AAC_CONTAINERS: &[&str] = &["mp4", "m4v", "mov"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

/// Container-level probe result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    pub duration: f64,
    pub size: u64,
    pub format: String,
    pub has_video: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioStreamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoStreamInfo>,
}

pub struct FfmpegTools {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    timeout: Duration,
}

impl FfmpegTools {
    pub fn discover(timeout_secs: u64) -> Self {
        let tools = Self {
            ffmpeg: find_tool("ffmpeg"),
            ffprobe: find_tool("ffprobe"),
            timeout: Duration::from_secs(timeout_secs),
        };
        if tools.ffmpeg.is_none() {
            tracing::warn!("ffmpeg not found on PATH; media endpoints will report 503");
        }
        tools
    }

    /// Both tools present?
    pub const fn available(&self) -> bool {
        self.ffmpeg.is_some() && self.ffprobe.is_some()
    }

    fn ffmpeg(&self) -> Result<&Path> {
        self.ffmpeg.as_deref().ok_or_else(|| {
            HubError::EngineUnavailable("ffmpeg is not installed".to_string())
        })
    }

    fn ffprobe(&self) -> Result<&Path> {
        self.ffprobe.as_deref().ok_or_else(|| {
            HubError::EngineUnavailable("ffprobe is not installed".to_string())
        })
    }

    /// Run a tool, mapping nonzero exit to `io_failure` with the stderr tail.
    async fn run_tool(&self, spec: ExecSpec) -> Result<voxhub_core::exec::ExecOutput> {
        let output = run(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(HubError::Io(format!("media tool failed: {}", output.diagnostic())))
        }
    }

    /// Full container probe.
    pub async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        let spec = ExecSpec::new(self.ffprobe()?)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path.to_string_lossy())
            .timeout(self.timeout);
        let output = self.run_tool(spec).await?;
        let value: serde_json::Value = serde_json::from_str(&output.stdout)
            .map_err(|e| HubError::Io(format!("unreadable ffprobe output: {e}")))?;
        Ok(parse_probe(&value))
    }

    /// Duration-only fast path.
    pub async fn duration(&self, path: &Path) -> Result<f64> {
        let spec = ExecSpec::new(self.ffprobe()?)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path.to_string_lossy())
            .timeout(self.timeout);
        let output = self.run_tool(spec).await?;
        output
            .stdout
            .trim()
            .parse()
            .map_err(|_| HubError::Io("ffprobe reported no duration".to_string()))
    }

    pub async fn has_video_stream(&self, path: &Path) -> Result<bool> {
        let spec = ExecSpec::new(self.ffprobe()?)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_type",
                "-of",
                "csv=p=0",
            ])
            .arg(path.to_string_lossy())
            .timeout(self.timeout);
        let output = self.run_tool(spec).await?;
        Ok(output.stdout.trim().contains("video"))
    }

    /// Canonicalize any input to mono 24 kHz 16-bit WAV, optionally cutting
    /// `[start, end]` (seconds; `end == 0` means "to the end").
    pub async fn normalize_to_wav(
        &self,
        src: &Path,
        dst: &Path,
        start: Option<f64>,
        end: Option<f64>,
    ) -> Result<()> {
        let mut spec = ExecSpec::new(self.ffmpeg()?).args(["-y", "-v", "error"]);
        if let Some(start) = start.filter(|s| *s > 0.0) {
            spec = spec.arg("-ss").arg(format!("{start:.3}"));
        }
        if let Some(end) = end.filter(|e| *e > 0.0) {
            spec = spec.arg("-to").arg(format!("{end:.3}"));
        }
        let spec = spec
            .arg("-i")
            .arg(src.to_string_lossy())
            .args(["-vn", "-ac", "1", "-ar"])
            .arg(CANONICAL_RATE.to_string())
            .args(["-c:a", "pcm_s16le"])
            .arg(dst.to_string_lossy())
            .timeout(self.timeout);
        self.run_tool(spec).await?;
        if dst.is_file() {
            Ok(())
        } else {
            Err(HubError::Io("normalization produced no output".to_string()))
        }
    }

    /// Audio codec arguments for a target container.
    fn audio_codec_args(container: &str) -> Vec<&'static str> {
        if OPUS_CONTAINERS.contains(&container) {
            vec!["-c:a", "libopus", "-b:a", "160k", "-ar", "48000"]
        } else if AAC_CONTAINERS.contains(&container) {
            vec!["-c:a", "aac", "-b:a", "192k"]
        } else {
            vec!["-c:a", "aac", "-b:a", "192k"]
        }
    }

    /// Video re-encode arguments for the fallback pass.
    fn video_encode_args(container: &str) -> Vec<&'static str> {
        if OPUS_CONTAINERS.contains(&container) {
            vec!["-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "32"]
        } else {
            vec!["-c:v", "libx264", "-pix_fmt", "yuv420p"]
        }
    }

    async fn remux_once(
        &self,
        video_src: &Path,
        audio_src: &Path,
        dst: &Path,
        container: &str,
        reencode: bool,
    ) -> Result<()> {
        let video_args = if reencode {
            Self::video_encode_args(container)
        } else {
            vec!["-c:v", "copy"]
        };
        let spec = ExecSpec::new(self.ffmpeg()?)
            .args(["-y", "-v", "error", "-i"])
            .arg(video_src.to_string_lossy())
            .arg("-i")
            .arg(audio_src.to_string_lossy())
            .args(["-map", "0:v:0", "-map", "1:a:0"])
            .args(video_args)
            .args(Self::audio_codec_args(container))
            .arg("-shortest")
            .arg(dst.to_string_lossy())
            .timeout(self.timeout);
        self.run_tool(spec).await?;
        if dst.is_file() {
            Ok(())
        } else {
            Err(HubError::Io("remux produced no output".to_string()))
        }
    }

    /// Copy the video stream and encode the new audio per container rules.
    /// A codec-copy failure (incompatible stream for the target container)
    /// falls back to a full re-encode.
    pub async fn remux(
        &self,
        video_src: &Path,
        audio_src: &Path,
        dst: &Path,
        container: &str,
    ) -> Result<()> {
        let container = container.trim_start_matches('.').to_lowercase();
        match self.remux_once(video_src, audio_src, dst, &container, false).await {
            Ok(()) => Ok(()),
            Err(HubError::EngineUnavailable(e)) => Err(HubError::EngineUnavailable(e)),
            Err(copy_err) => {
                tracing::warn!(error = %copy_err, container, "stream copy failed, re-encoding video");
                let _ = tokio::fs::remove_file(dst).await;
                self.remux_once(video_src, audio_src, dst, &container, true).await
            },
        }
    }
}

fn parse_probe(value: &serde_json::Value) -> MediaProbe {
    let format = &value["format"];
    let duration = format["duration"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| format["duration"].as_f64())
        .unwrap_or(0.0);
    let size = format["size"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0);
    let format_name = format["format_name"].as_str().unwrap_or("unknown").to_string();

    let mut audio = None;
    let mut video = None;
    if let Some(streams) = value["streams"].as_array() {
        for stream in streams {
            match stream["codec_type"].as_str() {
                Some("audio") if audio.is_none() => {
                    audio = Some(AudioStreamInfo {
                        codec: stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
                        sample_rate: stream["sample_rate"]
                            .as_str()
                            .and_then(|s| s.parse().ok()),
                        channels: stream["channels"].as_u64().map(|c| c as u32),
                    });
                },
                Some("video") if video.is_none() => {
                    video = Some(VideoStreamInfo {
                        codec: stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
                        width: stream["width"].as_u64().map(|w| w as u32),
                        height: stream["height"].as_u64().map(|h| h as u32),
                        fps: parse_frame_rate(stream["r_frame_rate"].as_str()),
                    });
                },
                _ => {},
            }
        }
    }

    MediaProbe { duration, size, format: format_name, has_video: video.is_some(), audio, video }
}

/// ffprobe reports frame rate as a fraction (`30000/1001`).
fn parse_frame_rate(raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    let mut parts = raw.splitn(2, '/');
    let numerator: f64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some(denominator) => {
            let denominator: f64 = denominator.parse().ok()?;
            (denominator != 0.0).then(|| numerator / denominator)
        },
        None => Some(numerator),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn probe_parsing_covers_both_streams() {
        let value = serde_json::json!({
            "format": {"duration": "63.52", "size": "1048576", "format_name": "mov,mp4"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "r_frame_rate": "30000/1001"},
                {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2}
            ]
        });
        let probe = parse_probe(&value);
        assert_eq!(probe.duration, 63.52);
        assert_eq!(probe.size, 1_048_576);
        assert!(probe.has_video);
        let video = probe.video.unwrap();
        assert_eq!(video.codec, "h264");
        assert!((video.fps.unwrap() - 29.97).abs() < 0.01);
        let audio = probe.audio.unwrap();
        assert_eq!(audio.sample_rate, Some(48_000));
    }

    #[test]
    fn probe_parsing_audio_only() {
        let value = serde_json::json!({
            "format": {"duration": "10.0", "size": "1000", "format_name": "wav"},
            "streams": [
                {"codec_type": "audio", "codec_name": "pcm_s16le", "sample_rate": "24000", "channels": 1}
            ]
        });
        let probe = parse_probe(&value);
        assert!(!probe.has_video);
        assert!(probe.video.is_none());
    }

    #[test]
    fn frame_rate_fractions() {
        assert_eq!(parse_frame_rate(Some("30/1")), Some(30.0));
        assert_eq!(parse_frame_rate(Some("25")), Some(25.0));
        assert_eq!(parse_frame_rate(Some("0/0")), None);
        assert_eq!(parse_frame_rate(None), None);
    }

    #[test]
    fn codec_rules_per_container() {
        assert!(FfmpegTools::audio_codec_args("webm").contains(&"libopus"));
        assert!(FfmpegTools::audio_codec_args("mp4").contains(&"aac"));
        assert!(FfmpegTools::audio_codec_args("mkv").contains(&"aac"));
        assert!(FfmpegTools::video_encode_args("webm").contains(&"libvpx-vp9"));
        assert!(FfmpegTools::video_encode_args("mp4").contains(&"libx264"));
    }

    #[tokio::test]
    async fn missing_tools_surface_as_unavailable() {
        let tools = FfmpegTools {
            ffmpeg: None,
            ffprobe: None,
            timeout: Duration::from_secs(5),
        };
        assert!(!tools.available());
        let err = tools.duration(Path::new("x.wav")).await.unwrap_err();
        assert_eq!(err.kind(), "engine_unavailable");
    }
}
