// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Content-addressed cache for external URL downloads, plus the yt-dlp
//! fetcher and the cooperative cleanup gate.
//!
//! Files are keyed by an id extracted from the URL so that repeated
//! requests for the same video hit the disk instead of the network. A
//! sidecar `<id>.info.json` carries the upstream metadata. The reaper is
//! single-flight per interval and never raises.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};
use voxhub_core::exec::{find_tool, run_checked, ExecSpec};
use voxhub_core::{HubError, Result};

/// Preferred audio container order when the fetcher produced several
/// candidates (or the format is unknown).
const PREFERRED_EXTENSIONS: &[&str] = &["m4a", "mp3", "webm", "opus", "ogg"];

/// Extract a stable id from a YouTube-style URL.
///
/// Handles `watch?v=`, `youtu.be/<id>`, `/shorts/<id>` and `/embed/<id>`.
pub fn video_id_from_url(url: &str) -> Option<String> {
    let sanitized = url.trim();
    let is_id = |s: &str| {
        (8..=20).contains(&s.len())
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };

    if let Some(query) = sanitized.split('?').nth(1) {
        for pair in query.split('&') {
            if let Some(id) = pair.strip_prefix("v=") {
                if is_id(id) {
                    return Some(id.to_string());
                }
            }
        }
    }
    for marker in ["youtu.be/", "/shorts/", "/embed/"] {
        if let Some(rest) = sanitized.split(marker).nth(1) {
            let id = rest.split(['?', '&', '/', '#']).next().unwrap_or("");
            if is_id(id) {
                return Some(id.to_string());
            }
        }
    }
    None
}

/// Cache key for a URL: the extracted video id, or a sanitized slug of the
/// whole URL for non-YouTube sources.
pub fn cache_key(url: &str) -> String {
    video_id_from_url(url).unwrap_or_else(|| {
        url.trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(48)
            .collect()
    })
}

pub struct IngestCache {
    dir: PathBuf,
}

impl IngestCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All cached files for an id, as `(extension, path, size)`.
    fn candidates(&self, id: &str) -> Vec<(String, PathBuf, u64)> {
        let mut out = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.dir) else { return out };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if stem != id {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
            if ext == "json" || ext == "part" {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            out.push((ext.to_lowercase(), path, size));
        }
        out
    }

    /// The best cached file for an id: preferred extension first, then the
    /// largest.
    pub fn find_cached(&self, id: &str) -> Option<PathBuf> {
        let mut candidates = self.candidates(id);
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| {
            let rank = |ext: &str| {
                PREFERRED_EXTENSIONS
                    .iter()
                    .position(|p| *p == ext)
                    .unwrap_or(PREFERRED_EXTENSIONS.len())
            };
            rank(&a.0).cmp(&rank(&b.0)).then(b.2.cmp(&a.2))
        });
        candidates.into_iter().next().map(|(_, path, _)| path)
    }

    /// Return the cached file for `url`, invoking `fetcher` on a miss.
    ///
    /// The fetcher receives an output template path `<dir>/<id>` (it is
    /// expected to append the real extension) and must have written at
    /// least one `<id>.<ext>` file on success.
    pub async fn resolve_or_download<F, Fut>(&self, url: &str, fetcher: F) -> Result<PathBuf>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let id = cache_key(url);
        if let Some(cached) = self.find_cached(&id) {
            tracing::debug!(id, path = %cached.display(), "ingest cache hit");
            return Ok(cached);
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        fetcher(self.dir.join(&id)).await?;
        self.find_cached(&id).ok_or_else(|| {
            HubError::EngineFailure("download reported success but produced no file".to_string())
        })
    }

    pub fn save_metadata(&self, id: &str, blob: &serde_json::Value) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{id}.info.json"));
        voxhub_core::paths::write_atomic(&path, &serde_json::to_vec_pretty(blob)?)
    }

    pub fn load_metadata(&self, id: &str) -> Option<serde_json::Value> {
        let path = self.dir.join(format!("{id}.info.json"));
        std::fs::read(path).ok().and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    /// Delete cache files older than `ttl`, and stale per-job directories
    /// under `jobs_dir` by their newest entry mtime. Never raises.
    pub fn reap(&self, ttl: Duration, jobs_dir: &Path) {
        let now = SystemTime::now();
        let is_stale = |time: SystemTime| {
            now.duration_since(time).map(|age| age > ttl).unwrap_or(false)
        };

        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let Ok(meta) = entry.metadata() else { continue };
                let Ok(mtime) = meta.modified() else { continue };
                if meta.is_file() && is_stale(mtime) {
                    tracing::info!(path = %entry.path().display(), "reaping stale ingest file");
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }

        if let Ok(entries) = std::fs::read_dir(jobs_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                if newest_mtime(&path).is_some_and(is_stale) {
                    tracing::info!(path = %path.display(), "reaping stale media job");
                    let _ = std::fs::remove_dir_all(&path);
                }
            }
        }
    }
}

/// Newest mtime of any entry inside `dir` (or the dir itself when empty).
fn newest_mtime(dir: &Path) -> Option<SystemTime> {
    let own = std::fs::metadata(dir).and_then(|m| m.modified()).ok();
    let newest_child = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter_map(|e| e.metadata().ok().and_then(|m| m.modified().ok()))
        .max();
    match (own, newest_child) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Cooperative single-flight gate: at most one cleanup per interval,
/// process-wide.
pub struct CleanupGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl CleanupGate {
    pub const fn new(interval: Duration) -> Self {
        Self { interval, last: Mutex::new(None) }
    }

    /// True when this caller won the slot for the current interval.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut last) = self.last.lock() else { return false };
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            },
        }
    }
}

/// yt-dlp wrapper for audio downloads and metadata.
pub struct YtDlp {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlp {
    pub fn discover(timeout_secs: u64) -> Self {
        Self { binary: find_tool("yt-dlp"), timeout: Duration::from_secs(timeout_secs) }
    }

    pub const fn available(&self) -> bool {
        self.binary.is_some()
    }

    fn binary(&self) -> Result<&Path> {
        self.binary.as_deref().ok_or_else(|| {
            HubError::EngineUnavailable("yt-dlp is not installed".to_string())
        })
    }

    /// Download the best audio stream to `<template>.<ext>`.
    pub async fn download_audio(&self, url: &str, template: &Path) -> Result<()> {
        let spec = ExecSpec::new(self.binary()?)
            .args(["-f", "bestaudio", "--no-playlist", "-o"])
            .arg(format!("{}.%(ext)s", template.to_string_lossy()))
            .arg(url)
            .timeout(self.timeout);
        run_checked(spec).await?;
        Ok(())
    }

    /// Upstream metadata without downloading.
    pub async fn fetch_metadata(&self, url: &str) -> Result<serde_json::Value> {
        let spec = ExecSpec::new(self.binary()?)
            .args(["--dump-json", "--no-playlist"])
            .arg(url)
            .timeout(self.timeout);
        let output = run_checked(spec).await?;
        serde_json::from_str(&output.stdout)
            .map_err(|e| HubError::EngineFailure(format!("unreadable yt-dlp metadata: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn video_id_extraction_forms() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            video_id_from_url("https://youtu.be/dQw4w9WgXcQ?t=10"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            video_id_from_url("https://youtube.com/shorts/abc123XYZ_-"),
            Some("abc123XYZ_-".to_string())
        );
        assert_eq!(video_id_from_url("https://example.com/a.mp3"), None);
    }

    #[test]
    fn cache_key_falls_back_to_slug() {
        let key = cache_key("https://example.com/audio file.mp3");
        assert!(!key.is_empty());
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[tokio::test]
    async fn second_resolve_skips_the_downloader() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IngestCache::new(dir.path().join("youtube"));
        let calls = AtomicUsize::new(0);
        let url = "https://youtu.be/dQw4w9WgXcQ";

        for _ in 0..2 {
            let path = cache
                .resolve_or_download(url, |template| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        let target = template.with_extension("m4a");
                        tokio::fs::write(&target, b"audio").await?;
                        Ok(())
                    }
                })
                .await
                .unwrap();
            assert!(path.ends_with("dQw4w9WgXcQ.m4a"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "only the first call may download");
    }

    #[test]
    fn preferred_extension_wins_over_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IngestCache::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("vid123456.webm"), vec![0; 100]).unwrap();
        std::fs::write(dir.path().join("vid123456.m4a"), vec![0; 10]).unwrap();
        let best = cache.find_cached("vid123456").unwrap();
        assert!(best.ends_with("vid123456.m4a"));
    }

    #[test]
    fn metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IngestCache::new(dir.path().to_path_buf());
        let blob = serde_json::json!({"title": "A Talk", "duration": 61.5});
        cache.save_metadata("vid123456", &blob).unwrap();
        assert_eq!(cache.load_metadata("vid123456").unwrap()["title"], "A Talk");
        assert!(cache.load_metadata("missing00").is_none());
    }

    #[test]
    fn cleanup_gate_is_single_flight_per_interval() {
        let gate = CleanupGate::new(Duration::from_secs(3600));
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn reap_removes_only_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let jobs_dir = dir.path().join("media_edits");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::create_dir_all(jobs_dir.join("fresh1234")).unwrap();
        std::fs::write(cache_dir.join("vid1.m4a"), b"x").unwrap();
        std::fs::write(jobs_dir.join("fresh1234").join("source.wav"), b"x").unwrap();

        let cache = IngestCache::new(cache_dir.clone());
        // Nothing is older than an hour; everything survives.
        cache.reap(Duration::from_secs(3600), &jobs_dir);
        assert!(cache_dir.join("vid1.m4a").exists());
        assert!(jobs_dir.join("fresh1234").exists());

        // A zero TTL reaps it all.
        cache.reap(Duration::ZERO, &jobs_dir);
        assert!(!cache_dir.join("vid1.m4a").exists());
        assert!(!jobs_dir.join("fresh1234").exists());
    }
}
