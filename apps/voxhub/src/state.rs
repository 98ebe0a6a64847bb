// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use std::time::Duration;

use voxhub_core::favorites::FavoritesStore;
use voxhub_core::stats::StatsBook;
use voxhub_engines::backends::{ChatTtsEngine, KokoroEngine, XttsEngine};
use voxhub_engines::{Dispatcher, EngineRegistry, PreviewCache};
use voxhub_media::{CleanupGate, FfmpegTools, IngestCache, MediaJobs, SttProvider, YtDlp};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<EngineRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub previews: Arc<PreviewCache>,
    pub favorites: Arc<FavoritesStore>,
    pub stats: Arc<StatsBook>,
    pub jobs: Arc<MediaJobs>,
    pub ingest: Arc<IngestCache>,
    pub ytdlp: Arc<YtDlp>,
    pub ffmpeg: Arc<FfmpegTools>,
    pub cleanup_gate: Arc<CleanupGate>,
    /// Typed handles for engine-specific routes (custom voices, presets).
    pub xtts: Arc<XttsEngine>,
    pub chattts: Arc<ChatTtsEngine>,
    /// Shared client for the proxy layer.
    pub http: reqwest::Client,
}

impl AppState {
    /// Wire the whole service graph from configuration. Called once at
    /// startup (and per test router).
    pub fn from_config(config: Config) -> Self {
        let output_dir = config.paths.output_dir.clone();
        let _ = std::fs::create_dir_all(&output_dir);

        let kokoro =
            Arc::new(KokoroEngine::new(config.engines.kokoro.clone(), output_dir.clone()));
        let xtts = Arc::new(XttsEngine::new(config.engines.xtts.clone(), output_dir.clone()));
        let chattts =
            Arc::new(ChatTtsEngine::new(config.engines.chattts.clone(), output_dir.clone()));

        let mut registry = EngineRegistry::new(config.engines.default.clone());
        registry.register(kokoro);
        registry.register(xtts.clone());
        registry.register(chattts.clone());
        let registry = Arc::new(registry);

        let favorites = Arc::new(FavoritesStore::new(output_dir.join("favorites.json")));
        let dispatcher =
            Arc::new(Dispatcher::new(registry.clone(), favorites.clone(), output_dir.clone()));
        let previews = Arc::new(PreviewCache::new(&output_dir));
        let stats = Arc::new(StatsBook::new(output_dir.join("media_stats.json")));

        let ffmpeg = Arc::new(FfmpegTools::discover(config.media.ffmpeg_timeout_secs));
        let stt = Arc::new(SttProvider::new(config.stt.clone()));
        let jobs = Arc::new(MediaJobs::new(
            output_dir.clone(),
            ffmpeg.clone(),
            stt,
            stats.clone(),
        ));
        let ingest = Arc::new(IngestCache::new(output_dir.join("media_cache").join("youtube")));
        let ytdlp = Arc::new(YtDlp::discover(config.media.ytdlp_timeout_secs));
        let cleanup_gate =
            Arc::new(CleanupGate::new(Duration::from_secs(config.media.cleanup_interval_secs)));

        Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            previews,
            favorites,
            stats,
            jobs,
            ingest,
            ytdlp,
            ffmpeg,
            cleanup_gate,
            xtts,
            chattts,
            http: reqwest::Client::new(),
        }
    }

    /// Opportunistic cleanup: reap stale ingest files and idle job
    /// directories, at most once per configured interval. Never raises.
    pub fn maybe_cleanup(&self) {
        if !self.cleanup_gate.try_acquire() {
            return;
        }
        let ttl = Duration::from_secs(self.config.media.cache_ttl_hours * 3600);
        let ingest = self.ingest.clone();
        let jobs_dir = self.jobs.jobs_dir().to_path_buf();
        tokio::task::spawn_blocking(move || {
            ingest.reap(ttl, &jobs_dir);
        });
    }
}
