// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Engine trait and registry.
//!
//! Backends are heterogeneous (bundled bank CLI, remote HTTP cloning,
//! dialogue CLI) but present one contract: `prepare` normalizes a raw
//! request, `synthesize` materializes audio under the output directory,
//! `voices` yields the catalog, and `available` probes the backend's
//! external dependencies per request, never cached.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use voxhub_core::types::{CatalogPayload, RawSynthRequest, SynthRequest, SynthResult};
use voxhub_core::{HubError, Result};

/// Capability flags surfaced through `/meta`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSupports {
    pub cloning: bool,
    pub audition: bool,
    pub styles: bool,
    pub dialogue: bool,
}

/// Default request fields filled in when the client omits them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Static identity of a backend. Availability is deliberately absent here:
/// it is probed per request via [`SynthEngine::available`].
#[derive(Debug, Clone)]
pub struct EngineDescriptor {
    pub id: String,
    pub label: String,
    pub description: String,
    pub requires_voice: bool,
    pub supports: EngineSupports,
    pub defaults: EngineDefaults,
}

/// The `/meta` serialization of one engine, with availability resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMeta {
    pub id: String,
    pub label: String,
    pub description: String,
    pub available: bool,
    pub requires_voice: bool,
    pub supports: EngineSupports,
    pub defaults: EngineDefaults,
    pub status: &'static str,
}

/// Per-request context handed to `prepare`.
///
/// `extra_voice_roots` widens the path whitelist for client-supplied voice
/// references; the media pipeline adds the active job directory so borrowed
/// region cuts validate.
#[derive(Debug, Default)]
pub struct PrepareContext {
    pub extra_voice_roots: Vec<PathBuf>,
}

/// A concrete speech-synthesis backend plugged into the dispatcher.
#[async_trait]
pub trait SynthEngine: Send + Sync {
    fn descriptor(&self) -> &EngineDescriptor;

    /// Probe external dependencies (binaries, weights, remote URL). Called
    /// on every request that needs the engine.
    async fn available(&self) -> bool;

    /// Validate and normalize a raw request.
    ///
    /// # Errors
    ///
    /// `bad_request` for missing/invalid fields, including voice references
    /// that resolve outside the whitelisted roots.
    async fn prepare(&self, raw: RawSynthRequest, ctx: &PrepareContext) -> Result<SynthRequest>;

    /// Produce audio for a prepared request. Implementations must land a
    /// file under the output directory before returning.
    async fn synthesize(&self, request: &SynthRequest) -> Result<SynthResult>;

    /// The engine's voice catalog.
    async fn voices(&self) -> Result<CatalogPayload>;
}

/// Ordered collection of engines keyed by id. Built once at startup;
/// iteration order is registration order, which `/meta` preserves.
pub struct EngineRegistry {
    engines: IndexMap<String, Arc<dyn SynthEngine>>,
    default_engine: String,
}

impl EngineRegistry {
    pub fn new(default_engine: impl Into<String>) -> Self {
        Self { engines: IndexMap::new(), default_engine: default_engine.into() }
    }

    pub fn register(&mut self, engine: Arc<dyn SynthEngine>) {
        let id = engine.descriptor().id.clone();
        self.engines.insert(id, engine);
    }

    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }

    /// Resolve an engine id, falling back to the configured default.
    ///
    /// # Errors
    ///
    /// `bad_request` for an unknown id.
    pub fn get(&self, id: Option<&str>) -> Result<Arc<dyn SynthEngine>> {
        let key = id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| self.default_engine.clone(), str::to_lowercase);
        self.engines
            .get(&key)
            .cloned()
            .ok_or_else(|| HubError::BadRequest(format!("unknown TTS engine '{key}'")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn SynthEngine>)> {
        self.engines.iter()
    }

    /// Capability snapshot for `/meta`, availability resolved now.
    pub async fn meta(&self) -> Vec<EngineMeta> {
        let mut out = Vec::with_capacity(self.engines.len());
        for engine in self.engines.values() {
            let descriptor = engine.descriptor();
            let available = engine.available().await;
            out.push(EngineMeta {
                id: descriptor.id.clone(),
                label: descriptor.label.clone(),
                description: descriptor.description.clone(),
                available,
                requires_voice: descriptor.requires_voice,
                supports: descriptor.supports.clone(),
                defaults: descriptor.defaults.clone(),
                status: if available { "ready" } else { "pending" },
            });
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A scriptable engine for dispatcher and preview tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeEngine {
        pub descriptor: EngineDescriptor,
        pub available: bool,
        pub output_dir: PathBuf,
        pub synth_calls: AtomicUsize,
        pub sample_rate: u32,
    }

    impl FakeEngine {
        pub fn new(id: &str, output_dir: PathBuf) -> Self {
            Self {
                descriptor: EngineDescriptor {
                    id: id.to_string(),
                    label: id.to_uppercase(),
                    description: format!("fake {id}"),
                    requires_voice: true,
                    supports: EngineSupports { audition: true, ..EngineSupports::default() },
                    defaults: EngineDefaults {
                        voice: Some("v1".to_string()),
                        language: Some("en-us".to_string()),
                    },
                },
                available: true,
                output_dir,
                synth_calls: AtomicUsize::new(0),
                sample_rate: 24_000,
            }
        }
    }

    #[async_trait]
    impl SynthEngine for FakeEngine {
        fn descriptor(&self) -> &EngineDescriptor {
            &self.descriptor
        }

        async fn available(&self) -> bool {
            self.available
        }

        async fn prepare(
            &self,
            raw: RawSynthRequest,
            _ctx: &PrepareContext,
        ) -> Result<SynthRequest> {
            let text = crate::request::require_text(&raw)?;
            let voice = crate::request::require_voice(&raw)?;
            Ok(SynthRequest {
                engine: self.descriptor.id.clone(),
                text,
                voice: Some(voice),
                language: crate::request::normalize_language(raw.language.as_deref(), "en-us"),
                speed: crate::request::coerce_speed(raw.speed.as_ref(), 1.0, 3.0)?,
                trim_silence: raw.trim_silence.unwrap_or(false),
                extra: raw.extra,
            })
        }

        async fn synthesize(&self, request: &SynthRequest) -> Result<SynthResult> {
            self.synth_calls.fetch_add(1, Ordering::SeqCst);
            let voice = request.voice.clone().unwrap_or_default();
            let filename = voxhub_core::types::artifact_filename(&voice, "wav");
            let path = self.output_dir.join(&filename);
            // A second of quiet tone so previews have something to trim.
            let samples: Vec<f32> = (0..self.sample_rate)
                .map(|i| (i as f32 / 40.0).sin() * 0.4)
                .collect();
            voxhub_audio::save_wav(&path, &samples, self.sample_rate)?;
            Ok(SynthResult {
                id: filename.clone(),
                filename: filename.clone(),
                path: format!("/audio/{filename}"),
                engine: String::new(),
                voice,
                sample_rate: self.sample_rate,
                language: Some(request.language.clone()),
                speed: Some(request.speed),
                duration: Some(1.0),
            })
        }

        async fn voices(&self) -> Result<CatalogPayload> {
            let mut payload = CatalogPayload { available: true, ..CatalogPayload::default() };
            for id in ["v1", "v2"] {
                payload.voices.push(voxhub_core::types::VoiceProfile::new(id, id));
            }
            payload.count = payload.voices.len();
            Ok(payload)
        }
    }
}
