// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;
use voxhub_engines::backends::{ChatTtsSettings, KokoroSettings, XttsSettings};
use voxhub_media::SttSettings;

fn default_address() -> String {
    "127.0.0.1:7860".to_string()
}

fn default_api_prefix() -> String {
    "api".to_string()
}

const fn default_max_body_mb() -> usize {
    512
}

/// HTTP server configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ServerConfig {
    /// Bind address, e.g. `127.0.0.1:7860` or `0.0.0.0:7860` for LAN use.
    #[serde(default = "default_address")]
    pub address: String,
    /// JSON API mount point; legacy duplicates stay at the root.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Maximum request body size in megabytes (uploads can be whole videos).
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            api_prefix: default_api_prefix(),
            max_body_mb: default_max_body_mb(),
        }
    }
}

/// Filesystem layout.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct PathsConfig {
    /// Root for every generated artifact (audio, previews, jobs, caches).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// SPA bundle directory; the fallback serves its `index.html` when
    /// present.
    #[serde(default = "default_frontend_dist")]
    pub frontend_dist: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_frontend_dist() -> PathBuf {
    PathBuf::from("frontend/dist")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { output_dir: default_output_dir(), frontend_dist: default_frontend_dist() }
    }
}

/// Optional single-token auth for the favorites store.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct AuthConfig {
    /// When set, favorites mutations require `Authorization: Bearer <token>`.
    #[serde(default)]
    pub favorites_token: Option<String>,
}

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_log_file() -> String {
    "logs/voxhub.log".to_string()
}

/// Logging configuration (console + optional file layer).
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub console_enable: bool,
    #[serde(default)]
    pub console_level: LogLevel,
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default)]
    pub file_level: LogLevel,
    #[serde(default = "default_log_file")]
    pub file_path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            console_level: LogLevel::default(),
            file_enable: false,
            file_level: LogLevel::default(),
            file_path: default_log_file(),
        }
    }
}

fn default_engine() -> String {
    "kokoro".to_string()
}

/// Engine selection and per-backend settings.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct EnginesConfig {
    /// Engine used when a request names none.
    #[serde(default = "default_engine")]
    pub default: String,
    #[serde(default)]
    pub kokoro: KokoroSettings,
    #[serde(default)]
    pub xtts: XttsSettings,
    #[serde(default)]
    pub chattts: ChatTtsSettings,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            default: default_engine(),
            kokoro: KokoroSettings::default(),
            xtts: XttsSettings::default(),
            chattts: ChatTtsSettings::default(),
        }
    }
}

const fn default_cache_ttl_hours() -> u64 {
    72
}

const fn default_cleanup_interval_secs() -> u64 {
    3600
}

const fn default_tool_timeout_secs() -> u64 {
    600
}

/// Media pipeline configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct MediaConfig {
    /// TTL for ingest cache entries and idle job directories.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
    /// Minimum seconds between opportunistic cleanup runs.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Wall-clock budget for ffmpeg/ffprobe invocations.
    #[serde(default = "default_tool_timeout_secs")]
    pub ffmpeg_timeout_secs: u64,
    /// Wall-clock budget for yt-dlp invocations.
    #[serde(default = "default_tool_timeout_secs")]
    pub ytdlp_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: default_cache_ttl_hours(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            ffmpeg_timeout_secs: default_tool_timeout_secs(),
            ytdlp_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_ollama_model() -> String {
    "phi3:latest".to_string()
}

fn default_drawthings_url() -> String {
    "http://127.0.0.1:7888".to_string()
}

/// Upstream services the proxy layer relays to.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct UpstreamsConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    /// Model used for generated random text.
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_drawthings_url")]
    pub drawthings_url: String,
    /// Allow falling back to the local `ollama` CLI when the HTTP API
    /// lacks an operation (delete on older servers).
    #[serde(default = "default_true")]
    pub allow_cli_fallback: bool,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            drawthings_url: default_drawthings_url(),
            allow_cli_fallback: true,
        }
    }
}

/// Root configuration, layered from defaults, `voxhub.toml` and `VOXHUB_`
/// environment variables.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub stt: SttSettings,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub upstreams: UpstreamsConfig,
}

impl Config {
    /// Load configuration: serde defaults, then the TOML file, then
    /// `VOXHUB_`-prefixed environment variables with `__` as the section
    /// separator (`VOXHUB_SERVER__ADDRESS`).
    pub fn load(config_path: Option<&str>) -> Result<Self, figment::Error> {
        let path = config_path.unwrap_or("voxhub.toml");
        Figment::from(figment::providers::Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("VOXHUB_").split("__"))
            .extract()
    }

    /// API prefix normalized to no surrounding slashes; empty disables the
    /// prefixed mount.
    pub fn api_prefix(&self) -> String {
        self.server.api_prefix.trim_matches('/').to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.address, "127.0.0.1:7860");
        assert_eq!(config.api_prefix(), "api");
        assert_eq!(config.engines.default, "kokoro");
        assert!(config.auth.favorites_token.is_none());
    }

    #[test]
    fn prefix_is_normalized() {
        let mut config = Config::default();
        config.server.api_prefix = "/api/v2/".to_string();
        assert_eq!(config.api_prefix(), "api/v2");
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = Config::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.server.address, config.server.address);
        assert_eq!(parsed.upstreams.ollama_url, config.upstreams.ollama_url);
    }
}
