// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared wire types: synthesis requests/results and voice catalog entries.
//!
//! These structs define the JSON contracts between the SPA/CLI clients, the
//! HTTP layer and the engine backends. Field casing follows the existing
//! clients: synthesis results use snake_case, catalog payloads camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A synthesis request exactly as the client sent it, before an engine's
/// `prepare` pass has validated and normalized it.
///
/// Engine-specific extras (seed, temperature, style, speaker...) ride in
/// `extra` and are interpreted by the selected backend only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSynthRequest {
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "voiceId")]
    pub voice: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub speed: Option<Value>,
    #[serde(default, alias = "trimSilence")]
    pub trim_silence: Option<bool>,
    /// Favorite id or slug; missing fields are filled from the stored
    /// profile before `prepare` runs.
    #[serde(default, alias = "favoriteId")]
    pub favorite: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A validated, normalized synthesis request.
#[derive(Debug, Clone, Serialize)]
pub struct SynthRequest {
    pub engine: String,
    pub text: String,
    /// Resolved voice identity. `None` only for engines that do not require
    /// a voice (e.g. dialogue models sampling a random speaker).
    pub voice: Option<String>,
    /// Lower-cased BCP-47-ish tag (`en-us`, `fr`). Backends convert to
    /// their own token internally.
    pub language: String,
    pub speed: f64,
    pub trim_silence: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// The result of a synthesis call. Every backend materializes its output as
/// a file under the output directory before returning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthResult {
    pub id: String,
    pub filename: String,
    /// URL under the audio namespace, e.g. `/audio/<filename>`.
    pub path: String,
    pub engine: String,
    pub voice: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Derived accent taxonomy attached to every voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccentInfo {
    pub id: String,
    pub label: String,
    pub flag: String,
}

impl AccentInfo {
    pub fn new(id: &str, label: &str, flag: &str) -> Self {
        Self { id: id.to_string(), label: label.to_string(), flag: flag.to_string() }
    }

    /// The catch-all bucket for voices whose accent cannot be derived.
    pub fn fallback() -> Self {
        Self::new("other", "Other / Mixed", "\u{1f310}")
    }
}

/// One voice in an engine's catalog. Immutable after catalog load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfile {
    pub id: String,
    pub label: String,
    pub locale: Option<String>,
    pub gender: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub accent: AccentInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Engine-specific bag: reference path, preset id, speaker string.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

impl VoiceProfile {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            locale: None,
            gender: None,
            tags: Vec::new(),
            notes: None,
            accent: AccentInfo::fallback(),
            preview_url: None,
            raw: Value::Null,
        }
    }
}

/// A group of voices sharing an accent bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccentGroup {
    pub id: String,
    pub label: String,
    pub flag: String,
    pub voices: Vec<String>,
    pub count: usize,
}

/// Aggregate filter facets over one engine's catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFilters {
    pub genders: Vec<String>,
    pub locales: Vec<String>,
    pub accents: Vec<AccentInfo>,
    pub accent_families: Vec<AccentFamily>,
}

/// An accent family collapses gendered variants (`us_female`/`us_male` into
/// `us`) and reports per-gender counts for the picker UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccentFamily {
    pub id: String,
    pub label: String,
    pub flag: String,
    pub total: usize,
    pub female: usize,
    pub male: usize,
}

/// The payload served for one engine's voice catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPayload {
    pub voices: Vec<VoiceProfile>,
    pub accent_groups: Vec<AccentGroup>,
    #[serde(default)]
    pub filters: CatalogFilters,
    pub count: usize,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CatalogPayload {
    /// An empty catalog for an engine that is currently unavailable.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self { available: false, message: Some(message.into()), ..Self::default() }
    }
}

/// Output filename for a synthesis artifact: epoch seconds, a short random
/// token and the voice id, the shape clients already sort by.
pub fn artifact_filename(voice: &str, ext: &str) -> String {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let token = uuid::Uuid::new_v4().simple().to_string();
    let safe_voice: String = voice
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    format!("{ts}-{}-{safe_voice}.{ext}", &token[..10])
}

/// RFC3339 timestamp in UTC with second precision, the format the favorites
/// store and job metadata persist.
pub fn now_iso() -> String {
    time::OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_request_accepts_camel_aliases() {
        let raw: RawSynthRequest = serde_json::from_str(
            r#"{"engine":"kokoro","text":"hi","voiceId":"af_heart","trimSilence":false,"seed":7}"#,
        )
        .unwrap();
        assert_eq!(raw.voice.as_deref(), Some("af_heart"));
        assert_eq!(raw.trim_silence, Some(false));
        assert_eq!(raw.extra.get("seed"), Some(&serde_json::json!(7)));
    }

    #[test]
    fn artifact_filename_sanitizes_voice() {
        let name = artifact_filename("../evil voice", "wav");
        assert!(name.ends_with("---evil-voice.wav"));
        assert!(!name.contains(".."));
    }

    #[test]
    fn now_iso_is_rfc3339() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'), "expected UTC timestamp, got {ts}");
        assert!(time::OffsetDateTime::parse(
            &ts,
            &time::format_description::well_known::Rfc3339
        )
        .is_ok());
    }
}
