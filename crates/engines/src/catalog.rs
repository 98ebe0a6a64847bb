// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Voice catalog construction.
//!
//! Three catalog sources exist: the bundled voice-bank archive (ids like
//! `af_heart` carrying locale/gender in the prefix), a directory of cloning
//! reference clips with optional sidecar metadata, and a directory of
//! dialogue presets. All three produce [`VoiceProfile`]s; grouping and
//! filter facets are shared.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use voxhub_core::paths::slugify;
use voxhub_core::types::{
    AccentFamily, AccentGroup, AccentInfo, CatalogFilters, CatalogPayload, VoiceProfile,
};
use voxhub_core::{HubError, Result};

/// Reference clip extensions the cloning engine accepts.
pub const REFERENCE_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a"];

/// Gendered accent buckets derived straight from a bank id prefix.
const ACCENT_PREFIX_MAP: &[(&str, (&str, &str, &str))] = &[
    ("af", ("us_female", "American English · Female", "\u{1f1fa}\u{1f1f8}")),
    ("am", ("us_male", "American English · Male", "\u{1f1fa}\u{1f1f8}")),
    ("bf", ("uk_female", "British English · Female", "\u{1f1ec}\u{1f1e7}")),
    ("bm", ("uk_male", "British English · Male", "\u{1f1ec}\u{1f1e7}")),
];

/// Locale-level accent buckets used when the prefix has no dedicated entry.
const ACCENT_LOCALE_MAP: &[(&str, (&str, &str, &str))] = &[
    ("en-us", ("us", "American English", "\u{1f1fa}\u{1f1f8}")),
    ("en-gb", ("uk", "British English", "\u{1f1ec}\u{1f1e7}")),
    ("es-es", ("es", "Spanish", "\u{1f1ea}\u{1f1f8}")),
    ("fr-fr", ("fr", "French", "\u{1f1eb}\u{1f1f7}")),
    ("hi-in", ("in", "Hindi", "\u{1f1ee}\u{1f1f3}")),
    ("it-it", ("it", "Italian", "\u{1f1ee}\u{1f1f9}")),
    ("ja-jp", ("ja", "Japanese", "\u{1f1ef}\u{1f1f5}")),
    ("pt-br", ("br", "Brazilian Portuguese", "\u{1f1e7}\u{1f1f7}")),
    ("zh-cn", ("zh", "Chinese", "\u{1f1e8}\u{1f1f3}")),
];

/// Bank prefix letter -> locale.
const PREFIX_LOCALE_MAP: &[(char, &str)] = &[
    ('a', "en-us"),
    ('b', "en-gb"),
    ('e', "es-es"),
    ('f', "fr-fr"),
    ('h', "hi-in"),
    ('i', "it-it"),
    ('j', "ja-jp"),
    ('p', "pt-br"),
    ('z', "zh-cn"),
];

/// Locale for a bank voice id, from its first prefix character.
pub fn bank_locale(voice_id: &str) -> Option<String> {
    let prefix = voice_id.split('_').next().unwrap_or(voice_id);
    let first = prefix.chars().next()?.to_ascii_lowercase();
    PREFIX_LOCALE_MAP
        .iter()
        .find(|(c, _)| *c == first)
        .map(|(_, locale)| (*locale).to_string())
        // Unrecognized Latin prefixes in the bank have all been US English.
        .or_else(|| first.is_ascii_alphabetic().then(|| "en-us".to_string()))
}

/// Gender for a bank voice id, from its second prefix character.
pub fn bank_gender(voice_id: &str) -> Option<String> {
    let prefix = voice_id.split('_').next().unwrap_or(voice_id);
    match prefix.chars().nth(1)?.to_ascii_lowercase() {
        'f' => Some("female".to_string()),
        'm' => Some("male".to_string()),
        _ => None,
    }
}

/// Accent bucket: prefix first, then locale, then the fallback.
pub fn resolve_accent(voice_id: &str, locale: Option<&str>) -> AccentInfo {
    let prefix: String = voice_id
        .split('_')
        .next()
        .unwrap_or(voice_id)
        .chars()
        .take(2)
        .collect::<String>()
        .to_lowercase();
    if let Some((_, (id, label, flag))) =
        ACCENT_PREFIX_MAP.iter().find(|(p, _)| *p == prefix)
    {
        return AccentInfo::new(id, label, flag);
    }
    if let Some(locale) = locale {
        let locale_key = locale.to_lowercase();
        if let Some((_, (id, label, flag))) =
            ACCENT_LOCALE_MAP.iter().find(|(l, _)| *l == locale_key)
        {
            return AccentInfo::new(id, label, flag);
        }
        let base = locale_key.split('-').next().unwrap_or(&locale_key);
        if let Some((_, (id, label, flag))) =
            ACCENT_LOCALE_MAP.iter().find(|(l, _)| l.split('-').next() == Some(base))
        {
            return AccentInfo::new(id, label, flag);
        }
    }
    AccentInfo::fallback()
}

/// A display label from a bank id: `af_heart` -> `Af Heart`.
fn title_case(voice_id: &str) -> String {
    voice_id
        .split('_')
        .filter(|p| !p.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full profile for one bank voice.
pub fn bank_profile(voice_id: &str) -> VoiceProfile {
    let locale = bank_locale(voice_id);
    let mut profile = VoiceProfile::new(voice_id, title_case(voice_id));
    profile.gender = bank_gender(voice_id);
    profile.accent = resolve_accent(voice_id, locale.as_deref());
    profile.locale = locale;
    profile
}

/// Enumerate voice ids in the bundled bank archive (a zip; entry stems are
/// the voice ids).
pub fn bank_entries(archive: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(archive)
        .map_err(|e| HubError::Io(format!("opening voice bank: {e}")))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| HubError::Io(format!("reading voice bank: {e}")))?;
    let mut ids = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let entry = zip
            .by_index(index)
            .map_err(|e| HubError::Io(format!("reading voice bank entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name();
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        if !stem.is_empty() {
            ids.push(stem);
        }
    }
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Sidecar metadata merged over a reference clip (`<file>.meta.json`).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarMeta {
    pub label: Option<String>,
    pub language: Option<String>,
    pub gender: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub accent: Option<AccentInfo>,
}

/// Path of the sidecar for a reference clip.
pub fn sidecar_path(reference: &Path) -> PathBuf {
    let mut name = reference.file_name().map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".meta.json");
    reference.with_file_name(name)
}

/// Enumerate reference clips in a cloning voice directory.
///
/// Stems are slugged and uniquified with a numeric suffix; sidecar metadata
/// overrides the derived fields. `preview_for` supplies a cached preview
/// URL per voice id when one exists.
pub fn reference_profiles(
    dir: &Path,
    preview_for: impl Fn(&str) -> Option<String>,
) -> Vec<VoiceProfile> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|ext| {
                            REFERENCE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
                        })
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort();

    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut profiles = Vec::with_capacity(files.len());
    for file in files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base = slugify(&stem);
        let id = match seen.get_mut(&base) {
            Some(count) => {
                *count += 1;
                format!("{base}-{count}")
            },
            None => {
                seen.insert(base.clone(), 1);
                base
            },
        };

        let mut profile = VoiceProfile::new(&id, title_case(&stem.replace('-', "_")));
        profile.raw = serde_json::json!({ "referencePath": file.to_string_lossy() });
        profile.preview_url = preview_for(&id);

        let sidecar = sidecar_path(&file);
        if let Ok(bytes) = std::fs::read(&sidecar) {
            match serde_json::from_slice::<SidecarMeta>(&bytes) {
                Ok(meta) => {
                    if let Some(label) = meta.label {
                        profile.label = label;
                    }
                    if let Some(language) = meta.language {
                        profile.locale = Some(language.to_lowercase());
                    }
                    profile.gender = meta.gender.or(profile.gender);
                    profile.tags = meta.tags;
                    profile.notes = meta.notes;
                    if let Some(accent) = meta.accent {
                        profile.accent = accent;
                    } else {
                        profile.accent = resolve_accent(&id, profile.locale.as_deref());
                    }
                },
                Err(e) => {
                    tracing::warn!(sidecar = %sidecar.display(), error = %e, "ignoring malformed sidecar");
                },
            }
        } else {
            profile.accent = resolve_accent(&id, None);
        }
        profiles.push(profile);
    }
    profiles
}

/// One dialogue preset loaded from the presets directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialoguePreset {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    pub speaker: String,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Load presets (`.json` structured, `.txt` speaker-string only).
pub fn load_presets(dir: &Path) -> Vec<(String, DialoguePreset)> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|list| list.flatten().map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();

    let mut presets = Vec::new();
    for path in entries {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match ext.to_lowercase().as_str() {
            "json" => match std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|b| serde_json::from_slice::<DialoguePreset>(&b).map_err(|e| e.to_string()))
            {
                Ok(preset) => {
                    let id = preset.id.clone().unwrap_or_else(|| slugify(&stem));
                    presets.push((id, preset));
                },
                Err(e) => {
                    tracing::warn!(preset = %path.display(), error = %e, "skipping malformed preset");
                },
            },
            "txt" => {
                if let Ok(speaker) = std::fs::read_to_string(&path) {
                    let speaker = speaker.trim().to_string();
                    if !speaker.is_empty() {
                        presets.push((
                            slugify(&stem),
                            DialoguePreset {
                                id: None,
                                label: Some(title_case(&stem.replace('-', "_"))),
                                speaker,
                                seed: None,
                                temperature: None,
                                notes: None,
                            },
                        ));
                    }
                }
            },
            _ => {},
        }
    }
    presets
}

/// Group voices into accent buckets, sorted by label.
pub fn group_by_accent(voices: &[VoiceProfile]) -> Vec<AccentGroup> {
    let mut groups: BTreeMap<String, AccentGroup> = BTreeMap::new();
    for voice in voices {
        let group = groups.entry(voice.accent.id.clone()).or_insert_with(|| AccentGroup {
            id: voice.accent.id.clone(),
            label: voice.accent.label.clone(),
            flag: voice.accent.flag.clone(),
            voices: Vec::new(),
            count: 0,
        });
        group.voices.push(voice.id.clone());
    }
    let mut out: Vec<AccentGroup> = groups.into_values().collect();
    for group in &mut out {
        group.count = group.voices.len();
    }
    out.sort_by(|a, b| a.label.to_lowercase().cmp(&b.label.to_lowercase()));
    out
}

/// Collapse a gendered accent id (`us_female`) to its family (`us`).
fn family_id(accent_id: &str) -> &str {
    accent_id
        .strip_suffix("_female")
        .or_else(|| accent_id.strip_suffix("_male"))
        .unwrap_or(accent_id)
}

/// Build the filter facets for a catalog.
pub fn build_filters(voices: &[VoiceProfile]) -> CatalogFilters {
    let mut genders: Vec<String> = Vec::new();
    let mut locales: Vec<String> = Vec::new();
    let mut accents: Vec<AccentInfo> = Vec::new();
    let mut families: BTreeMap<String, AccentFamily> = BTreeMap::new();

    for voice in voices {
        if let Some(gender) = &voice.gender {
            if !genders.contains(gender) {
                genders.push(gender.clone());
            }
        }
        if let Some(locale) = &voice.locale {
            if !locales.contains(locale) {
                locales.push(locale.clone());
            }
        }
        if !accents.iter().any(|a| a.id == voice.accent.id) {
            accents.push(voice.accent.clone());
        }

        let fid = family_id(&voice.accent.id).to_string();
        let family = families.entry(fid.clone()).or_insert_with(|| AccentFamily {
            id: fid,
            // Strip the gender suffix from the label too: the family label
            // is the part before the separator.
            label: voice
                .accent
                .label
                .split(" · ")
                .next()
                .unwrap_or(&voice.accent.label)
                .to_string(),
            flag: voice.accent.flag.clone(),
            total: 0,
            female: 0,
            male: 0,
        });
        family.total += 1;
        match voice.gender.as_deref() {
            Some("female") => family.female += 1,
            Some("male") => family.male += 1,
            _ => {},
        }
    }

    genders.sort();
    locales.sort();
    accents.sort_by(|a, b| a.label.to_lowercase().cmp(&b.label.to_lowercase()));
    CatalogFilters {
        genders,
        locales,
        accents,
        accent_families: families.into_values().collect(),
    }
}

/// Assemble the full payload for a list of voices.
pub fn payload_from(voices: Vec<VoiceProfile>) -> CatalogPayload {
    let accent_groups = group_by_accent(&voices);
    let filters = build_filters(&voices);
    let count = voices.len();
    CatalogPayload { voices, accent_groups, filters, count, available: true, message: None }
}

/// Mtime-fingerprinted catalog cache. Readers get a snapshot; the payload
/// is rebuilt only when the source fingerprint changes.
pub struct CatalogCache {
    inner: Mutex<Option<(u128, std::sync::Arc<CatalogPayload>)>>,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self { inner: Mutex::new(None) }
    }
}

impl CatalogCache {
    /// Fingerprint for a path: newest mtime (nanos) + entry count for
    /// directories, mtime + size for files. 0 when missing.
    pub fn fingerprint(path: &Path) -> u128 {
        fn mtime_nanos(meta: &std::fs::Metadata) -> u128 {
            meta.modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos())
        }
        let Ok(meta) = std::fs::metadata(path) else { return 0 };
        if meta.is_dir() {
            let mut newest = mtime_nanos(&meta);
            let mut count: u128 = 0;
            if let Ok(entries) = std::fs::read_dir(path) {
                for entry in entries.flatten() {
                    count += 1;
                    if let Ok(m) = entry.metadata() {
                        newest = newest.max(mtime_nanos(&m));
                    }
                }
            }
            newest.wrapping_add(count << 96)
        } else {
            mtime_nanos(&meta).wrapping_add(u128::from(meta.len()) << 96)
        }
    }

    /// Return the cached payload when the fingerprint matches, otherwise
    /// rebuild through `builder` and cache the result.
    pub fn get_or_rebuild(
        &self,
        fingerprint: u128,
        builder: impl FnOnce() -> Result<CatalogPayload>,
    ) -> Result<std::sync::Arc<CatalogPayload>> {
        let Ok(mut guard) = self.inner.lock() else {
            return builder().map(std::sync::Arc::new);
        };
        if let Some((cached_fp, payload)) = guard.as_ref() {
            if *cached_fp == fingerprint {
                return Ok(payload.clone());
            }
        }
        let payload = std::sync::Arc::new(builder()?);
        *guard = Some((fingerprint, payload.clone()));
        Ok(payload)
    }
}
