// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Persistent synthesis profiles ("favorites").
//!
//! A favorite pins an engine + voice + parameter combination under a stable
//! id and a human slug. The dispatcher expands a favorite reference into
//! missing request fields before an engine's `prepare` pass.
//!
//! Storage is a single JSON document, rewritten atomically under a lock.
//! Slugs are kept injective by suffixing (`voice`, `voice-2`, ...).

use crate::error::{HubError, Result};
use crate::paths::{slugify, write_atomic};
use crate::types::now_iso;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

const SCHEMA_VERSION: u32 = 1;
const SLUG_MAX: usize = 60;

/// One stored profile. Optional fields are only meaningful for the engine
/// they belong to (`style` for style-capable engines, `seed` for dialogue
/// sampling, `server_url` for remote cloning).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteProfile {
    pub id: String,
    pub label: String,
    pub engine: String,
    pub voice_id: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_silence: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Incoming create/update payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteInput {
    pub label: Option<String>,
    pub engine: Option<String>,
    pub voice_id: Option<String>,
    pub slug: Option<String>,
    pub language: Option<String>,
    pub speed: Option<f64>,
    pub trim_silence: Option<bool>,
    pub style: Option<String>,
    pub seed: Option<i64>,
    pub server_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub meta: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    schema_version: u32,
    profiles: Vec<FavoriteProfile>,
}

impl Default for Document {
    fn default() -> Self {
        Self { schema_version: SCHEMA_VERSION, profiles: Vec::new() }
    }
}

/// Import behavior: merge into the existing list or replace it wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Merge,
    Replace,
}

pub struct FavoritesStore {
    path: PathBuf,
    lock: Mutex<()>,
}

fn new_id() -> String {
    format!("fav_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

fn unique_slug(wanted: &str, taken: &HashSet<String>) -> String {
    let mut base = slugify(wanted);
    base.truncate(SLUG_MAX);
    let mut candidate = base.clone();
    let mut suffix = 1;
    while taken.contains(&candidate) {
        suffix += 1;
        candidate = format!("{base}-{suffix}");
    }
    candidate
}

impl FavoritesStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    fn read(&self) -> Document {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Document::default(),
        }
    }

    fn write(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(doc)
            .map_err(|e| HubError::Io(format!("serializing favorites: {e}")))?;
        write_atomic(&self.path, &bytes)
    }

    fn slugs(doc: &Document, exclude_id: Option<&str>) -> HashSet<String> {
        doc.profiles
            .iter()
            .filter(|p| exclude_id.is_none_or(|id| p.id != id))
            .map(|p| p.slug.clone())
            .collect()
    }

    /// All profiles, most recently touched first.
    pub fn list(&self) -> Vec<FavoriteProfile> {
        let Ok(_guard) = self.lock.lock() else { return Vec::new() };
        let mut profiles = self.read().profiles;
        profiles.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        profiles
    }

    /// Look a profile up by id, falling back to slug.
    pub fn find(&self, key: &str) -> Option<FavoriteProfile> {
        let Ok(_guard) = self.lock.lock() else { return None };
        let doc = self.read();
        doc.profiles.iter().find(|p| p.id == key || p.slug == key).cloned()
    }

    /// # Errors
    ///
    /// `bad_request` when `label`, `engine` or `voiceId` is missing.
    pub fn create(&self, input: FavoriteInput) -> Result<FavoriteProfile> {
        let label = input
            .label
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HubError::BadRequest("field 'label' is required".to_string()))?
            .to_string();
        let engine = input
            .engine
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HubError::BadRequest("field 'engine' is required".to_string()))?;
        let voice_id = input
            .voice_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HubError::BadRequest("field 'voiceId' is required".to_string()))?
            .to_string();

        let Ok(_guard) = self.lock.lock() else {
            return Err(HubError::Io("favorites store lock poisoned".to_string()));
        };
        let mut doc = self.read();
        let taken = Self::slugs(&doc, None);
        let slug = unique_slug(input.slug.as_deref().unwrap_or(&label), &taken);
        let now = now_iso();
        let profile = FavoriteProfile {
            id: new_id(),
            label,
            engine,
            voice_id,
            slug,
            language: input.language,
            speed: input.speed,
            trim_silence: input.trim_silence,
            style: input.style,
            seed: input.seed,
            server_url: input.server_url,
            tags: input.tags.unwrap_or_default(),
            meta: input.meta.unwrap_or(Value::Null),
            created_at: now.clone(),
            updated_at: now,
        };
        doc.profiles.push(profile.clone());
        self.write(&doc)?;
        Ok(profile)
    }

    /// Patch an existing profile. Returns `not_found` for an unknown id.
    pub fn update(&self, id: &str, patch: FavoriteInput) -> Result<FavoriteProfile> {
        let Ok(_guard) = self.lock.lock() else {
            return Err(HubError::Io("favorites store lock poisoned".to_string()));
        };
        let mut doc = self.read();
        let taken = Self::slugs(&doc, Some(id));
        let Some(profile) = doc.profiles.iter_mut().find(|p| p.id == id) else {
            return Err(HubError::NotFound(format!("favorite '{id}' not found")));
        };

        if let Some(label) = patch.label {
            profile.label = label.trim().to_string();
        }
        if let Some(engine) = patch.engine {
            profile.engine = engine.trim().to_lowercase();
        }
        if let Some(voice_id) = patch.voice_id {
            profile.voice_id = voice_id.trim().to_string();
        }
        if let Some(slug) = patch.slug {
            if !slug.trim().is_empty() {
                profile.slug = unique_slug(&slug, &taken);
            }
        }
        if let Some(language) = patch.language {
            profile.language = Some(language);
        }
        if let Some(speed) = patch.speed {
            profile.speed = Some(speed);
        }
        if let Some(trim) = patch.trim_silence {
            profile.trim_silence = Some(trim);
        }
        if let Some(style) = patch.style {
            profile.style = Some(style);
        }
        if let Some(seed) = patch.seed {
            profile.seed = Some(seed);
        }
        if let Some(url) = patch.server_url {
            profile.server_url = Some(url);
        }
        if let Some(tags) = patch.tags {
            profile.tags = tags;
        }
        if let Some(meta) = patch.meta {
            profile.meta = meta;
        }
        profile.updated_at = now_iso();
        let updated = profile.clone();
        self.write(&doc)?;
        Ok(updated)
    }

    /// Returns `not_found` when nothing was deleted.
    pub fn delete(&self, id: &str) -> Result<()> {
        let Ok(_guard) = self.lock.lock() else {
            return Err(HubError::Io("favorites store lock poisoned".to_string()));
        };
        let mut doc = self.read();
        let before = doc.profiles.len();
        doc.profiles.retain(|p| p.id != id);
        if doc.profiles.len() == before {
            return Err(HubError::NotFound(format!("favorite '{id}' not found")));
        }
        self.write(&doc)
    }

    /// The full document, for the export endpoint.
    pub fn export(&self) -> serde_json::Value {
        let Ok(_guard) = self.lock.lock() else { return Value::Null };
        let doc = self.read();
        serde_json::json!({ "schemaVersion": doc.schema_version, "profiles": doc.profiles })
    }

    /// Import profiles from an exported document. Entries missing label,
    /// engine or voice id are skipped; ids and slugs are re-uniquified.
    /// Returns the number of imported profiles.
    pub fn import(&self, payload: &Value, mode: ImportMode) -> Result<usize> {
        let Some(incoming) = payload.get("profiles").and_then(Value::as_array) else {
            return Ok(0);
        };
        let Ok(_guard) = self.lock.lock() else {
            return Err(HubError::Io("favorites store lock poisoned".to_string()));
        };
        let mut doc = match mode {
            ImportMode::Merge => self.read(),
            ImportMode::Replace => Document::default(),
        };
        let mut ids: HashSet<String> = doc.profiles.iter().map(|p| p.id.clone()).collect();
        let mut slugs = Self::slugs(&doc, None);

        let mut count = 0;
        for entry in incoming {
            let Ok(mut profile) = serde_json::from_value::<FavoriteProfile>(normalize(entry))
            else {
                continue;
            };
            if profile.label.trim().is_empty()
                || profile.engine.trim().is_empty()
                || profile.voice_id.trim().is_empty()
            {
                continue;
            }
            if profile.id.is_empty() || ids.contains(&profile.id) {
                profile.id = new_id();
            }
            let wanted = if profile.slug.trim().is_empty() {
                profile.label.clone()
            } else {
                profile.slug.clone()
            };
            profile.slug = unique_slug(&wanted, &slugs);
            if profile.created_at.is_empty() {
                profile.created_at = now_iso();
            }
            profile.updated_at = now_iso();
            ids.insert(profile.id.clone());
            slugs.insert(profile.slug.clone());
            doc.profiles.push(profile);
            count += 1;
        }
        self.write(&doc)?;
        Ok(count)
    }
}

/// Fill in the fields a [`FavoriteProfile`] requires but an exported entry
/// may omit (slug, timestamps), so deserialization doesn't reject it.
fn normalize(entry: &Value) -> Value {
    let mut entry = entry.clone();
    if let Some(map) = entry.as_object_mut() {
        for key in ["id", "slug", "createdAt", "updatedAt"] {
            map.entry(key).or_insert_with(|| Value::String(String::new()));
        }
    }
    entry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FavoritesStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FavoritesStore::new(dir.path().join("favorites.json"));
        (dir, store)
    }

    fn input(label: &str) -> FavoriteInput {
        FavoriteInput {
            label: Some(label.to_string()),
            engine: Some("kokoro".to_string()),
            voice_id: Some("af_heart".to_string()),
            ..FavoriteInput::default()
        }
    }

    #[test]
    fn create_requires_identity_fields() {
        let (_dir, store) = store();
        let err = store.create(FavoriteInput::default()).unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[test]
    fn slugs_stay_injective() {
        let (_dir, store) = store();
        let a = store.create(input("Warm Narrator")).unwrap();
        let b = store.create(input("Warm Narrator")).unwrap();
        let c = store.create(input("Warm Narrator")).unwrap();
        assert_eq!(a.slug, "warm-narrator");
        assert_eq!(b.slug, "warm-narrator-2");
        assert_eq!(c.slug, "warm-narrator-3");

        let all: HashSet<String> = store.list().into_iter().map(|p| p.slug).collect();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn update_preserves_uniqueness() {
        let (_dir, store) = store();
        let _a = store.create(input("Alpha")).unwrap();
        let b = store.create(input("Beta")).unwrap();
        let patch =
            FavoriteInput { slug: Some("alpha".to_string()), ..FavoriteInput::default() };
        let updated = store.update(&b.id, patch).unwrap();
        assert_eq!(updated.slug, "alpha-2");
    }

    #[test]
    fn find_by_id_or_slug() {
        let (_dir, store) = store();
        let a = store.create(input("Alpha")).unwrap();
        assert_eq!(store.find(&a.id).unwrap().id, a.id);
        assert_eq!(store.find("alpha").unwrap().id, a.id);
        assert!(store.find("missing").is_none());
    }

    #[test]
    fn import_merge_reslugs_collisions() {
        let (_dir, store) = store();
        store.create(input("Alpha")).unwrap();
        let payload = serde_json::json!({
            "schemaVersion": 1,
            "profiles": [
                {"label": "Alpha", "engine": "kokoro", "voiceId": "af_heart", "slug": "alpha"},
                {"label": "", "engine": "kokoro", "voiceId": "x"},
            ]
        });
        let count = store.import(&payload, ImportMode::Merge).unwrap();
        assert_eq!(count, 1);
        let slugs: Vec<String> = store.list().into_iter().map(|p| p.slug).collect();
        assert!(slugs.contains(&"alpha".to_string()));
        assert!(slugs.contains(&"alpha-2".to_string()));
    }

    #[test]
    fn import_replace_drops_existing() {
        let (_dir, store) = store();
        store.create(input("Alpha")).unwrap();
        let payload = serde_json::json!({
            "profiles": [
                {"label": "Beta", "engine": "xtts", "voiceId": "ref-1"},
            ]
        });
        store.import(&payload, ImportMode::Replace).unwrap();
        let all = store.list();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].label, "Beta");
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (_dir, store) = store();
        assert_eq!(store.delete("nope").unwrap_err().kind(), "not_found");
    }
}
