// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Custom cloning references: upload or URL-source a clip, validate it
//! into a canonical WAV inside the voice directory, and manage the sidecar
//! metadata.

use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use voxhub_core::paths::slugify;
use voxhub_core::HubError;
use voxhub_engines::catalog::{reference_profiles, sidecar_path};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Fields accepted alongside the clip (multipart form or JSON).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomVoiceFields {
    label: Option<String>,
    url: Option<String>,
    language: Option<String>,
    gender: Option<String>,
    notes: Option<String>,
    tags: Option<Vec<String>>,
}

/// Locate a reference clip by catalog id.
fn find_reference(state: &AppState, id: &str) -> ApiResult<(PathBuf, Value)> {
    let profiles = reference_profiles(state.xtts.voices_dir(), |voice_id| {
        state.previews.url_for("xtts", voice_id, "en")
    });
    let profile = profiles
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| ApiError(HubError::NotFound(format!("custom voice '{id}' not found"))))?;
    let path = profile
        .raw
        .get("referencePath")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| ApiError(HubError::Io("catalog entry has no path".to_string())))?;
    let profile_json = serde_json::to_value(&profile)
        .map_err(|e| ApiError(HubError::Io(e.to_string())))?;
    Ok((path, profile_json))
}

fn write_sidecar(reference: &std::path::Path, fields: &CustomVoiceFields) -> ApiResult<()> {
    let mut body = serde_json::Map::new();
    if let Some(label) = &fields.label {
        body.insert("label".to_string(), Value::String(label.clone()));
    }
    if let Some(language) = &fields.language {
        body.insert("language".to_string(), Value::String(language.to_lowercase()));
    }
    if let Some(gender) = &fields.gender {
        body.insert("gender".to_string(), Value::String(gender.to_lowercase()));
    }
    if let Some(notes) = &fields.notes {
        body.insert("notes".to_string(), Value::String(notes.clone()));
    }
    if let Some(tags) = &fields.tags {
        body.insert(
            "tags".to_string(),
            Value::Array(tags.iter().map(|t| Value::String(t.clone())).collect()),
        );
    }
    if body.is_empty() {
        return Ok(());
    }
    let bytes = serde_json::to_vec_pretty(&Value::Object(body))
        .map_err(|e| ApiError(HubError::Io(e.to_string())))?;
    voxhub_core::paths::write_atomic(&sidecar_path(reference), &bytes)?;
    Ok(())
}

/// `POST /xtts/custom_voice`: multipart upload (`file` + fields) or a
/// JSON body with a `url` to download.
pub async fn create(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut fields = CustomVoiceFields::default();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload.wav").to_string();
                upload = Some((filename, field.bytes().await?.to_vec()));
            },
            "label" => fields.label = Some(field.text().await?),
            "url" => fields.url = Some(field.text().await?),
            "language" => fields.language = Some(field.text().await?),
            "gender" => fields.gender = Some(field.text().await?),
            "notes" => fields.notes = Some(field.text().await?),
            "tags" => {
                let raw = field.text().await?;
                fields.tags = Some(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(ToString::to_string)
                        .collect(),
                );
            },
            _ => {},
        }
    }

    // Source bytes: the uploaded file, or a downloaded URL.
    let (source_name, bytes) = match (upload, &fields.url) {
        (Some(upload), _) => upload,
        (None, Some(url)) => {
            let response = state.http.get(url).send().await.map_err(|e| {
                ApiError(HubError::BadRequest(format!("cannot download reference: {e}")))
            })?;
            if !response.status().is_success() {
                return Err(ApiError(HubError::BadRequest(format!(
                    "reference download returned {}",
                    response.status()
                ))));
            }
            let name = url.rsplit('/').next().unwrap_or("reference.wav").to_string();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ApiError(HubError::Io(e.to_string())))?
                .to_vec();
            (name, bytes)
        },
        (None, None) => {
            return Err(ApiError(HubError::BadRequest(
                "provide a 'file' upload or a 'url'".to_string(),
            )));
        },
    };
    if bytes.is_empty() {
        return Err(ApiError(HubError::BadRequest("reference clip is empty".to_string())));
    }

    let voices_dir = state.xtts.voices_dir().to_path_buf();
    tokio::fs::create_dir_all(&voices_dir).await?;

    // Stage the raw bytes, then validate/normalize into the final WAV.
    let stem = fields
        .label
        .as_deref()
        .map(slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            slugify(
                std::path::Path::new(&source_name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("custom-voice"),
            )
        });
    let staged = voices_dir.join(format!(".upload-{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&staged, &bytes).await?;

    let mut target = voices_dir.join(format!("{stem}.wav"));
    let mut suffix = 1;
    while target.exists() {
        suffix += 1;
        target = voices_dir.join(format!("{stem}-{suffix}.wav"));
    }

    let normalized = state.ffmpeg.normalize_to_wav(&staged, &target, None, None).await;
    let _ = tokio::fs::remove_file(&staged).await;
    normalized.map_err(|e| match e {
        HubError::Io(msg) => {
            ApiError(HubError::BadRequest(format!("not a decodable audio clip: {msg}")))
        },
        other => ApiError(other),
    })?;

    write_sidecar(&target, &fields)?;

    let id = target
        .file_stem()
        .and_then(|s| s.to_str())
        .map(slugify)
        .unwrap_or_else(|| stem.clone());
    let (_, profile) = find_reference(&state, &id)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// `GET /xtts/custom_voice/{id}`
pub async fn get(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<Value>> {
    let (_, profile) = find_reference(&state, &id)?;
    Ok(Json(profile))
}

/// `PATCH /xtts/custom_voice/{id}`: merge sidecar metadata.
pub async fn update(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Value>> {
    let (path, _) = find_reference(&state, &id)?;
    let sidecar = sidecar_path(&path);

    let mut merged = std::fs::read(&sidecar)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let Some(patch_map) = patch.as_object() else {
        return Err(ApiError(HubError::BadRequest("patch must be a JSON object".to_string())));
    };
    for key in ["label", "language", "gender", "notes", "tags", "accent"] {
        if let Some(value) = patch_map.get(key) {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.to_string(), value.clone());
            }
        }
    }
    voxhub_core::paths::write_atomic(
        &sidecar,
        &serde_json::to_vec_pretty(&Value::Object(merged))
            .map_err(|e| ApiError(HubError::Io(e.to_string())))?,
    )?;

    let (_, profile) = find_reference(&state, &id)?;
    Ok(Json(profile))
}

/// `DELETE /xtts/custom_voice/{id}`: remove the clip and its sidecar.
pub async fn delete(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<Value>> {
    let (path, _) = find_reference(&state, &id)?;
    tokio::fs::remove_file(&path).await?;
    // The sidecar may never have existed.
    let _ = tokio::fs::remove_file(sidecar_path(&path)).await;
    Ok(Json(serde_json::json!({"deleted": id})))
}
