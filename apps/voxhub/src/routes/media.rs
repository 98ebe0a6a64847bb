// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media-edit endpoints: transcribe, align, replace, apply, probe,
//! estimate and the rolling stats summary.

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use voxhub_core::HubError;
use voxhub_media::ingest::cache_key;
use voxhub_media::jobs::{
    AlignRegionResponse, AlignResponse, ApplyResponse, ReplaceResponse, TranscribeResponse,
};
use voxhub_media::{MediaProbe, ReplaceParams};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Pull the uploaded media field out of a multipart body and stage it
/// under the output directory.
async fn stage_upload(state: &AppState, mut multipart: Multipart) -> ApiResult<(PathBuf, String)> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name != "file" && name != "media" {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.bin").to_string();
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError(HubError::BadRequest("uploaded file is empty".to_string())));
        }
        let staging = state.config.paths.output_dir.join("uploads");
        tokio::fs::create_dir_all(&staging).await?;
        let staged = staging.join(format!(".stage-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&staged, &bytes).await?;
        return Ok((staged, filename));
    }
    Err(ApiError(HubError::BadRequest("multipart field 'file' is required".to_string())))
}

#[derive(Debug, Deserialize)]
struct UrlSourceRequest {
    #[serde(default)]
    source: Option<String>,
    url: String,
}

/// Download a URL source through the ingest cache.
async fn stage_url(state: &AppState, request: &UrlSourceRequest) -> ApiResult<(PathBuf, String)> {
    if let Some(source) = &request.source {
        if source != "youtube" {
            return Err(ApiError(HubError::BadRequest(format!(
                "unsupported source '{source}'"
            ))));
        }
    }
    let ytdlp = state.ytdlp.clone();
    let url = request.url.clone();
    let path = state
        .ingest
        .resolve_or_download(&url, |template| {
            let ytdlp = ytdlp.clone();
            let url = url.clone();
            async move { ytdlp.download_audio(&url, &template).await }
        })
        .await?;

    // Metadata is a best-effort sidecar; the download is already on disk.
    let id = cache_key(&request.url);
    if state.ingest.load_metadata(&id).is_none() {
        if let Ok(blob) = state.ytdlp.fetch_metadata(&request.url).await {
            let _ = state.ingest.save_metadata(&id, &blob);
        }
    }

    let filename =
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    Ok((path, filename))
}

/// `POST /media/transcribe`: multipart upload or `{source, url}` JSON.
pub async fn transcribe(
    State(state): State<AppState>,
    request: Request<Body>,
) -> ApiResult<Json<TranscribeResponse>> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let (staged, filename, cleanup) = if content_type.starts_with("multipart/") {
        let multipart = Multipart::from_request(request, &state).await.map_err(|e| {
            ApiError(HubError::BadRequest(format!("invalid multipart payload: {e}")))
        })?;
        let (path, name) = stage_upload(&state, multipart).await?;
        (path, name, true)
    } else {
        let Json(body): Json<UrlSourceRequest> =
            Json::from_request(request, &state).await.map_err(|e| {
                ApiError(HubError::BadRequest(format!("invalid JSON payload: {e}")))
            })?;
        let (path, name) = stage_url(&state, &body).await?;
        (path, name, false)
    };

    let result = state.jobs.transcribe(&staged, &filename).await;
    if cleanup {
        let _ = tokio::fs::remove_file(&staged).await;
    }
    state.maybe_cleanup();
    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_id: String,
}

/// `POST /media/align`
pub async fn align(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> ApiResult<Json<AlignResponse>> {
    Ok(Json(state.jobs.align(&request.job_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignRegionRequest {
    pub job_id: String,
    pub start: f64,
    pub end: f64,
    #[serde(default = "default_margin")]
    pub margin: f64,
}

const fn default_margin() -> f64 {
    0.5
}

/// `POST /media/align_region`
pub async fn align_region(
    State(state): State<AppState>,
    Json(request): Json<AlignRegionRequest>,
) -> ApiResult<Json<AlignRegionResponse>> {
    let response = state
        .jobs
        .align_region(&request.job_id, request.start, request.end, request.margin)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePreviewRequest {
    pub job_id: String,
    #[serde(flatten)]
    pub params: ReplaceParams,
}

/// `POST /media/replace_preview`
pub async fn replace_preview(
    State(state): State<AppState>,
    Json(request): Json<ReplacePreviewRequest>,
) -> ApiResult<Json<ReplaceResponse>> {
    let response = state
        .jobs
        .replace_preview(&request.job_id, request.params, &state.dispatcher)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub job_id: String,
    #[serde(default)]
    pub format: Option<String>,
}

/// `POST /media/apply`
pub async fn apply(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> ApiResult<Json<ApplyResponse>> {
    Ok(Json(state.jobs.apply(&request.job_id, request.format.as_deref()).await?))
}

/// `POST /media/probe`: multipart probe without creating a job.
pub async fn probe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<MediaProbe>> {
    let (staged, _) = stage_upload(&state, multipart).await?;
    let result = state.ffmpeg.probe(&staged).await;
    let _ = tokio::fs::remove_file(&staged).await;
    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    pub url: String,
}

/// `POST /media/estimate`: duration and metadata for a URL without
/// downloading the media.
pub async fn estimate(
    State(state): State<AppState>,
    Json(request): Json<EstimateRequest>,
) -> ApiResult<Json<Value>> {
    let id = cache_key(&request.url);
    let (blob, cached) = match state.ingest.load_metadata(&id) {
        Some(blob) => (blob, true),
        None => {
            let blob = state.ytdlp.fetch_metadata(&request.url).await?;
            let _ = state.ingest.save_metadata(&id, &blob);
            (blob, false)
        },
    };
    Ok(Json(serde_json::json!({
        "id": id,
        "duration": blob.get("duration").and_then(Value::as_f64),
        "title": blob.get("title").and_then(Value::as_str),
        "uploader": blob.get("uploader").and_then(Value::as_str),
        "cached": cached,
        "audio_cached": state.ingest.find_cached(&id).is_some(),
    })))
}

/// `GET /media/stats`: aggregate ETA info per operation kind.
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let summary = state.stats.summary();
    Ok(Json(serde_json::json!({ "kinds": summary })))
}
