// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Upstream proxies: the ollama LLM API (streaming and plain) and the
//! DrawThings image API, plus the one-shot Telegram draw endpoint.
//!
//! Streaming endpoints translate upstream NDJSON into SSE through
//! [`crate::sse::relay_response`]. Non-streaming calls force
//! `stream: false` into the payload and pass the body through verbatim.

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::time::Duration;
use voxhub_core::exec::{find_tool, run, ExecSpec};
use voxhub_core::HubError;

use crate::error::{ApiError, ApiResult};
use crate::sse::relay_response;
use crate::state::AppState;

/// Ollama model inventory, tolerating both known response shapes.
pub struct OllamaModels {
    pub models: Vec<String>,
    pub url: String,
    pub error: Option<String>,
}

pub async fn list_ollama_models(state: &AppState) -> OllamaModels {
    let url = state.config.upstreams.ollama_url.trim_end_matches('/').to_string();
    let result = state
        .http
        .get(format!("{url}/api/tags"))
        .timeout(Duration::from_secs(10))
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() => {
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            let list = payload
                .get("models")
                .or_else(|| payload.get("data"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let models = list
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect();
            OllamaModels { models, url, error: None }
        },
        Ok(response) => OllamaModels {
            models: Vec::new(),
            url,
            error: Some(format!("upstream returned {}", response.status())),
        },
        Err(e) => OllamaModels { models: Vec::new(), url, error: Some(e.to_string()) },
    }
}

/// `GET /ollama_models`
pub async fn ollama_models(State(state): State<AppState>) -> Response {
    let info = list_ollama_models(&state).await;
    let status =
        if info.models.is_empty() { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
    let mut payload = serde_json::json!({
        "models": info.models,
        "url": info.url,
        "available": status == StatusCode::OK,
    });
    if let Some(error) = info.error {
        payload["error"] = Value::String(error);
    }
    (status, Json(payload)).into_response()
}

fn ollama_url(state: &AppState, suffix: &str) -> String {
    format!("{}/api/{suffix}", state.config.upstreams.ollama_url.trim_end_matches('/'))
}

/// Pass an upstream response through verbatim (status, content type, body).
async fn passthrough(upstream: reqwest::Response) -> Response {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let body = upstream.bytes().await.unwrap_or_default();
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

fn upstream_unreachable(e: &reqwest::Error) -> ApiError {
    ApiError(HubError::EngineUnavailable(format!("upstream unreachable: {e}")))
}

/// `GET /ollama/tags` and `GET /ollama/ps` pass straight through.
pub async fn ollama_get(
    State(state): State<AppState>,
    UrlPath(op): UrlPath<String>,
) -> ApiResult<Response> {
    if op != "tags" && op != "ps" {
        return Err(ApiError(HubError::NotFound(format!("unknown ollama operation '{op}'"))));
    }
    let upstream = state
        .http
        .get(ollama_url(&state, &op))
        .send()
        .await
        .map_err(|e| upstream_unreachable(&e))?;
    Ok(passthrough(upstream).await)
}

/// `POST /ollama/{generate,chat,pull,show}`: SSE relay when the payload
/// streams (the upstream default), verbatim pass-through otherwise.
pub async fn ollama_post(
    State(state): State<AppState>,
    UrlPath(op): UrlPath<String>,
    Json(mut payload): Json<Value>,
) -> ApiResult<Response> {
    let streaming_default = matches!(op.as_str(), "generate" | "chat" | "pull");
    if !matches!(op.as_str(), "generate" | "chat" | "pull" | "show") {
        return Err(ApiError(HubError::NotFound(format!("unknown ollama operation '{op}'"))));
    }

    let wants_stream = payload
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(streaming_default);
    if !wants_stream {
        if let Some(map) = payload.as_object_mut() {
            map.insert("stream".to_string(), Value::Bool(false));
        }
    }

    let upstream = state
        .http
        .post(ollama_url(&state, &op))
        .json(&payload)
        .send()
        .await
        .map_err(|e| upstream_unreachable(&e))?;

    if wants_stream && upstream.status().is_success() {
        Ok(relay_response(upstream))
    } else {
        Ok(passthrough(upstream).await)
    }
}

/// True when a CLI error message means the model was already gone.
fn is_not_found_message(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("not found") || lowered.contains("no such")
}

/// `POST /ollama/delete`: DELETE upstream, with a CLI fallback for
/// servers that predate the HTTP delete API.
pub async fn ollama_delete(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Response> {
    let model = payload
        .get("name")
        .or_else(|| payload.get("model"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| ApiError(HubError::BadRequest("field 'name' is required".to_string())))?;

    let upstream = state
        .http
        .delete(ollama_url(&state, "delete"))
        .json(&serde_json::json!({"name": model}))
        .send()
        .await;

    match upstream {
        Ok(response)
            if matches!(response.status().as_u16(), 404 | 405)
                && state.config.upstreams.allow_cli_fallback =>
        {
            delete_via_cli(&model).await
        },
        Ok(response) => Ok(passthrough(response).await),
        Err(_) if state.config.upstreams.allow_cli_fallback => delete_via_cli(&model).await,
        Err(e) => Err(upstream_unreachable(&e)),
    }
}

async fn delete_via_cli(model: &str) -> ApiResult<Response> {
    let Some(binary) = find_tool("ollama") else {
        return Err(ApiError(HubError::EngineUnavailable(
            "ollama CLI not found for delete fallback".to_string(),
        )));
    };
    let spec = ExecSpec::new(binary)
        .args(["rm", model])
        .timeout(Duration::from_secs(60));
    let output = run(spec).await?;
    // "already deleted" counts as success for an idempotent delete.
    if output.success() || is_not_found_message(&output.diagnostic()) {
        Ok(Json(serde_json::json!({"deleted": model, "via": "cli"})).into_response())
    } else {
        Err(ApiError(HubError::EngineFailure(format!(
            "ollama rm failed: {}",
            output.diagnostic()
        ))))
    }
}

fn drawthings_url(state: &AppState, suffix: &str) -> String {
    format!(
        "{}/sdapi/v1/{suffix}",
        state.config.upstreams.drawthings_url.trim_end_matches('/')
    )
}

/// `GET /drawthings/{models,samplers}`
pub async fn drawthings_get(
    State(state): State<AppState>,
    UrlPath(op): UrlPath<String>,
) -> ApiResult<Response> {
    let suffix = match op.as_str() {
        "models" => "sd-models",
        "samplers" => "samplers",
        _ => {
            return Err(ApiError(HubError::NotFound(format!(
                "unknown drawthings operation '{op}'"
            ))));
        },
    };
    let upstream = state
        .http
        .get(drawthings_url(&state, suffix))
        .send()
        .await
        .map_err(|e| upstream_unreachable(&e))?;
    Ok(passthrough(upstream).await)
}

/// Decode the base64 `images[]` of a generation response into files and
/// rewrite them as local URLs.
async fn materialize_images(state: &AppState, payload: &mut Value) -> ApiResult<Vec<String>> {
    let images_dir = state.config.paths.output_dir.join("images").join("drawthings");
    tokio::fs::create_dir_all(&images_dir).await?;

    let encoded: Vec<String> = payload
        .get("images")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter().filter_map(Value::as_str).map(ToString::to_string).collect()
        })
        .unwrap_or_default();

    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut urls = Vec::with_capacity(encoded.len());
    for (index, image) in encoded.iter().enumerate() {
        let bytes = base64_decode(image).ok_or_else(|| {
            ApiError(HubError::EngineFailure("upstream returned undecodable image".to_string()))
        })?;
        let name = format!("{ts}-{index}.png");
        tokio::fs::write(images_dir.join(&name), &bytes).await?;
        urls.push(format!("/image/drawthings/{name}"));
    }
    if let Some(map) = payload.as_object_mut() {
        map.insert("images".to_string(), serde_json::json!(urls));
    }
    Ok(urls)
}

/// `POST /drawthings/{txt2img,img2img}`: JSON pass-through with image
/// artifacts rewritten into the local namespace.
pub async fn drawthings_generate(
    State(state): State<AppState>,
    UrlPath(op): UrlPath<String>,
    Json(payload): Json<Value>,
) -> ApiResult<Response> {
    if op != "txt2img" && op != "img2img" {
        return Err(ApiError(HubError::NotFound(format!(
            "unknown drawthings operation '{op}'"
        ))));
    }
    let upstream = state
        .http
        .post(drawthings_url(&state, &op))
        .json(&payload)
        .send()
        .await
        .map_err(|e| upstream_unreachable(&e))?;

    let status = upstream.status().as_u16();
    if status != 200 {
        return Ok(passthrough(upstream).await);
    }
    let mut body: Value = upstream
        .json()
        .await
        .map_err(|e| ApiError(HubError::EngineFailure(format!("bad upstream response: {e}"))))?;
    materialize_images(&state, &mut body).await?;
    Ok(Json(body).into_response())
}

#[derive(Debug, serde::Deserialize)]
pub struct TelegramDrawRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub steps: Option<u32>,
}

/// `POST /telegram/draw`: prompt in, a single PNG back.
pub async fn telegram_draw(
    State(state): State<AppState>,
    Json(request): Json<TelegramDrawRequest>,
) -> ApiResult<Response> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError(HubError::BadRequest("field 'prompt' is required".to_string())));
    }
    let payload = serde_json::json!({
        "prompt": request.prompt,
        "negative_prompt": request.negative_prompt.unwrap_or_default(),
        "steps": request.steps.unwrap_or(20),
        "width": 512,
        "height": 512,
    });
    let upstream = state
        .http
        .post(drawthings_url(&state, "txt2img"))
        .json(&payload)
        .send()
        .await
        .map_err(|e| upstream_unreachable(&e))?;
    let status = upstream.status().as_u16();
    if status != 200 {
        let body = upstream.text().await.unwrap_or_default();
        return Err(ApiError(HubError::from_upstream_status(
            status,
            voxhub_core::exec::tail(&body, 300),
        )));
    }
    let body: Value = upstream
        .json()
        .await
        .map_err(|e| ApiError(HubError::EngineFailure(format!("bad upstream response: {e}"))))?;
    let image = body
        .get("images")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .and_then(base64_decode)
        .ok_or_else(|| {
            ApiError(HubError::EngineFailure("upstream returned no image".to_string()))
        })?;
    Ok(([(header::CONTENT_TYPE, "image/png")], image).into_response())
}

/// Image payloads arrive standard-alphabet encoded, padded or not.
fn base64_decode(input: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned))
        .ok()
}
