// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Route-table tests: the assembled router is exercised in process via
//! `tower::ServiceExt::oneshot`, with engine backends left unavailable
//! (no external binaries exist in the test environment).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use voxhub_server::config::Config;
use voxhub_server::server::create_app;

fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.paths.output_dir = dir.join("out");
    config.paths.frontend_dist = dir.join("dist");
    // Unroutable ports so upstream probes fail fast instead of hanging.
    config.upstreams.ollama_url = "http://127.0.0.1:1".to_string();
    config.upstreams.drawthings_url = "http://127.0.0.1:1".to_string();
    config
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_is_alive_on_both_mounts() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    for uri in ["/health", "/api/health"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }
}

#[tokio::test]
async fn unknown_engine_gets_the_error_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app.oneshot(get("/api/voices?engine=nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn voices_for_unavailable_engine_is_an_empty_payload() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    // No kokoro binary/model exists in the test environment.
    let response = app.oneshot(get("/api/voices?engine=kokoro")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["available"], false);
    assert_eq!(body["count"], 0);
    assert!(body["voices"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn synthesise_without_engines_is_503() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app
        .oneshot(post_json(
            "/api/synthesise",
            serde_json::json!({"text": "hello", "voice": "af_heart"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status"], 503);
}

#[tokio::test]
async fn synthesise_requires_a_json_object() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/synthesise")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn meta_reports_engines_and_categories() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app.oneshot(get("/api/meta")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["api_prefix"], "api");
    assert_eq!(body["default_engine"], "kokoro");
    let engines: Vec<&str> =
        body["engines"].as_array().unwrap().iter().map(|e| e["id"].as_str().unwrap()).collect();
    assert_eq!(engines, vec!["kokoro", "xtts", "chattts"]);
    assert!(body["random_categories"].as_array().unwrap().len() >= 5);
    assert_eq!(body["ollama_available"], false);
}

#[tokio::test]
async fn unknown_media_job_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app
        .oneshot(post_json("/api/media/align", serde_json::json!({"jobId": "deadbeef"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn audio_namespace_rejects_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app.oneshot(get("/audio/..%2F..%2Fetc%2Fpasswd")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audio_serves_artifacts_from_the_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.paths.output_dir).unwrap();
    std::fs::write(config.paths.output_dir.join("clip.wav"), b"RIFFdata").unwrap();
    let (app, _state) = create_app(config);

    let response = app.clone().oneshot(get("/audio/clip.wav")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type =
        response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("audio/"), "got {content_type}");

    let missing = app.oneshot(get("/audio/ghost.wav")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn favorites_crud_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let created = app
        .clone()
        .oneshot(post_json(
            "/api/favorites",
            serde_json::json!({"label": "Warm", "engine": "kokoro", "voiceId": "af_heart"}),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let profile = body_json(created).await;
    assert_eq!(profile["slug"], "warm");
    let id = profile["id"].as_str().unwrap().to_string();

    let listed = app.clone().oneshot(get("/api/favorites")).await.unwrap();
    let list = body_json(listed).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let fetched = app.clone().oneshot(get(&format!("/api/favorites/{id}"))).await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);

    let deleted = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/favorites/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let gone = app.oneshot(get(&format!("/api/favorites/{id}"))).await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn favorites_honor_the_bearer_token() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.auth.favorites_token = Some("sesame".to_string());
    let (app, _state) = create_app(config);

    let denied = app.clone().oneshot(get("/api/favorites")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(denied).await;
    assert_eq!(body["status"], 401);

    let allowed = app
        .oneshot(
            Request::builder()
                .uri("/api/favorites")
                .header(header::AUTHORIZATION, "Bearer sesame")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn random_text_falls_back_to_local_snippets() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app.oneshot(get("/api/random_text?category=news")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["source"], "local");
    assert_eq!(body["category"], "news");
    assert!(!body["text"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn media_stats_start_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app.oneshot(get("/api/media/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["kinds"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn spa_fallback_without_bundle_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = create_app(test_config(dir.path()));

    let response = app.clone().oneshot(get("/some/client/route")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");

    // API-shaped misses stay JSON 404s.
    let api_miss = app.oneshot(get("/api/definitely_not_a_route")).await.unwrap();
    assert_eq!(api_miss.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn spa_fallback_serves_the_bundle_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.paths.frontend_dist).unwrap();
    std::fs::write(config.paths.frontend_dist.join("index.html"), b"<html>app</html>").unwrap();
    let (app, _state) = create_app(config);

    let response = app.oneshot(get("/editor")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"<html>app</html>");
}

#[tokio::test]
async fn chattts_preset_creation_via_http() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.engines.chattts.presets_dir = dir.path().join("presets");
    let (app, _state) = create_app(config);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chattts/presets",
            serde_json::json!({"label": "Calm Host", "speaker": "spk_abc", "seed": 7}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["id"], "calm-host");

    let duplicate = app
        .oneshot(post_json(
            "/api/chattts/presets",
            serde_json::json!({"label": "Calm Host", "speaker": "spk_zzz"}),
        ))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}
