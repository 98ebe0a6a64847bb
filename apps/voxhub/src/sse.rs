// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The streaming relay primitive: upstream newline-delimited JSON in,
//! Server-Sent Events out.
//!
//! The first frame (`{"status": "starting"}`) goes out before the first
//! upstream byte arrives so clients can detect liveness immediately. Each
//! upstream line becomes one `data:` frame; blank lines are skipped. There
//! is no server-side timeout; the client owns the connection lifetime.

use axum::http::{header, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;

/// Build the SSE response for an upstream streaming response.
pub fn relay_response(upstream: reqwest::Response) -> Response {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(32);

    tokio::spawn(async move {
        if tx.send(Ok(Event::default().data(r#"{"status": "starting"}"#))).await.is_err() {
            return;
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut body = upstream.bytes_stream();
        while let Some(chunk) = body.next().await {
            let Ok(chunk) = chunk else {
                tracing::debug!("upstream stream ended with error");
                break;
            };
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if !forward_line(&tx, &line).await {
                    return;
                }
            }
        }
        // Whatever remains after the upstream closes is one final frame.
        let tail = std::mem::take(&mut buffer);
        let _ = forward_line(&tx, &tail).await;
    });

    let sse = Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));
    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // Tells buffering reverse proxies (nginx) to pass frames through.
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Forward one raw line as an SSE frame; blank lines are dropped. Returns
/// false once the client is gone.
async fn forward_line(
    tx: &tokio::sync::mpsc::Sender<Result<Event, Infallible>>,
    raw: &[u8],
) -> bool {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    tx.send(Ok(Event::default().data(line.to_string()))).await.is_ok()
}
