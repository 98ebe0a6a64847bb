// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The HTTP error envelope.
//!
//! Every handler returns `Result<_, ApiError>`; a [`voxhub_core::HubError`]
//! converts into the JSON body `{"error": <message>, "status": <code>}`
//! with a matching HTTP status. Unexpected failure modes (multipart
//! decoding, body limits) are folded into the same envelope.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use voxhub_core::HubError;

#[derive(Debug)]
pub struct ApiError(pub HubError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            tracing::debug!(kind = self.0.kind(), error = %self.0, "request rejected");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "status": self.0.status(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self(HubError::BadRequest(format!("invalid multipart payload: {err}")))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self(HubError::Io(err.to_string()))
    }
}

/// Convenience alias used by every handler.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_kind_status() {
        let response = ApiError(HubError::EngineUnavailable("kokoro down".to_string()))
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
