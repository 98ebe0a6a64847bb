// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for VoxHub.
//!
//! Every user-facing failure carries a wire kind that maps 1:1 onto an HTTP
//! status code. Handlers propagate [`HubError`] with `?`; the HTTP layer
//! renders it as the JSON envelope `{"error": ..., "status": ...}`.

use thiserror::Error;

/// Main error type for VoxHub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// Request validation failed (missing field, bad value, malformed region).
    #[error("{0}")]
    BadRequest(String),

    /// Bearer token missing or wrong for a protected route.
    #[error("{0}")]
    Unauthorized(String),

    /// Entity does not exist (job, favorite, voice, artifact).
    #[error("{0}")]
    NotFound(String),

    /// Write conflicted with existing state.
    #[error("{0}")]
    Conflict(String),

    /// A backend (or external tool it needs) is not present right now.
    ///
    /// Availability is probed per request and never cached, so this is a
    /// transient condition from the client's point of view.
    #[error("{0}")]
    EngineUnavailable(String),

    /// A backend ran but failed: nonzero exit, bad remote response,
    /// missing output artifact.
    #[error("{0}")]
    EngineFailure(String),

    /// A subprocess or upstream call exceeded its wall-clock budget.
    #[error("{0}")]
    Timeout(String),

    /// The operation exists in the API surface but has no implementation
    /// for the selected backend.
    #[error("{0}")]
    NotImplemented(String),

    /// Local I/O failure (file read/write, pipe). Reported as a 500 without
    /// leaking server-side paths beyond what the message already carries.
    #[error("I/O failure: {0}")]
    Io(String),
}

/// Convenience type alias for Results using [`HubError`].
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// The wire tag used in logs and client-side error handling.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::EngineUnavailable(_) => "engine_unavailable",
            Self::EngineFailure(_) => "engine_failure",
            Self::Timeout(_) => "timeout",
            Self::NotImplemented(_) => "not_implemented",
            Self::Io(_) => "io_failure",
        }
    }

    /// The HTTP status code this error renders as.
    pub const fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::EngineUnavailable(_) => 503,
            Self::EngineFailure(_) | Self::Io(_) => 500,
            Self::Timeout(_) => 504,
            Self::NotImplemented(_) => 501,
        }
    }

    /// Carry an upstream HTTP status through unchanged (remote engine and
    /// proxy passthrough). Statuses without a dedicated kind collapse into
    /// `engine_failure`.
    pub fn from_upstream_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            501 => Self::NotImplemented(message),
            503 => Self::EngineUnavailable(message),
            504 => Self::Timeout(message),
            _ => Self::EngineFailure(message),
        }
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("invalid JSON payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(HubError::BadRequest(String::new()).status(), 400);
        assert_eq!(HubError::Unauthorized(String::new()).status(), 401);
        assert_eq!(HubError::NotFound(String::new()).status(), 404);
        assert_eq!(HubError::Conflict(String::new()).status(), 409);
        assert_eq!(HubError::EngineUnavailable(String::new()).status(), 503);
        assert_eq!(HubError::EngineFailure(String::new()).status(), 500);
        assert_eq!(HubError::Timeout(String::new()).status(), 504);
        assert_eq!(HubError::NotImplemented(String::new()).status(), 501);
        assert_eq!(HubError::Io(String::new()).status(), 500);
    }

    #[test]
    fn upstream_status_roundtrip() {
        let err = HubError::from_upstream_status(404, "model not found");
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.status(), 404);

        let err = HubError::from_upstream_status(502, "bad gateway");
        assert_eq!(err.kind(), "engine_failure");
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HubError = io_err.into();
        assert_eq!(err.kind(), "io_failure");
        assert!(err.to_string().contains("gone"));
    }
}
