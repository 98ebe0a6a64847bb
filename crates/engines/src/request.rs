// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Request validation and coercion shared by every backend's `prepare` pass.
//!
//! Clients are loose with types (speed as string, language in any case);
//! this module is where those get pinned down. Language canonicalization:
//! the wire format is a lower-cased BCP-47-ish tag; each backend owns the
//! conversion to its internal token (kokoro bank letters, XTTS ISO-639-1).

use serde_json::Value;
use voxhub_core::types::RawSynthRequest;
use voxhub_core::{HubError, Result};

/// Extract and require non-empty `text`.
pub fn require_text(raw: &RawSynthRequest) -> Result<String> {
    raw.text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| HubError::BadRequest("field 'text' is required".to_string()))
}

/// Extract and require a voice identity.
pub fn require_voice(raw: &RawSynthRequest) -> Result<String> {
    raw.voice
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| HubError::BadRequest("field 'voice' is required".to_string()))
}

/// Coerce a JSON number-or-string into a speed within `(0, max]`.
pub fn coerce_speed(value: Option<&Value>, default: f64, max: f64) -> Result<f64> {
    let speed = match value {
        None | Some(Value::Null) => default,
        Some(v) => coerce_f64(v)
            .ok_or_else(|| HubError::BadRequest("field 'speed' must be numeric".to_string()))?,
    };
    if speed.is_finite() && speed > 0.0 && speed <= max {
        Ok(speed)
    } else {
        Err(HubError::BadRequest(format!("field 'speed' must be in (0, {max}]")))
    }
}

/// Lower-case a language tag, defaulting when absent.
pub fn normalize_language(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| default.to_string(), str::to_lowercase)
}

/// The base subtag of a BCP-47-ish language tag (`en-us` -> `en`).
pub fn language_base(tag: &str) -> String {
    tag.split(['-', '_']).next().unwrap_or(tag).to_lowercase()
}

/// Tolerant float coercion: JSON numbers and numeric strings.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Tolerant integer coercion: JSON numbers and numeric strings.
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Enforce membership in an enumeration, case-insensitively. Returns the
/// canonical member.
pub fn require_member<'a>(value: &str, allowed: &[&'a str], field: &str) -> Result<&'a str> {
    let lowered = value.to_lowercase();
    allowed.iter().find(|m| **m == lowered).copied().ok_or_else(|| {
        HubError::BadRequest(format!(
            "field '{field}' must be one of: {}",
            allowed.join(", ")
        ))
    })
}
