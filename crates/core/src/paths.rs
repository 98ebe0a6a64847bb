// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Path-scope safety for client-supplied file references.
//!
//! Any path that arrives over the wire (custom voice references, audio
//! namespace lookups) must resolve inside a whitelisted root before it is
//! touched. Rejection is a `bad_request`, not a 404, so scope violations are
//! distinguishable from missing files.

use crate::error::{HubError, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: resolve `.` and `..` components without
/// touching the filesystem, so scope checks also hold for files that do not
/// exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !out.pop() {
                    // Escaping above the root of a relative path; keep the
                    // component so the containment check fails.
                    out.push("..");
                }
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `candidate` (relative or absolute) against `root` and require the
/// result to stay inside `root`.
///
/// # Errors
///
/// `bad_request` when the resolved path escapes the root.
pub fn resolve_within(root: &Path, candidate: &Path) -> Result<PathBuf> {
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = normalize(&joined);
    let root = normalize(root);
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(HubError::BadRequest("path is outside the allowed directory".to_string()))
    }
}

/// Resolve `candidate` against an ordered list of allowed roots, returning
/// the first root it falls under.
pub fn resolve_within_any(roots: &[&Path], candidate: &Path) -> Result<PathBuf> {
    for root in roots {
        if let Ok(resolved) = resolve_within(root, candidate) {
            return Ok(resolved);
        }
    }
    Err(HubError::BadRequest("path is outside the allowed directories".to_string()))
}

/// Turn an arbitrary label into a filesystem-safe slug (`a-z0-9-`).
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if ch == ' ' || ch == '-' || ch == '_' {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        value.to_lowercase()
    } else {
        slug
    }
}

/// Atomically replace `path` with `contents`: write a sibling temp file,
/// then rename over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_stay_inside() {
        let root = Path::new("/srv/voices");
        let ok = resolve_within(root, Path::new("alice/ref.wav")).unwrap();
        assert_eq!(ok, PathBuf::from("/srv/voices/alice/ref.wav"));
    }

    #[test]
    fn dotdot_escape_is_rejected() {
        let root = Path::new("/srv/voices");
        assert!(resolve_within(root, Path::new("../secrets.txt")).is_err());
        assert!(resolve_within(root, Path::new("a/../../b")).is_err());
    }

    #[test]
    fn absolute_path_must_be_under_root() {
        let root = Path::new("/srv/voices");
        assert!(resolve_within(root, Path::new("/etc/passwd")).is_err());
        let ok = resolve_within(root, Path::new("/srv/voices/x.wav")).unwrap();
        assert_eq!(ok, PathBuf::from("/srv/voices/x.wav"));
    }

    #[test]
    fn multiple_roots_tried_in_order() {
        let voices = Path::new("/srv/voices");
        let jobs = Path::new("/srv/out/media_edits/j1");
        let ok =
            resolve_within_any(&[voices, jobs], Path::new("/srv/out/media_edits/j1/region.wav"))
                .unwrap();
        assert!(ok.starts_with(jobs));
        assert!(resolve_within_any(&[voices, jobs], Path::new("/tmp/evil.wav")).is_err());
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Alice Smith (EN)"), "alice-smith-en");
        assert_eq!(slugify("__Bob__"), "bob");
        assert_eq!(slugify("日本語"), "日本語");
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.json");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"two");
        assert!(!target.with_extension("tmp").exists());
    }
}
