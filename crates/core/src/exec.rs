// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Subprocess orchestration for external tools (ffmpeg, yt-dlp, engine CLIs).
//!
//! Every external invocation goes through [`ExecSpec`] so that working
//! directory, environment, stdin and timeout are explicit and the error
//! mapping (timeout vs nonzero exit) is testable without mocking a shell.

use crate::error::{HubError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Locate an external binary on `PATH`.
///
/// Absence is an availability condition, not an error: callers surface it as
/// `engine_unavailable` at the point where the tool is actually needed.
pub fn find_tool(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// A fully described subprocess invocation.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl ExecSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            stdin: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn describe(&self) -> String {
        self.program
            .file_name()
            .map_or_else(|| self.program.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Captured output of a finished subprocess.
#[derive(Debug)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ExecOutput {
    pub const fn success(&self) -> bool {
        self.status == 0
    }

    /// A short diagnostic line combining both streams, trimmed for client
    /// consumption.
    pub fn diagnostic(&self) -> String {
        let err = tail(&self.stderr, 400);
        if err.is_empty() {
            tail(&self.stdout, 400)
        } else {
            err
        }
    }
}

/// Keep the last `max` characters of a stream, collapsed to a single line
/// per entry. External tools write progress spinners; only the tail carries
/// the actual failure.
pub fn tail(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let start = trimmed.len() - max;
    // Don't split a UTF-8 char.
    let mut start = start;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

/// Run a subprocess to completion, enforcing the spec's timeout.
///
/// # Errors
///
/// - `timeout` when the wall clock expires (the process is killed);
/// - `engine_unavailable` when the program cannot be spawned;
/// - the raw [`ExecOutput`] is returned for zero *and* nonzero exits so
///   callers decide how a nonzero exit maps (most use [`run_checked`]).
pub async fn run(spec: ExecSpec) -> Result<ExecOutput> {
    let label = spec.describe();
    let timeout = spec.timeout;
    let started = Instant::now();

    let mut command = Command::new(&spec.program);
    command.args(&spec.args).stdout(Stdio::piped()).stderr(Stdio::piped());
    command.stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() });
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    command.kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| HubError::EngineUnavailable(format!("cannot launch '{label}': {e}")))?;

    if let Some(bytes) = spec.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit before consuming stdin; a broken pipe here
            // is reported through the exit status instead.
            let _ = stdin.write_all(&bytes).await;
            drop(stdin);
        }
    }

    let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
    let output = match waited {
        Ok(result) => {
            result.map_err(|e| HubError::Io(format!("waiting for '{label}': {e}")))?
        },
        Err(_) => {
            return Err(HubError::Timeout(format!(
                "'{label}' exceeded {}s",
                timeout.as_secs()
            )));
        },
    };

    let exec = ExecOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        elapsed: started.elapsed(),
    };
    tracing::debug!(
        program = %label,
        status = exec.status,
        elapsed_ms = exec.elapsed.as_millis() as u64,
        "subprocess finished"
    );
    Ok(exec)
}

/// Run a subprocess and map a nonzero exit to `engine_failure`.
pub async fn run_checked(spec: ExecSpec) -> Result<ExecOutput> {
    let label = spec.describe();
    let output = run(spec).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(HubError::EngineFailure(format!(
            "'{label}' exited with status {}: {}",
            output.status,
            output.diagnostic()
        )))
    }
}

/// Snapshot the file names in `dir` matching `predicate`.
///
/// Backends that write into their own working directory are handled by
/// diffing a snapshot taken before launch against the directory contents
/// afterwards; see [`newest_match`] for the fallback.
pub fn snapshot_names(dir: &Path, predicate: impl Fn(&str) -> bool) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if predicate(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// The most recently modified file in `dir` matching `predicate`.
pub fn newest_match(dir: &Path, predicate: impl Fn(&str) -> bool) -> Option<PathBuf> {
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !predicate(&name) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(mtime) = meta.modified() else { continue };
            if best.as_ref().is_none_or(|(t, _)| mtime > *t) {
                best = Some((mtime, entry.path()));
            }
        }
    }
    best.map(|(_, p)| p)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_status() {
        let spec = ExecSpec::new("/bin/sh").args(["-c", "echo out; echo err >&2"]);
        let output = run(spec).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn nonzero_exit_maps_to_engine_failure() {
        let spec = ExecSpec::new("/bin/sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = run_checked(spec).await.unwrap_err();
        assert_eq!(err.kind(), "engine_failure");
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn timeout_kills_and_maps() {
        let spec = ExecSpec::new("/bin/sh")
            .args(["-c", "sleep 5"])
            .timeout(Duration::from_millis(100));
        let err = run(spec).await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn stdin_is_delivered() {
        let spec = ExecSpec::new("/bin/cat").stdin(b"hello".to_vec());
        let output = run(spec).await.unwrap();
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let spec = ExecSpec::new("/nonexistent/tool-xyz");
        let err = run(spec).await.unwrap_err();
        assert_eq!(err.kind(), "engine_unavailable");
    }

    #[test]
    fn tail_keeps_suffix() {
        assert_eq!(tail("  abc  ", 10), "abc");
        assert_eq!(tail("abcdef", 3), "def");
    }

    #[test]
    fn snapshot_diff_finds_new_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.wav"), b"x").unwrap();
        let before = snapshot_names(dir.path(), |n| n.ends_with(".wav"));
        std::fs::write(dir.path().join("b.wav"), b"y").unwrap();
        let after = snapshot_names(dir.path(), |n| n.ends_with(".wav"));
        let fresh: Vec<_> = after.iter().filter(|n| !before.contains(n)).collect();
        assert_eq!(fresh, vec!["b.wav"]);
    }
}
