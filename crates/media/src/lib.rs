// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The media-edit pipeline for VoxHub: probing and normalization through
//! ffmpeg, URL ingestion with a content-addressed cache, transcription and
//! forced alignment, and the job workspace driving
//! transcribe -> align -> replace -> apply.

pub mod align;
pub mod ffmpeg;
pub mod ingest;
pub mod jobs;
pub mod stt;

pub use ffmpeg::{FfmpegTools, MediaProbe, CANONICAL_RATE};
pub use ingest::{CleanupGate, IngestCache, YtDlp};
pub use jobs::{MediaJobs, ReplaceParams};
pub use stt::{SttProvider, SttSettings, Transcript, Word};
