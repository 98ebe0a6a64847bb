// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Speech-synthesis engines for VoxHub.
//!
//! The [`registry::EngineRegistry`] holds every configured backend behind
//! the [`registry::SynthEngine`] trait; the [`dispatcher::Dispatcher`]
//! drives `prepare` -> `synthesize` with favorite expansion and
//! availability gating. Catalogs, preview clips and auditions build on the
//! same machinery.

pub mod audition;
pub mod backends;
pub mod catalog;
pub mod dispatcher;
pub mod previews;
pub mod registry;
pub mod request;

pub use dispatcher::{DispatchOptions, Dispatcher};
pub use previews::PreviewCache;
pub use registry::{EngineDescriptor, EngineMeta, EngineRegistry, PrepareContext, SynthEngine};
