// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Core building blocks shared by every VoxHub crate: the error taxonomy,
//! the wire types, the subprocess abstraction, path-scope safety, rolling
//! operation stats and the favorites store.

pub mod error;
pub mod exec;
pub mod favorites;
pub mod paths;
pub mod stats;
pub mod types;

pub use error::{HubError, Result};
