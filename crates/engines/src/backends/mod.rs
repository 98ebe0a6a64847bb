// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Concrete engine backends.

pub mod chattts;
pub mod kokoro;
pub mod xtts;

pub use chattts::{ChatTtsEngine, ChatTtsSettings};
pub use kokoro::{KokoroEngine, KokoroSettings};
pub use xtts::{XttsEngine, XttsSettings};
