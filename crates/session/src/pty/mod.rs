// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY supervisor: the only platform-specific dependency in this crate.
//!
//! Spawns a single child process on a pseudo-terminal and exposes a
//! transport-agnostic byte stream plus resize/kill controls. The session
//! server never touches `nix`/`libc` directly.

pub mod nbio;
pub mod spawn;

pub use spawn::{ExitStatus, PtySupervisor};
