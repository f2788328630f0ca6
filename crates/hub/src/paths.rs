// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config-directory discovery, mirrored from the session crate's identical
//! module (kept independent since the two binaries share no common library
//! dependency).

use std::path::PathBuf;

/// `$ITWILLSYNC_CONFIG_DIR` if set, else `$HOME/.itwillsync`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ITWILLSYNC_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    home_dir().join(".itwillsync")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

pub fn hub_pid_path() -> PathBuf {
    config_dir().join("hub.pid")
}

pub fn hub_json_path() -> PathBuf {
    config_dir().join("hub.json")
}
