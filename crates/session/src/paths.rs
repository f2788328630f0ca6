// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config-directory discovery, shared in spirit with the hub crate's
//! identical module (kept independent since the two binaries have no
//! common library dependency).

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

pub fn config_json_path() -> PathBuf {
    config_dir().join("config.json")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NetworkConfig {
    #[serde(rename = "networkingMode", default = "default_mode")]
    pub networking_mode: String,
}

fn default_mode() -> String {
    "local".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { networking_mode: default_mode() }
    }
}

/// Read `config.json`, defaulting to `{"networkingMode":"local"}` on any
/// missing-file or parse error.
pub fn read_network_config() -> NetworkConfig {
    std::fs::read_to_string(config_json_path())
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}
