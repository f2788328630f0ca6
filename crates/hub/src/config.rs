// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// Default externally-reachable dashboard port.
pub const DEFAULT_EXTERNAL_PORT: u16 = 7962;

/// Default loopback-only internal control API port.
pub const DEFAULT_INTERNAL_PORT: u16 = 7963;

/// Hub daemon configuration.
///
/// The hub has no end-user-facing flags; it is spawned detached by the
/// session binary's session↔hub client, which reaches it over environment
/// variables only for port overrides.
#[derive(Debug, Clone, Parser)]
#[command(name = "itwillsync-hub", version, about)]
pub struct HubConfig {
    /// Port the dashboard server binds on (externally reachable).
    #[arg(long, env = "ITWILLSYNC_HUB_EXTERNAL_PORT", default_value_t = DEFAULT_EXTERNAL_PORT)]
    pub external_port: u16,

    /// Port the internal control API binds on (loopback only).
    #[arg(long, env = "ITWILLSYNC_HUB_INTERNAL_PORT", default_value_t = DEFAULT_INTERNAL_PORT)]
    pub internal_port: u16,

    /// Registry health-check sweep interval in milliseconds.
    #[arg(long, env = "ITWILLSYNC_HUB_HEALTH_CHECK_MS", default_value_t = 15_000)]
    pub health_check_ms: u64,

    /// Below this elapsed-since-heartbeat, a session is trusted alive
    /// without a process probe.
    #[arg(long, env = "ITWILLSYNC_HUB_HEARTBEAT_FRESH_MS", default_value_t = 20_000)]
    pub heartbeat_fresh_ms: u64,

    /// Elapsed-since-heartbeat threshold past which a still-alive process is
    /// demoted from `active` to `idle`.
    #[arg(long, env = "ITWILLSYNC_HUB_IDLE_AFTER_MS", default_value_t = 30_000)]
    pub idle_after_ms: u64,

    /// Grace period after the registry becomes empty before the hub exits.
    #[arg(long, env = "ITWILLSYNC_HUB_SHUTDOWN_GRACE_MS", default_value_t = 30_000)]
    pub shutdown_grace_ms: u64,

    /// WebSocket keepalive ping interval in milliseconds.
    #[arg(long, env = "ITWILLSYNC_HUB_PING_MS", default_value_t = 30_000)]
    pub ping_interval_ms: u64,

    /// Preview throttle window in milliseconds.
    #[arg(long, env = "ITWILLSYNC_HUB_PREVIEW_THROTTLE_MS", default_value_t = 500)]
    pub preview_throttle_ms: u64,

    /// Rate-limiter block duration in milliseconds once an IP trips the
    /// strike threshold.
    #[arg(long, env = "ITWILLSYNC_HUB_RATE_LIMIT_BLOCK_MS", default_value_t = 60_000)]
    pub rate_limit_block_ms: u64,

    /// Failed-attempt count that trips the rate limiter block.
    #[arg(long, env = "ITWILLSYNC_HUB_RATE_LIMIT_STRIKES", default_value_t = 5)]
    pub rate_limit_strikes: u32,

    /// Log output format: `json` or plain text.
    #[arg(long, env = "ITWILLSYNC_HUB_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    #[arg(long, env = "ITWILLSYNC_HUB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl HubConfig {
    pub fn health_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.health_check_ms)
    }

    pub fn heartbeat_fresh(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_fresh_ms)
    }

    pub fn idle_after(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.idle_after_ms)
    }

    pub fn shutdown_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ping_interval_ms)
    }

    pub fn preview_throttle(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.preview_throttle_ms)
    }

    pub fn rate_limit_block(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rate_limit_block_ms)
    }
}
