// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// Default starting port for a session server; the bind loop scans upward
/// from here until it finds a free one.
pub const DEFAULT_START_PORT: u16 = 7964;

/// Default internal (loopback-only) hub control port.
pub const DEFAULT_HUB_INTERNAL_PORT: u16 = 7963;

/// Default externally-reachable hub dashboard port.
pub const DEFAULT_HUB_EXTERNAL_PORT: u16 = 7962;

/// Terminal session launcher. Wraps `command` in a pseudo-terminal and
/// serves it to the bundled browser UI over a per-session HTTP/WebSocket
/// server, registering with the local hub daemon if one is reachable.
#[derive(Debug, Clone, Parser)]
#[command(name = "itwillsync", version, about)]
pub struct Config {
    /// Starting port to scan upward from when binding the session server.
    #[arg(long, env = "ITWILLSYNC_PORT", default_value_t = DEFAULT_START_PORT)]
    pub port: u16,

    /// Bind only to 127.0.0.1 (equivalent to --local).
    #[arg(long, env = "ITWILLSYNC_LOCALHOST")]
    pub localhost: bool,

    /// Bind only to 127.0.0.1; alias of --localhost kept for the
    /// networking-mode wizard's vocabulary.
    #[arg(long, env = "ITWILLSYNC_LOCAL")]
    pub local: bool,

    /// Advertise URLs assuming a Tailscale (or other private overlay)
    /// network instead of the LAN.
    #[arg(long, env = "ITWILLSYNC_TAILSCALE")]
    pub tailscale: bool,

    /// Suppress QR code output (QR rendering itself is an external
    /// collaborator; this only controls whether we call it).
    #[arg(long, env = "ITWILLSYNC_NO_QR")]
    pub no_qr: bool,

    /// Terminal columns.
    #[arg(long, env = "ITWILLSYNC_COLS", default_value_t = 200)]
    pub cols: u16,

    /// Terminal rows.
    #[arg(long, env = "ITWILLSYNC_ROWS", default_value_t = 50)]
    pub rows: u16,

    /// Scrollback capacity in characters.
    #[arg(long, env = "ITWILLSYNC_SCROLLBACK", default_value_t = 50_000)]
    pub scrollback_chars: usize,

    /// Log format (json or text).
    #[arg(long, env = "ITWILLSYNC_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "ITWILLSYNC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to run (after --).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    #[command(subcommand)]
    pub subcommand: Option<Commands>,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Commands {
    /// Run (or re-run) the first-run networking-mode wizard.
    ///
    /// The wizard's interactive UI is an external collaborator; this
    /// subcommand is accepted so the CLI surface matches the documented
    /// interface, and simply reports the current config file contents.
    Setup,
    /// Query or control the background hub daemon.
    Hub {
        #[command(subcommand)]
        action: HubAction,
    },
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum HubAction {
    /// Print the hub's state file contents (master token, ports, pid).
    Info,
    /// Print a liveness/session-count summary from the hub's internal API.
    Status,
    /// Ask the hub to shut down.
    Stop,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.subcommand.is_none() && self.command.is_empty() {
            anyhow::bail!("a command to run must be specified after `--`");
        }
        Ok(())
    }

    /// Whether the session server should bind to loopback only.
    pub fn bind_localhost_only(&self) -> bool {
        self.localhost || self.local
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
