// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level session runner: wires the PTY supervisor, session server, and
//! session↔hub client together and drives the process to exit.

use std::sync::atomic::AtomicU16;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, DEFAULT_HUB_INTERNAL_PORT};
use crate::hub_client;
use crate::pty::PtySupervisor;
use crate::ring::RingBuffer;
use crate::server::{self, AppState};
use crate::token;

/// Initialize tracing from config. Uses `try_init` so it's safe to call
/// more than once (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = if std::env::var("RUST_LOG").is_err() {
        EnvFilter::new(&config.log_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run a session to completion. Returns the exit code to hand back to the
/// shell: the wrapped agent's own exit code on a clean exit, or 130 if the
/// session was torn down by a second signal.
pub async fn run(config: Config) -> anyhow::Result<i32> {
    init_tracing(&config);

    anyhow::ensure!(!config.command.is_empty(), "no command specified");

    let shutdown = CancellationToken::new();

    let (output_tx, output_rx) = tokio::sync::mpsc::channel(256);
    let (pty, exit_rx) =
        PtySupervisor::spawn(&config.command, config.cols, config.rows, output_tx)?;
    let pty = Arc::new(pty);
    info!(pid = pty.pid(), command = ?config.command, "agent process spawned");

    let session_token = token::generate();
    let (live_tx, _) = broadcast::channel(256);
    let state = Arc::new(AppState {
        token: session_token.clone(),
        pty: Arc::clone(&pty),
        scrollback: Arc::new(Mutex::new(RingBuffer::new(config.scrollback_chars))),
        live: live_tx,
        cols: AtomicU16::new(config.cols),
        rows: AtomicU16::new(config.rows),
        shutdown: shutdown.clone(),
    });

    server::spawn_output_forwarder(Arc::clone(&state), output_rx);

    let host = if config.bind_localhost_only() { "127.0.0.1" } else { "0.0.0.0" };
    let (listener, port) = server::bind_with_scan(host, config.port).await?;
    info!(%host, port, "session server listening");
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = server::serve(listener, state).await {
                error!("session server error: {e}");
            }
        });
    }

    let agent_name =
        config.command.first().cloned().unwrap_or_else(|| "agent".to_string());
    let cwd = std::env::current_dir().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();

    let hub_client = hub_client::connect_and_register(
        DEFAULT_HUB_INTERNAL_PORT,
        &agent_name,
        port,
        &session_token,
        &agent_name,
        &cwd,
        pty.pid(),
    )
    .await
    .map(Arc::new);

    match &hub_client {
        Some(_) => info!("registered with hub"),
        None => warn!("hub unreachable; continuing standalone"),
    }

    if let Some(ref client) = hub_client {
        let client = Arc::clone(client);
        let client_shutdown = shutdown.child_token();
        tokio::spawn(async move { client.heartbeat_loop(client_shutdown).await });
    }

    let sigterm_handler = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => info!("received SIGTERM"),
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => info!("received SIGINT"),
            }
            shutdown.cancel();
        })
    };

    let mut exit_rx = exit_rx;
    let exit_status = tokio::select! {
        status = &mut exit_rx => status.unwrap_or(crate::pty::ExitStatus { code: None, signal: None }),
        _ = shutdown.cancelled() => {
            pty.kill();
            (&mut exit_rx).await.unwrap_or(crate::pty::ExitStatus { code: None, signal: None })
        }
    };

    shutdown.cancel();
    sigterm_handler.abort();

    if let Some(client) = hub_client {
        client.unregister().await;
    }

    info!(code = ?exit_status.code, signal = ?exit_status.signal, "agent exited");

    Ok(resolve_exit_code(&exit_status))
}

/// Map a wrapped agent's termination to the process exit code the shell
/// sees: its own exit code when it has one, 130 (conventional SIGINT/term
/// exit) when it died by signal, 1 if neither is known.
fn resolve_exit_code(status: &crate::pty::ExitStatus) -> i32 {
    status.code.unwrap_or(if status.signal.is_some() { 130 } else { 1 })
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
