// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! itwillsync-hub: the singleton session registry, internal control API,
//! authenticated dashboard server, and preview collector described in the
//! system's hub runtime.

pub mod ansi;
pub mod config;
pub mod error;
pub mod paths;
pub mod preview;
pub mod registry;
pub mod state;
pub mod token;
pub mod transport;

use std::sync::Arc;

use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::state::HubState;

/// On-disk hub state, written once at startup and removed at clean
/// shutdown.
#[derive(Serialize)]
struct HubStateFile {
    #[serde(rename = "masterToken")]
    master_token: String,
    #[serde(rename = "externalPort")]
    external_port: u16,
    #[serde(rename = "internalPort")]
    internal_port: u16,
    pid: u32,
    #[serde(rename = "startedAt")]
    started_at: u64,
}

/// Initialize tracing/logging from config. Uses `try_init` so it is safe to
/// call more than once (e.g. from tests).
pub fn init_tracing(config: &HubConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = if std::env::var("RUST_LOG").is_err() {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run the hub until its shutdown token fires, then clean up state files.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    init_tracing(&config);
    let shutdown = CancellationToken::new();
    let master_token = token::generate();
    let config = Arc::new(config);

    let internal_listener = TcpListener::bind(("127.0.0.1", config.internal_port)).await?;
    let internal_port = internal_listener.local_addr()?.port();

    let dashboard_listener = TcpListener::bind(("0.0.0.0", config.external_port)).await?;
    let external_port = dashboard_listener.local_addr()?.port();

    let state = Arc::new(HubState::new(Arc::clone(&config), master_token.clone(), shutdown.clone()));

    write_state_files(&master_token, external_port, internal_port)?;

    let internal_router = transport::internal::router(Arc::clone(&state));
    let dashboard_router = transport::dashboard::router(Arc::clone(&state));

    tokio::spawn(registry::run_health_sweep(
        Arc::clone(&state.registry),
        Arc::clone(&config),
        shutdown.clone(),
    ));
    tokio::spawn(preview::run(
        Arc::clone(&state.preview),
        Arc::clone(&state.registry),
        Arc::clone(&config),
        shutdown.clone(),
    ));
    tokio::spawn(run_auto_shutdown(Arc::clone(&state)));
    tokio::spawn(run_signal_listener(shutdown.clone()));

    println!("hub:ready:{internal_port}");

    let internal_shutdown = shutdown.clone();
    let internal_task = tokio::spawn(async move {
        axum::serve(internal_listener, internal_router)
            .with_graceful_shutdown(async move { internal_shutdown.cancelled().await })
            .await
    });

    let dashboard_shutdown = shutdown.clone();
    let dashboard_task = tokio::spawn(async move {
        axum::serve(
            dashboard_listener,
            dashboard_router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(async move { dashboard_shutdown.cancelled().await })
        .await
    });

    let _ = internal_task.await?;
    let _ = dashboard_task.await?;

    remove_state_files();
    Ok(())
}

fn write_state_files(master_token: &str, external_port: u16, internal_port: u16) -> anyhow::Result<()> {
    let dir = paths::config_dir();
    std::fs::create_dir_all(&dir)?;

    std::fs::write(paths::hub_pid_path(), std::process::id().to_string())?;

    let state_file = HubStateFile {
        master_token: master_token.to_string(),
        external_port,
        internal_port,
        pid: std::process::id(),
        started_at: registry::epoch_ms(),
    };
    std::fs::write(paths::hub_json_path(), serde_json::to_string(&state_file)?)?;
    Ok(())
}

fn remove_state_files() {
    let _ = std::fs::remove_file(paths::hub_pid_path());
    let _ = std::fs::remove_file(paths::hub_json_path());
}

/// Cancel `shutdown` on SIGTERM or SIGINT, so a directly-signaled hub (not
/// routed through the `hub stop` subcommand) still exits promptly and
/// cleans up its state files.
async fn run_signal_listener(shutdown: CancellationToken) {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

    tokio::select! {
        _ = async {
            if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
        } => tracing::info!("received SIGTERM"),
        _ = async {
            if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
        } => tracing::info!("received SIGINT"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}

/// Auto-shutdown timer: armed 30s after the registry transitions from
/// non-empty to empty, cancelled by any registration in that window.
async fn run_auto_shutdown(state: Arc<HubState>) {
    let mut events = state.registry.subscribe();
    let grace = state.config.shutdown_grace();
    let mut timer: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;
    let mut was_non_empty = state.registry.size().await > 0;

    loop {
        let sleeping = async {
            match timer.as_mut() {
                Some(t) => t.await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = sleeping => {
                state.shutdown.cancel();
                return;
            }
            event = events.recv() => {
                match event {
                    Ok(_) => {
                        let size = state.registry.size().await;
                        if size == 0 && was_non_empty {
                            timer = Some(Box::pin(tokio::time::sleep(grace)));
                        } else if size > 0 {
                            timer = None;
                        }
                        was_non_empty = size > 0;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = state.shutdown.cancelled() => return,
        }
    }
}
