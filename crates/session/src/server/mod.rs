// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session HTTP + WebSocket server: serves the bundled browser UI,
//! authenticates WebSocket upgrades against the session token, and fans
//! out PTY output to every connected client.

pub mod assets;
pub mod ws;

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::pty::PtySupervisor;
use crate::ring::RingBuffer;

/// Frame the session server sends to a connected browser client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    #[serde(rename = "data")]
    Data { data: String, seq: u64 },
    #[serde(rename = "resize")]
    Resize { cols: u16, rows: u16 },
}

/// Frame a browser client sends to the session server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    #[serde(rename = "input")]
    Input { data: String },
    #[serde(rename = "resize")]
    Resize { cols: u16, rows: u16 },
    #[serde(rename = "resume")]
    Resume { #[serde(rename = "lastSeq")] last_seq: u64 },
}

/// Shared state for the session HTTP/WebSocket server.
pub struct AppState {
    pub token: String,
    pub pty: Arc<PtySupervisor>,
    pub scrollback: Arc<Mutex<RingBuffer>>,
    pub live: broadcast::Sender<Arc<ServerFrame>>,
    pub cols: AtomicU16,
    pub rows: AtomicU16,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Apply a client resize request to the PTY and broadcast the new
    /// dimensions to every other connected client.
    pub fn resize(&self, cols: u16, rows: u16) {
        self.cols.store(cols, Ordering::Relaxed);
        self.rows.store(rows, Ordering::Relaxed);
        self.pty.resize(cols, rows);
        let _ = self.live.send(Arc::new(ServerFrame::Resize { cols, rows }));
    }
}

/// Spawn the background task that drains PTY output into the scrollback
/// buffer and the live broadcast channel.
pub fn spawn_output_forwarder(
    state: Arc<AppState>,
    mut output_rx: tokio::sync::mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(chunk) = output_rx.recv().await {
            let seq = {
                let mut sb = state.scrollback.lock().await;
                sb.write(&chunk);
                sb.total_written()
            };
            let data = String::from_utf8_lossy(&chunk).into_owned();
            let _ = state.live.send(Arc::new(ServerFrame::Data { data, seq }));
        }
    });
}

/// Unauthenticated liveness probe, a zero-cost supplement to the hub's own
/// null-signal health check (see `registry::run_health_sweep`).
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "pid": state.pty.pid() }))
}

/// Build the axum router: `/` + asset paths, and the `/ws` upgrade route.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(health))
        .fallback(get(assets::serve_asset))
        .with_state(state)
}

/// Bind a `TcpListener`, scanning upward from `start_port` until a bind
/// succeeds. Returns the listener and the port it bound to.
pub async fn bind_with_scan(host: &str, start_port: u16) -> anyhow::Result<(TcpListener, u16)> {
    let mut port = start_port;
    loop {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(_) if port < u16::MAX => port += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Run the session server until its shutdown token fires.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
