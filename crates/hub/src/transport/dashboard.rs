// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The externally reachable dashboard server: master-token-gated HTML and
//! WebSocket upgrade, rate limiting (via [`super::auth`]), and the
//! dashboard-facing registry/preview event bridge. Each connection runs one
//! reader task alongside a registry/preview broadcast-subscriber loop via
//! `tokio::select!`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::middleware;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::preview::PreviewEvent;
use crate::registry::SessionStatus;
use crate::state::HubState;

const DASHBOARD_PLACEHOLDER_HTML: &str = include_str!("../../../../assets/dashboard.html");

pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/ws", get(ws_upgrade))
        .layer(middleware::from_fn_with_state(state.clone(), super::auth::auth_layer))
        .with_state(state)
}

async fn serve_dashboard() -> impl IntoResponse {
    Html(DASHBOARD_PLACEHOLDER_HTML)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<HubState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum OutboundFrame<'a> {
    #[serde(rename = "sessions")]
    Sessions { sessions: &'a [crate::registry::SessionInfo] },
    #[serde(rename = "preview")]
    Preview {
        #[serde(rename = "sessionId")]
        session_id: &'a str,
        lines: &'a [String],
    },
    #[serde(rename = "metadata")]
    Metadata {
        #[serde(rename = "sessionId")]
        session_id: &'a str,
        metadata: Value,
    },
    #[serde(rename = "operation-error")]
    OperationError { operation: &'a str, #[serde(rename = "sessionId")] session_id: &'a str, error: &'a str },
}

async fn handle_socket(mut socket: WebSocket, state: Arc<HubState>) {
    let mut registry_events = state.registry.subscribe();
    let mut preview_events = state.preview.subscribe();

    let sessions = state.registry.get_all().await;
    let initial = serde_json::to_string(&OutboundFrame::Sessions { sessions: &sessions }).unwrap_or_default();
    if socket.send(Message::Text(initial.into())).await.is_err() {
        return;
    }

    for (session_id, lines) in state.preview.snapshot().await {
        if lines.is_empty() {
            continue;
        }
        let frame = OutboundFrame::Preview { session_id: &session_id, lines: &lines };
        if let Ok(text) = serde_json::to_string(&frame) {
            if socket.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
    }

    let mut ping_interval = tokio::time::interval(state.config.ping_interval());
    ping_interval.tick().await; // consume the immediate first tick
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong {
                    tracing::debug!("dashboard websocket client missed a pong; closing");
                    return;
                }
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
                awaiting_pong = true;
            }
            event = registry_events.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(text) = serde_json::to_string(&event) {
                            if socket.send(Message::Text(text.into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            event = preview_events.recv() => {
                match event {
                    Ok(PreviewEvent { session_id, lines }) => {
                        let frame = OutboundFrame::Preview { session_id: &session_id, lines: &lines };
                        if let Ok(text) = serde_json::to_string(&frame) {
                            if socket.send(Message::Text(text.into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_inbound(&mut socket, &state, text.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => return,
                }
            }
        }
    }
}

async fn handle_inbound(socket: &mut WebSocket, state: &Arc<HubState>, raw: &[u8]) -> Result<(), ()> {
    let Ok(value) = serde_json::from_slice::<Value>(raw) else { return Ok(()) };
    let Some(kind) = value.get("type").and_then(Value::as_str) else { return Ok(()) };

    match kind {
        "stop-session" => {
            let Some(session_id) = value.get("sessionId").and_then(Value::as_str) else { return Ok(()) };
            if let Some(session) = state.registry.get_by_id(session_id).await {
                let _ = kill(Pid::from_raw(session.pid as i32), Signal::SIGTERM);
                state.registry.unregister(session_id).await;
            } else {
                send_operation_error(socket, "stop-session", session_id, "unknown session").await?;
            }
        }
        "rename-session" => {
            let Some(session_id) = value.get("sessionId").and_then(Value::as_str) else { return Ok(()) };
            let name = value.get("name").and_then(Value::as_str).unwrap_or("").trim().to_string();
            if name.is_empty() {
                send_operation_error(socket, "rename-session", session_id, "empty name").await?;
            } else if state.registry.rename(session_id, name).await.is_none() {
                send_operation_error(socket, "rename-session", session_id, "unknown session").await?;
            }
        }
        "get-metadata" => {
            let Some(session_id) = value.get("sessionId").and_then(Value::as_str) else { return Ok(()) };
            match state.registry.get_by_id(session_id).await {
                Some(session) => {
                    let resident_memory_kb = crate::registry::resident_memory_kb(session.pid);
                    let metadata = serde_json::json!({
                        "pid": session.pid,
                        "agent": session.agent,
                        "cwd": session.cwd,
                        "connectedAt": session.connected_at,
                        "residentMemoryKb": resident_memory_kb,
                    });
                    let frame = OutboundFrame::Metadata { session_id, metadata };
                    if let Ok(text) = serde_json::to_string(&frame) {
                        socket.send(Message::Text(text.into())).await.map_err(|_| ())?;
                    }
                }
                None => send_operation_error(socket, "get-metadata", session_id, "unknown session").await?,
            }
        }
        "clear-attention" => {
            let Some(session_id) = value.get("sessionId").and_then(Value::as_str) else { return Ok(()) };
            match state.registry.get_by_id(session_id).await {
                Some(session) if session.status == SessionStatus::Attention => {
                    state.registry.update_status(session_id, SessionStatus::Active).await;
                }
                Some(_) => {}
                None => send_operation_error(socket, "clear-attention", session_id, "unknown session").await?,
            }
        }
        _ => {}
    }
    Ok(())
}

async fn send_operation_error(
    socket: &mut WebSocket,
    operation: &str,
    session_id: &str,
    error: &str,
) -> Result<(), ()> {
    let frame = OutboundFrame::OperationError { operation, session_id, error };
    let text = serde_json::to_string(&frame).map_err(|_| ())?;
    socket.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "dashboard_tests.rs"]
mod tests;
