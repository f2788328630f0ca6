// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use super::{AppState, ClientFrame, ServerFrame};

/// Keepalive ping interval for connected WebSocket clients. A client that
/// misses one pong cycle is presumed dead and disconnected.
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Constant-time comparison of two byte strings. Returns `false`
/// immediately on length mismatch (length itself is not secret), but never
/// short-circuits on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let provided = query.token.unwrap_or_default();
    if !constant_time_eq(provided.as_bytes(), state.token.as_bytes()) {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state)).into_response()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    if let Err(e) = handle_socket_inner(socket, &state).await {
        tracing::debug!(error = %e, "session websocket closed");
    }
}

async fn handle_socket_inner(socket: WebSocket, state: &Arc<AppState>) -> anyhow::Result<()> {
    let mut live_rx = state.live.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (snapshot, snapshot_tail) = {
        let sb = state.scrollback.lock().await;
        let tail = sb.total_written();
        let data = sb
            .read_from(0)
            .map(|(a, b)| {
                let mut v = a.to_vec();
                v.extend_from_slice(b);
                v
            })
            .unwrap_or_default();
        (data, tail)
    };

    // Give a reconnecting client a brief window to send `resume` before we
    // commit to a full catch-up send.
    match tokio::time::timeout(Duration::from_millis(150), ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Resume { last_seq }) => {
                send_resume_delta(&mut ws_tx, state, last_seq).await?;
            }
            Ok(other) => {
                send_full_catchup(&mut ws_tx, &snapshot, snapshot_tail).await?;
                apply_client_frame(other, state);
            }
            Err(_) => {
                send_full_catchup(&mut ws_tx, &snapshot, snapshot_tail).await?;
            }
        },
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return Ok(()),
        _ => {
            send_full_catchup(&mut ws_tx, &snapshot, snapshot_tail).await?;
        }
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // consume the immediate first tick
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong {
                    tracing::debug!("session websocket client missed a pong; closing");
                    break;
                }
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) {
                            apply_client_frame(frame, state);
                        }
                        // malformed frames are silently dropped
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            frame = live_rx.recv() => {
                match frame {
                    Ok(frame) => {
                        if frame_seq(&frame).map(|s| s <= snapshot_tail).unwrap_or(false) {
                            continue;
                        }
                        let text = serde_json::to_string(frame.as_ref())?;
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(dropped = n, "session websocket client lagging");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}

fn frame_seq(frame: &ServerFrame) -> Option<u64> {
    match frame {
        ServerFrame::Data { seq, .. } => Some(*seq),
        ServerFrame::Resize { .. } => None,
    }
}

fn apply_client_frame(frame: ClientFrame, state: &Arc<AppState>) {
    match frame {
        ClientFrame::Input { data } => state.pty.write(Bytes::from(data.into_bytes())),
        ClientFrame::Resize { cols, rows } => state.resize(cols, rows),
        ClientFrame::Resume { .. } => {}
    }
}

async fn send_full_catchup(
    ws_tx: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    snapshot: &[u8],
    snapshot_tail: u64,
) -> anyhow::Result<()> {
    let data = String::from_utf8_lossy(snapshot).into_owned();
    let frame = ServerFrame::Data { data, seq: snapshot_tail };
    let text = serde_json::to_string(&frame)?;
    let _ = ws_tx.send(Message::Text(text.into())).await;
    Ok(())
}

async fn send_resume_delta(
    ws_tx: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    state: &Arc<AppState>,
    last_seq: u64,
) -> anyhow::Result<()> {
    let (data, tail) = {
        let sb = state.scrollback.lock().await;
        let tail = sb.total_written();
        let data = sb.read_from(last_seq).map(|(a, b)| {
            let mut v = a.to_vec();
            v.extend_from_slice(b);
            v
        });
        (data, tail)
    };

    if let Some(data) = data {
        if !data.is_empty() {
            let text_data = String::from_utf8_lossy(&data).into_owned();
            let frame = ServerFrame::Data { data: text_data, seq: tail };
            let text = serde_json::to_string(&frame)?;
            let _ = ws_tx.send(Message::Text(text.into())).await;
        }
    }
    Ok(())
}
