// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The preview collector: one outbound read-only WebSocket subscriber per
//! registered session, producing throttled plain-text previews and
//! attention-signal updates for the dashboard. A reconnect loop with
//! exponential backoff and one task per watched session, simplified to a
//! read-only tail rather than a bidirectional bridge, with attention
//! detection and line-buffering handled by [`crate::ansi`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::ansi::{has_attention_signal, strip_control_sequences};
use crate::config::HubConfig;
use crate::registry::{Registry, RegistryEvent, SessionInfo, SessionStatus};

const MAX_PREVIEW_LINES: usize = 5;
const MAX_LINE_LEN: usize = 80;

/// A throttled preview emission for one session, ready to bridge to the
/// dashboard's `preview` frame.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewEvent {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub lines: Vec<String>,
}

/// Shared collector state: the latest preview snapshot per session (for
/// dashboard replay on connect) and the live preview broadcast.
pub struct PreviewCollector {
    buffers: RwLock<HashMap<String, Vec<String>>>,
    events: broadcast::Sender<PreviewEvent>,
}

impl PreviewCollector {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self { buffers: RwLock::new(HashMap::new()), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.events.subscribe()
    }

    /// Current preview snapshot for every session with at least one
    /// buffered line, for replay to a newly connected dashboard client.
    pub async fn snapshot(&self) -> HashMap<String, Vec<String>> {
        self.buffers.read().await.clone()
    }

    async fn publish(&self, session_id: &str, lines: Vec<String>) {
        self.buffers.write().await.insert(session_id.to_string(), lines.clone());
        let _ = self.events.send(PreviewEvent { session_id: session_id.to_string(), lines });
    }

    async fn forget(&self, session_id: &str) {
        self.buffers.write().await.remove(session_id);
    }
}

impl Default for PreviewCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive the collector for the lifetime of the hub: spawn one watcher task
/// per registered session and cancel it when the session is removed.
pub async fn run(
    collector: Arc<PreviewCollector>,
    registry: Arc<Registry>,
    config: Arc<HubConfig>,
    shutdown: CancellationToken,
) {
    let mut tasks: HashMap<String, CancellationToken> = HashMap::new();

    for session in registry.get_all().await {
        let token = shutdown.child_token();
        tasks.insert(session.id.clone(), token.clone());
        tokio::spawn(watch_session(
            Arc::clone(&collector),
            Arc::clone(&registry),
            Arc::clone(&config),
            session,
            token,
        ));
    }

    let mut events = registry.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => {
                match event {
                    Ok(RegistryEvent::SessionAdded { session }) => {
                        let token = shutdown.child_token();
                        tasks.insert(session.id.clone(), token.clone());
                        tokio::spawn(watch_session(
                            Arc::clone(&collector),
                            Arc::clone(&registry),
                            Arc::clone(&config),
                            session,
                            token,
                        ));
                    }
                    Ok(RegistryEvent::SessionRemoved { session_id }) => {
                        if let Some(token) = tasks.remove(&session_id) {
                            token.cancel();
                        }
                        collector.forget(&session_id).await;
                    }
                    Ok(RegistryEvent::SessionUpdated { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    for token in tasks.into_values() {
        token.cancel();
    }
}

/// Per-session outbound-socket state, owned entirely by that session's
/// watcher task.
struct SessionWatcher {
    lines: Vec<String>,
    carry: String,
    dirty: bool,
}

impl SessionWatcher {
    fn new() -> Self {
        Self { lines: Vec::new(), carry: String::new(), dirty: false }
    }

    /// Fold newly stripped text into the line buffer, splitting on newlines.
    fn ingest(&mut self, clean: &str) {
        self.carry.push_str(clean);
        let mut rest = std::mem::take(&mut self.carry);
        loop {
            match rest.find('\n') {
                Some(idx) => {
                    let line = rest[..idx].trim_end().to_string();
                    rest = rest[idx + 1..].to_string();
                    if !line.is_empty() {
                        self.push_line(line);
                    }
                }
                None => {
                    self.carry = rest;
                    break;
                }
            }
        }
        self.dirty = true;
    }

    fn push_line(&mut self, line: String) {
        let line = if line.chars().count() > MAX_LINE_LEN {
            let truncated: String = line.chars().take(MAX_LINE_LEN).collect();
            format!("{truncated}...")
        } else {
            line
        };
        self.lines.push(line);
        if self.lines.len() > MAX_PREVIEW_LINES {
            let excess = self.lines.len() - MAX_PREVIEW_LINES;
            self.lines.drain(0..excess);
        }
    }
}

async fn watch_session(
    collector: Arc<PreviewCollector>,
    registry: Arc<Registry>,
    config: Arc<HubConfig>,
    mut session: SessionInfo,
    shutdown: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        // Pick up renames/status changes; bail out if the session vanished.
        match registry.get_by_id(&session.id).await {
            Some(current) => session = current,
            None => return,
        }

        let url = format!("ws://127.0.0.1:{}?token={}", session.port, session.token);
        let connect = tokio_tungstenite::connect_async(&url);

        let stream = tokio::select! {
            result = connect => result,
            _ = shutdown.cancelled() => return,
        };

        let (ws, _) = match stream {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!(session = %session.id, error = %e, "preview connect failed");
                if !backoff(&shutdown, &mut attempt).await {
                    return;
                }
                continue;
            }
        };

        attempt = 0;
        let mut watcher = SessionWatcher::new();
        let mut throttle = tokio::time::interval(config.preview_throttle());
        throttle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let (_write, mut read) = ws.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = throttle.tick() => {
                    if watcher.dirty {
                        watcher.dirty = false;
                        collector.publish(&session.id, watcher.lines.clone()).await;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            handle_frame(&registry, &mut watcher, &session.id, text.as_bytes()).await;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            handle_frame(&registry, &mut watcher, &session.id, &bytes).await;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    }
                }
            }
        }

        if !backoff(&shutdown, &mut attempt).await {
            return;
        }
    }
}

async fn handle_frame(registry: &Arc<Registry>, watcher: &mut SessionWatcher, session_id: &str, raw: &[u8]) {
    let Ok(value) = serde_json::from_slice::<Value>(raw) else { return };
    if value.get("type").and_then(Value::as_str) != Some("data") {
        return;
    }
    let Some(data) = value.get("data").and_then(Value::as_str) else { return };
    let bytes = data.as_bytes();

    if has_attention_signal(bytes) {
        registry.update_status(session_id, SessionStatus::Attention).await;
    }

    let clean = strip_control_sequences(bytes);
    watcher.ingest(&clean);
}

/// Wait out an exponentially-backed reconnect delay, returning `false` if
/// shutdown fired while waiting.
async fn backoff(shutdown: &CancellationToken, attempt: &mut u32) -> bool {
    let delay_ms = (1000f64 * 1.5f64.powi(*attempt as i32)).min(10_000.0) as u64;
    *attempt += 1;
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        _ = shutdown.cancelled() => false,
    }
}

#[cfg(test)]
#[path = "preview_tests.rs"]
mod tests;
