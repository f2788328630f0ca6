// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hub's session registry: an in-memory map of live sessions, a
//! single-writer mutation discipline, and a change-event broadcast for the
//! dashboard (`RwLock<HashMap<_>>` plus a `broadcast::Sender` for fan-out).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::signal::kill;
use nix::unistd::Pid;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::config::HubConfig;

/// Lifecycle status of a registered session, per the health-check state
/// machine: `active -> idle` on heartbeat staleness, `active|idle ->
/// attention` on an attention signal, `attention -> active` on explicit
/// clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Attention,
}

/// A registered session, as exposed to the internal API and the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub port: u16,
    pub token: String,
    pub agent: String,
    pub cwd: String,
    pub pid: u32,
    #[serde(rename = "connectedAt")]
    pub connected_at: u64,
    #[serde(rename = "lastSeen")]
    pub last_seen: u64,
    pub status: SessionStatus,
}

/// Fields supplied by a session at registration time.
pub struct Registration {
    pub name: String,
    pub port: u16,
    pub token: String,
    pub agent: String,
    pub cwd: String,
    pub pid: u32,
}

/// Registry change events, bridged verbatim to dashboard clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RegistryEvent {
    #[serde(rename = "session-added")]
    SessionAdded { session: SessionInfo },
    #[serde(rename = "session-removed")]
    SessionRemoved {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "session-updated")]
    SessionUpdated { session: SessionInfo },
}

/// Current epoch time in milliseconds.
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Generate a 16-hex-character session id, assigned by the registry itself
/// at registration time, the same way `token::generate` produces session
/// tokens — via `rand`, not a `uuid` dependency this workspace otherwise
/// has no use for.
fn generate_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The session registry: single-writer mutable map plus change-event
/// fan-out. All mutations take the write lock for the duration of the
/// mutation and event emission, matching the ordering guarantee that
/// registry-event broadcasts preserve mutation order.
pub struct Registry {
    sessions: RwLock<HashMap<String, SessionInfo>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Registry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self { sessions: RwLock::new(HashMap::new()), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub async fn register(&self, registration: Registration) -> SessionInfo {
        let now = epoch_ms();
        let info = SessionInfo {
            id: generate_id(),
            name: registration.name,
            port: registration.port,
            token: registration.token,
            agent: registration.agent,
            cwd: registration.cwd,
            pid: registration.pid,
            connected_at: now,
            last_seen: now,
            status: SessionStatus::Active,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(info.id.clone(), info.clone());
        drop(sessions);

        let _ = self.events.send(RegistryEvent::SessionAdded { session: info.clone() });
        info
    }

    pub async fn unregister(&self, id: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id).is_some()
        };
        if removed {
            let _ = self
                .events
                .send(RegistryEvent::SessionRemoved { session_id: id.to_string() });
        }
        removed
    }

    pub async fn rename(&self, id: &str, name: String) -> Option<SessionInfo> {
        self.mutate(id, |info| info.name = name).await
    }

    pub async fn update_status(&self, id: &str, status: SessionStatus) -> Option<SessionInfo> {
        self.mutate(id, |info| info.status = status).await
    }

    pub async fn update_last_seen(&self, id: &str) -> Option<SessionInfo> {
        self.mutate(id, |info| {
            info.last_seen = epoch_ms();
            if info.status == SessionStatus::Idle {
                info.status = SessionStatus::Active;
            }
        })
        .await
    }

    async fn mutate(&self, id: &str, f: impl FnOnce(&mut SessionInfo)) -> Option<SessionInfo> {
        let updated = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(id) {
                Some(info) => {
                    f(info);
                    Some(info.clone())
                }
                None => None,
            }
        };
        if let Some(ref info) = updated {
            let _ = self.events.send(RegistryEvent::SessionUpdated { session: info.clone() });
        }
        updated
    }

    pub async fn get_all(&self) -> Vec<SessionInfo> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn get_by_id(&self, id: &str) -> Option<SessionInfo> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn size(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if a process with the given pid currently exists, via a
/// null-signal probe. Per the heartbeat-first rule this is only consulted
/// once a session's heartbeat has gone stale.
fn process_exists(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Best-effort resident memory lookup via `/proc/<pid>/status`; absent on
/// platforms without procfs.
pub fn resident_memory_kb(pid: u32) -> Option<u64> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    contents.lines().find_map(|line| {
        line.strip_prefix("VmRSS:")
            .map(|rest| rest.trim().trim_end_matches(" kB").trim())
            .and_then(|n| n.parse().ok())
    })
}

/// Run the periodic registry health-check sweep until `shutdown` fires.
///
/// Heartbeat-first: a session with `elapsed <= heartbeat_fresh` is trusted
/// alive without a process probe (the session client heartbeats every 10s).
/// Only once the heartbeat goes stale does the sweep fall back to a
/// null-signal process-existence check, which demotes `active` sessions past
/// `idle_after` to `idle`, or removes the session outright if the process is
/// gone.
pub async fn run_health_sweep(
    registry: Arc<Registry>,
    config: Arc<HubConfig>,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let mut interval = tokio::time::interval(config.health_check_interval());
    loop {
        tokio::select! {
            _ = interval.tick() => {},
            _ = shutdown.cancelled() => break,
        }

        let now = epoch_ms();
        let sessions = registry.get_all().await;
        for session in sessions {
            let elapsed = now.saturating_sub(session.last_seen);
            if elapsed <= config.heartbeat_fresh_ms {
                continue;
            }

            if process_exists(session.pid) {
                if elapsed > config.idle_after_ms && session.status == SessionStatus::Active {
                    registry.update_status(&session.id, SessionStatus::Idle).await;
                }
            } else {
                registry.unregister(&session.id).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
