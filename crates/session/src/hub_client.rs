// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-side half of the session↔hub lifecycle: discover or spawn the
//! hub, register, heartbeat, and unregister on exit over a thin
//! `reqwest`-based HTTP client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::DEFAULT_HUB_INTERNAL_PORT;

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    port: u16,
    token: &'a str,
    agent: &'a str,
    cwd: &'a str,
    pid: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[allow(dead_code)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    session: SessionInfo,
}

/// A live connection to the hub daemon: the assigned session id and the
/// internal-API base URL used for subsequent calls.
pub struct HubClient {
    base_url: String,
    id: String,
    http: reqwest::Client,
}

/// Attempt to reach a hub at the given internal port within `timeout`.
async fn probe_health(base_url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(_) => return false,
    };
    client
        .get(format!("{base_url}/api/health"))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}

/// Spawn the hub binary detached and wait (bounded) for it to print its
/// stdout-ready line. Returns the internal port it actually bound (it may
/// differ from the probed default if a hub binary override changes it,
/// though in practice the port is fixed).
async fn spawn_hub_and_wait(internal_port: u16) -> anyhow::Result<()> {
    let exe = std::env::current_exe().ok();
    let hub_binary = exe
        .as_ref()
        .and_then(|p| p.parent())
        .map(|dir| dir.join("itwillsync-hub"))
        .filter(|p| p.exists())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "itwillsync-hub".to_string());

    let mut child = Command::new(hub_binary)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .stdin(std::process::Stdio::null())
        .spawn()?;

    let stdout = child.stdout.take().ok_or_else(|| anyhow::anyhow!("no hub stdout"))?;
    let mut lines = BufReader::new(stdout).lines();
    let expected_prefix = "hub:ready:";

    let wait = async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(rest) = line.strip_prefix(expected_prefix) {
                let _ = rest;
                return Ok(());
            }
        }
        Err(anyhow::anyhow!("hub exited before signaling readiness"))
    };

    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for hub readiness"))??;

    // The hub continues running detached; we deliberately drop our handle
    // to its stdout/stdin/stderr without waiting on the child further.
    std::mem::drop(child.stdout.take());
    Ok(())
}

/// Discover or spawn the hub, then register this session.
///
/// Returns `None` (standalone mode) if the hub cannot be reached or
/// spawned; this is never treated as fatal, per the session↔hub client's
/// best-effort contract.
pub async fn connect_and_register(
    internal_port: u16,
    name: &str,
    session_port: u16,
    token: &str,
    agent: &str,
    cwd: &str,
    pid: u32,
) -> Option<HubClient> {
    let base_url = format!("http://127.0.0.1:{internal_port}");

    if !probe_health(&base_url, Duration::from_secs(2)).await {
        if let Err(e) = spawn_hub_and_wait(internal_port).await {
            tracing::warn!(error = %e, "could not start hub; continuing standalone");
            return None;
        }
    }

    let http = match reqwest::Client::builder().timeout(Duration::from_secs(5)).build() {
        Ok(c) => c,
        Err(_) => return None,
    };

    let body = RegisterRequest { name, port: session_port, token, agent, cwd, pid };
    let response = http.post(format!("{base_url}/api/sessions")).json(&body).send().await;

    match response {
        Ok(resp) if resp.status().as_u16() == 201 => match resp.json::<RegisterResponse>().await {
            Ok(parsed) => Some(HubClient { base_url, id: parsed.session.id, http }),
            Err(_) => None,
        },
        _ => None,
    }
}

impl HubClient {
    /// Send a best-effort heartbeat. Errors are swallowed; the session never
    /// treats a failed heartbeat as fatal.
    pub async fn heartbeat(&self) {
        let url = format!("{}/api/sessions/{}/heartbeat", self.base_url, self.id);
        let _ = self
            .http
            .put(url)
            .timeout(Duration::from_secs(2))
            .send()
            .await;
    }

    /// Run the periodic 10s heartbeat loop until `shutdown` fires.
    pub async fn heartbeat_loop(&self, shutdown: tokio_util::sync::CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = interval.tick() => self.heartbeat().await,
                _ = shutdown.cancelled() => break,
            }
        }
    }

    /// Best-effort unregister, called on every exit path.
    pub async fn unregister(&self) {
        let url = format!("{}/api/sessions/{}", self.base_url, self.id);
        let _ = self
            .http
            .delete(url)
            .timeout(Duration::from_secs(3))
            .send()
            .await;
    }
}

/// Default internal port used when the caller hasn't overridden it.
pub fn default_internal_port() -> u16 {
    DEFAULT_HUB_INTERNAL_PORT
}
