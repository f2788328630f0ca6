// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `itwillsync` (and, where a scenario needs it,
//! `itwillsync-hub`) binaries as subprocesses and exercises them over real
//! TCP sockets — no mocks, no in-process router construction.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to a compiled binary under `target/debug`.
fn binary(name: &str) -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join(name)
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// An isolated `$ITWILLSYNC_CONFIG_DIR`, so hub state files and the
/// auto-spawned hub daemon of one test never interfere with another.
pub struct IsolatedHome {
    dir: tempfile::TempDir,
}

/// Ask whatever hub currently holds the fixed internal port to shut down,
/// and wait for the port to free up. The hub is a singleton elected purely
/// by port ownership, so a prior test's still-draining hub (30s auto-
/// shutdown grace) would otherwise silently absorb the next test's
/// registrations instead of a freshly spawned, freshly state-filed one.
pub async fn ensure_no_hub_running(internal_port: u16, timeout: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let shutdown_url = format!("http://127.0.0.1:{internal_port}/api/shutdown");
    let health_url = format!("http://127.0.0.1:{internal_port}/api/health");

    if client.get(&health_url).send().await.is_ok() {
        let _ = client.post(&shutdown_url).send().await;
    }

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if client.get(&health_url).send().await.is_err() {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("a hub is still bound to port {internal_port} after {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

impl IsolatedHome {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { dir: tempfile::tempdir()? })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn hub_json(&self) -> serde_json::Value {
        std::fs::read_to_string(self.dir.path().join("hub.json"))
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// A running `itwillsync` session process, killed on drop.
pub struct SessionProcess {
    child: Child,
    port: u16,
}

impl SessionProcess {
    /// Launch a session wrapping `cmd`, bound to loopback only, isolated
    /// under `home`'s config directory so it discovers only a hub spawned
    /// within the same test.
    pub fn start(home: &IsolatedHome, cmd: &[&str]) -> anyhow::Result<Self> {
        let binary_path = binary("itwillsync");
        anyhow::ensure!(binary_path.exists(), "itwillsync binary not found at {}", binary_path.display());

        let port = free_port()?;
        let mut args: Vec<String> =
            vec!["--port".into(), port.to_string(), "--localhost".into(), "--log-format".into(),
                "text".into(), "--log-level".into(), "warn".into(), "--".into()];
        args.extend(cmd.iter().map(|s| s.to_string()));

        let child = Command::new(&binary_path)
            .args(&args)
            .env("ITWILLSYNC_CONFIG_DIR", home.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .spawn()?;

        Ok(Self { child, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://127.0.0.1:{}/ws?token={token}", self.port)
    }

    /// Poll the session's own `/api/health` until it answers or `timeout` elapses.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{}/api/health", self.port);
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("session did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("session did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Send SIGTERM via the external `kill` utility rather than `Child::kill`
    /// (which only knows SIGKILL), so graceful-shutdown scenarios can be
    /// exercised the way a real terminal signal would arrive.
    pub fn send_sigterm(&self) {
        let _ = Command::new("kill").arg("-TERM").arg(self.child.id().to_string()).status();
    }
}

impl Drop for SessionProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Wait until the hub's internal `/api/health` reports a given session count,
/// or `timeout` elapses.
pub async fn wait_hub_session_count(
    internal_port: u16,
    expected: u64,
    timeout: Duration,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{internal_port}/api/health");
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("hub never reported {expected} session(s) within {timeout:?}");
        }
        if let Ok(resp) = client.get(&url).send().await {
            if let Ok(body) = resp.json::<serde_json::Value>().await {
                if body["sessions"].as_u64() == Some(expected) {
                    return Ok(());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
