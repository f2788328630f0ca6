// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `itwillsync` and
//! `itwillsync-hub` binaries and exercise session↔hub registration, resume,
//! and shutdown scenarios over real TCP sockets.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use itwillsync_specs::{ensure_no_hub_running, wait_hub_session_count, IsolatedHome, SessionProcess};
use serial_test::serial;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);
const HUB_INTERNAL_PORT: u16 = 7963;

/// Fetch the hub's view of a single registered session (id + token),
/// assuming exactly one is registered.
async fn sole_registered_session() -> anyhow::Result<(String, String)> {
    let resp: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{HUB_INTERNAL_PORT}/api/sessions"))
        .await?
        .json()
        .await?;
    let sessions = resp["sessions"].as_array().ok_or_else(|| anyhow::anyhow!("no sessions array"))?;
    anyhow::ensure!(sessions.len() == 1, "expected exactly one session, got {}", sessions.len());
    let id = sessions[0]["id"].as_str().unwrap_or_default().to_string();
    let token = sessions[0]["token"].as_str().unwrap_or_default().to_string();
    Ok((id, token))
}

// -- (a) Solo session, single client --------------------------------------

#[tokio::test]
#[serial]
async fn solo_session_echoes_input_to_client() -> anyhow::Result<()> {
    ensure_no_hub_running(HUB_INTERNAL_PORT, TIMEOUT).await?;
    let home = IsolatedHome::new()?;
    let session = SessionProcess::start(&home, &["bash"])?;
    session.wait_healthy(TIMEOUT).await?;
    wait_hub_session_count(HUB_INTERNAL_PORT, 1, TIMEOUT).await?;

    let (_, token) = sole_registered_session().await?;
    let (mut ws, _) = tokio_tungstenite::connect_async(session.ws_url(&token)).await?;

    let _ = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    ws.send(Message::Text(
        serde_json::json!({"type": "input", "data": "echo hi\n"}).to_string().into(),
    ))
    .await?;

    let found = tokio::time::timeout(TIMEOUT, async {
        loop {
            let Some(Ok(Message::Text(text))) = ws.next().await else { continue };
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
            if frame["type"] == "data" && frame["data"].as_str().unwrap_or("").contains("hi") {
                return true;
            }
        }
    })
    .await;
    assert_eq!(found.ok(), Some(true));

    session.send_sigterm();
    Ok(())
}

// -- (c) Hub auto-start & multi-session ------------------------------------

#[tokio::test]
#[serial]
async fn second_session_joins_the_first_sessions_hub() -> anyhow::Result<()> {
    ensure_no_hub_running(HUB_INTERNAL_PORT, TIMEOUT).await?;
    let home = IsolatedHome::new()?;
    let first = SessionProcess::start(&home, &["bash"])?;
    first.wait_healthy(TIMEOUT).await?;
    wait_hub_session_count(HUB_INTERNAL_PORT, 1, TIMEOUT).await?;

    assert!(home.hub_json()["masterToken"].as_str().is_some());

    let second = SessionProcess::start(&home, &["bash"])?;
    second.wait_healthy(TIMEOUT).await?;
    wait_hub_session_count(HUB_INTERNAL_PORT, 2, TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("http://127.0.0.1:{HUB_INTERNAL_PORT}/api/sessions")).await?.json().await?;
    assert_eq!(resp["sessions"].as_array().map(|a| a.len()), Some(2));

    first.send_sigterm();
    second.send_sigterm();
    Ok(())
}

// -- (f) Graceful shutdown --------------------------------------------------

#[tokio::test]
#[serial]
async fn sigterm_unregisters_the_session_and_hub_state_survives_until_empty() -> anyhow::Result<()> {
    ensure_no_hub_running(HUB_INTERNAL_PORT, TIMEOUT).await?;
    let home = IsolatedHome::new()?;
    let mut session = SessionProcess::start(&home, &["bash"])?;
    session.wait_healthy(TIMEOUT).await?;
    wait_hub_session_count(HUB_INTERNAL_PORT, 1, TIMEOUT).await?;

    session.send_sigterm();
    session.wait_exit(TIMEOUT).await?;

    wait_hub_session_count(HUB_INTERNAL_PORT, 0, TIMEOUT).await?;
    // hub.json still present: the auto-shutdown grace period hasn't elapsed.
    assert!(home.hub_json()["masterToken"].as_str().is_some());
    Ok(())
}
