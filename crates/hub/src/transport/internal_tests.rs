// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::router;
use crate::config::HubConfig;
use crate::state::HubState;

fn test_state() -> Arc<HubState> {
    let config = Arc::new(HubConfig {
        external_port: 0,
        internal_port: 0,
        health_check_ms: 15_000,
        heartbeat_fresh_ms: 20_000,
        idle_after_ms: 30_000,
        shutdown_grace_ms: 30_000,
        ping_interval_ms: 30_000,
        preview_throttle_ms: 500,
        rate_limit_block_ms: 60_000,
        rate_limit_strikes: 5,
        log_format: "json".to_string(),
        log_level: "info".to_string(),
    });
    Arc::new(HubState::new(config, "a".repeat(64), CancellationToken::new()))
}

fn server() -> (TestServer, Arc<HubState>) {
    let state = test_state();
    (TestServer::new(router(state.clone())).unwrap(), state)
}

#[tokio::test]
async fn health_reports_zero_sessions_initially() {
    let (server, _) = server();
    let response = server.get("/api/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["sessions"], 0);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_then_list_returns_session() {
    let (server, _) = server();
    let response = server
        .post("/api/sessions")
        .json(&json!({"name": "agent", "port": 7964, "token": "t".repeat(64), "agent": "bash", "cwd": "/tmp", "pid": 1}))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let list = server.get("/api/sessions").await;
    let body: serde_json::Value = list.json();
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn register_missing_field_returns_400() {
    let (server, _) = server();
    let response = server.post("/api/sessions").json(&json!({"name": "agent"})).await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn deregister_unknown_session_returns_404() {
    let (server, _) = server();
    let response = server.delete("/api/sessions/deadbeefdeadbeef").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn rename_missing_name_returns_400() {
    let (server, state) = server();
    let session = state
        .registry
        .register(crate::registry::Registration {
            name: "agent".to_string(),
            port: 7964,
            token: "t".repeat(64),
            agent: "bash".to_string(),
            cwd: "/tmp".to_string(),
            pid: 1,
        })
        .await;
    let response = server.put(&format!("/api/sessions/{}/rename", session.id)).json(&json!({})).await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn heartbeat_unknown_session_returns_404() {
    let (server, _) = server();
    let response = server.put("/api/sessions/deadbeefdeadbeef/heartbeat").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn shutdown_cancels_the_shutdown_token() {
    let (server, state) = server();
    let response = server.post("/api/shutdown").await;
    response.assert_status_ok();
    assert!(state.shutdown.is_cancelled());
}
