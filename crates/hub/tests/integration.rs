// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration coverage of the registry's event stream and the dashboard
//! WebSocket bridge's session-list replay, exercised against the real
//! routers rather than mocks.

use std::sync::Arc;

use itwillsync_hub::config::HubConfig;
use itwillsync_hub::registry::{Registration, RegistryEvent, Registry};
use itwillsync_hub::state::HubState;
use itwillsync_hub::transport::dashboard;
use tokio_util::sync::CancellationToken;

fn config() -> HubConfig {
    HubConfig {
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
    }
}

fn registration(name: &str) -> Registration {
    Registration {
        name: name.to_string(),
        port: 7964,
        token: "t".repeat(64),
        agent: "bash".to_string(),
        cwd: "/tmp".to_string(),
        pid: 1,
    }
}

#[tokio::test]
async fn registry_event_stream_reflects_final_state() {
    let registry = Registry::new();
    let mut events = registry.subscribe();

    let a = registry.register(registration("a")).await;
    let b = registry.register(registration("b")).await;
    registry.rename(&a.id, "renamed-a".to_string()).await;
    registry.unregister(&b.id).await;

    let mut seen_ids = std::collections::HashSet::new();
    let mut removed_ids = std::collections::HashSet::new();
    for _ in 0..4 {
        match events.recv().await.unwrap() {
            RegistryEvent::SessionAdded { session } => {
                seen_ids.insert(session.id);
            }
            RegistryEvent::SessionUpdated { session } => {
                seen_ids.insert(session.id);
            }
            RegistryEvent::SessionRemoved { session_id } => {
                removed_ids.insert(session_id);
            }
        }
    }

    let current = registry.get_all().await;
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, a.id);
    assert_eq!(current[0].name, "renamed-a");
    assert!(removed_ids.contains(&b.id));
}

#[tokio::test]
async fn dashboard_requires_token_but_exempts_assets() {
    let state = Arc::new(HubState::new(Arc::new(config()), "m".repeat(64), CancellationToken::new()));
    let server =
        axum_test::TestServerBuilder::new().http_transport().build(dashboard::router(state)).unwrap();

    let no_token = server.get("/").await;
    assert_eq!(no_token.status_code(), axum::http::StatusCode::UNAUTHORIZED);

    let asset = server.get("/assets/app.js").await;
    assert_ne!(asset.status_code(), axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dashboard_serves_html_with_correct_token() {
    let state = Arc::new(HubState::new(Arc::new(config()), "m".repeat(64), CancellationToken::new()));
    let master_token = state.master_token.clone();
    let server =
        axum_test::TestServerBuilder::new().http_transport().build(dashboard::router(state)).unwrap();

    let response = server.get(&format!("/?token={master_token}")).await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("itwillsync hub"));
}
