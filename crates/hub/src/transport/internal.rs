// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The internal control API: plain, unauthenticated HTTP bound to loopback
//! only — the OS's loopback boundary is the only auth this surface needs.
//! Routes: health, session registration, metadata, heartbeat, stop, rename,
//! and a loopback-only shutdown used by the CLI's `hub stop` subcommand.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::error::HubError;
use crate::registry::{Registration, SessionInfo};
use crate::state::HubState;

pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", get(list_sessions).post(register_session))
        .route("/api/sessions/{id}", get(session_metadata).delete(deregister_session))
        .route("/api/sessions/{id}/heartbeat", put(heartbeat))
        .route("/api/sessions/{id}/stop", post(stop_session))
        .route("/api/sessions/{id}/rename", put(rename_session))
        .route("/api/shutdown", post(shutdown))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: usize,
    uptime: u64,
}

async fn health(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    let sessions = state.registry.size().await;
    Json(HealthResponse { status: "ok", sessions, uptime: state.uptime_secs() })
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionInfo>,
}

async fn list_sessions(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    Json(SessionsResponse { sessions: state.registry.get_all().await })
}

#[derive(Deserialize)]
struct RegisterBody {
    name: Option<String>,
    port: Option<u16>,
    token: Option<String>,
    agent: Option<String>,
    cwd: Option<String>,
    pid: Option<u32>,
}

#[derive(Serialize)]
struct SessionResponse {
    session: SessionInfo,
}

async fn register_session(
    State(state): State<Arc<HubState>>,
    Json(body): Json<RegisterBody>,
) -> axum::response::Response {
    let (Some(port), Some(token), Some(agent), Some(cwd), Some(pid)) =
        (body.port, body.token, body.agent, body.cwd, body.pid)
    else {
        return HubError::BadRequest.with_message("missing required registration field").into_response();
    };

    let registration = Registration {
        name: body.name.unwrap_or_else(|| "agent".to_string()),
        port,
        token,
        agent,
        cwd,
        pid,
    };

    let session = state.registry.register(registration).await;
    (axum::http::StatusCode::CREATED, Json(SessionResponse { session })).into_response()
}

#[derive(Serialize)]
struct MetadataResponse {
    #[serde(flatten)]
    session: SessionInfo,
    #[serde(rename = "uptimeMs")]
    uptime_ms: u64,
    #[serde(rename = "residentMemoryKb", skip_serializing_if = "Option::is_none")]
    resident_memory_kb: Option<u64>,
}

async fn session_metadata(
    State(state): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.registry.get_by_id(&id).await {
        Some(session) => {
            let uptime_ms = crate::registry::epoch_ms().saturating_sub(session.connected_at);
            let resident_memory_kb = crate::registry::resident_memory_kb(session.pid);
            Json(MetadataResponse { session, uptime_ms, resident_memory_kb }).into_response()
        }
        None => HubError::SessionNotFound.into_response(),
    }
}

async fn deregister_session(
    State(state): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if state.registry.unregister(&id).await {
        axum::http::StatusCode::OK.into_response()
    } else {
        HubError::SessionNotFound.into_response()
    }
}

async fn heartbeat(
    State(state): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.registry.update_last_seen(&id).await {
        Some(_) => axum::http::StatusCode::OK.into_response(),
        None => HubError::SessionNotFound.into_response(),
    }
}

async fn stop_session(
    State(state): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(session) = state.registry.get_by_id(&id).await else {
        return HubError::SessionNotFound.into_response();
    };
    let _ = kill(Pid::from_raw(session.pid as i32), Signal::SIGTERM);
    state.registry.unregister(&id).await;
    axum::http::StatusCode::OK.into_response()
}

#[derive(Deserialize)]
struct RenameBody {
    name: Option<String>,
}

#[derive(Serialize)]
struct RenameResponse {
    ok: bool,
    session: SessionInfo,
}

async fn rename_session(
    State(state): State<Arc<HubState>>,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> axum::response::Response {
    let Some(name) = body.name.filter(|n| !n.trim().is_empty()) else {
        return HubError::BadRequest.with_message("missing name").into_response();
    };
    match state.registry.rename(&id, name).await {
        Some(session) => Json(RenameResponse { ok: true, session }).into_response(),
        None => HubError::SessionNotFound.into_response(),
    }
}

/// Loopback-only shutdown, used by the CLI's `hub stop` subcommand, which
/// has access only to the state file's internal port, never the master
/// token.
async fn shutdown(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    state.shutdown.cancel();
    axum::http::StatusCode::OK
}

#[cfg(test)]
#[path = "internal_tests.rs"]
mod tests;
