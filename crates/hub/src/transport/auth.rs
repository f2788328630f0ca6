// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::HubError;
use crate::state::HubState;

/// Constant-time string comparison, independent of where the first
/// differing byte falls, per the dashboard's timing-safe auth requirement.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Extract the `token` query parameter from a raw query string.
pub fn token_from_query(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| pair.strip_prefix("token="))
}

/// Axum middleware enforcing master-token auth on the dashboard server.
///
/// Exempt: `/assets/*` (bundled build artifacts, no secrets). Everything
/// else — including the dashboard HTML and the WebSocket upgrade — requires
/// `?token=<masterToken>`, rate-limited per client IP.
pub async fn auth_layer(
    State(state): State<Arc<HubState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path.starts_with("/assets/") {
        return next.run(req).await;
    }

    let ip: IpAddr = addr.ip();
    if state.rate_limiter.is_blocked(ip).await {
        return HubError::RateLimited.into_response();
    }

    let query = req.uri().query().unwrap_or("");
    let provided = token_from_query(query);

    let ok = provided.is_some_and(|tok| constant_time_eq(tok, &state.master_token));

    if ok {
        state.rate_limiter.record_success(ip).await;
        next.run(req).await
    } else {
        state.rate_limiter.record_failure(ip).await;
        if state.rate_limiter.is_blocked(ip).await {
            HubError::RateLimited.into_response()
        } else {
            (StatusCode::UNAUTHORIZED, axum::Json(HubError::Unauthorized.to_error_body("invalid token")))
                .into_response()
        }
    }
}
