// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bundled browser asset serving.
//!
//! The real front-end bundle is built by an external collaborator; this
//! module only fixes the interface it is served through: MIME mapping,
//! gzip-with-memoization for compressible types, and the `/` →
//! `/index.html` redirect. `assets/` at the workspace root holds a
//! placeholder `index.html` so the server runs end to end without the
//! real bundle.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::AppState;

struct Asset {
    mime: &'static str,
    bytes: &'static [u8],
}

fn compressible(mime: &str) -> bool {
    matches!(
        mime,
        "text/html" | "application/javascript" | "text/css" | "application/json" | "image/svg+xml"
    )
}

fn mime_for(path: &str) -> &'static str {
    if path.ends_with(".html") {
        "text/html"
    } else if path.ends_with(".js") {
        "application/javascript"
    } else if path.ends_with(".css") {
        "text/css"
    } else if path.ends_with(".svg") {
        "image/svg+xml"
    } else if path.ends_with(".json") {
        "application/json"
    } else if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".ico") {
        "image/x-icon"
    } else {
        "application/octet-stream"
    }
}

fn assets() -> &'static HashMap<&'static str, Asset> {
    static ASSETS: OnceLock<HashMap<&'static str, Asset>> = OnceLock::new();
    ASSETS.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert(
            "/index.html",
            Asset { mime: mime_for("index.html"), bytes: include_bytes!("../../../../assets/index.html") },
        );
        m
    })
}

/// In-memory cache of gzip-compressed asset payloads, keyed by absolute
/// asset path. Populated lazily on first request for a given path.
fn gzip_cache() -> &'static Mutex<HashMap<&'static str, Bytes>> {
    static CACHE: OnceLock<Mutex<HashMap<&'static str, Bytes>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn gzip_compress(data: &[u8]) -> Bytes {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing to an in-memory Vec through GzEncoder cannot fail.
    let _ = encoder.write_all(data);
    Bytes::from(encoder.finish().unwrap_or_default())
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false)
}

pub async fn serve_asset(
    State(_state): State<std::sync::Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = match uri.path() {
        "/" => "/index.html",
        other => other,
    };

    let Some(asset) = assets().get(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if compressible(asset.mime) && accepts_gzip(&headers) {
        let compressed = {
            let mut cache = gzip_cache().lock().unwrap_or_else(|e| e.into_inner());
            cache.entry(path).or_insert_with(|| gzip_compress(asset.bytes)).clone()
        };
        return (
            [(header::CONTENT_TYPE, asset.mime), (header::CONTENT_ENCODING, "gzip")],
            compressed,
        )
            .into_response();
    }

    ([(header::CONTENT_TYPE, asset.mime)], asset.bytes).into_response()
}
