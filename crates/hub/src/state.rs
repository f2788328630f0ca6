// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::preview::PreviewCollector;
use crate::registry::Registry;

/// Shared hub state: the session registry, the dashboard rate limiter, the
/// preview collector, and the config/shutdown handles every transport layer
/// needs, split across [`Registry`] and [`PreviewCollector`] instead of one
/// flat session map.
pub struct HubState {
    pub registry: Arc<Registry>,
    pub preview: Arc<PreviewCollector>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<HubConfig>,
    pub master_token: String,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl HubState {
    pub fn new(config: Arc<HubConfig>, master_token: String, shutdown: CancellationToken) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            preview: Arc::new(PreviewCollector::new()),
            rate_limiter: RateLimiter::new(config.rate_limit_strikes, config.rate_limit_block()),
            config,
            master_token,
            shutdown,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Per-IP failed-attempt tracking for the dashboard's token auth.
struct RateLimiterEntry {
    failures: u32,
    blocked_until: Option<Instant>,
}

/// Single mutex-protected rate limiter map, garbage-collected implicitly:
/// entries reset to zero failures on a successful comparison and are
/// overwritten the next time that IP is seen after its block expires.
pub struct RateLimiter {
    strikes: u32,
    block_duration: std::time::Duration,
    entries: RwLock<HashMap<IpAddr, RateLimiterEntry>>,
}

impl RateLimiter {
    pub fn new(strikes: u32, block_duration: std::time::Duration) -> Self {
        Self { strikes, block_duration, entries: RwLock::new(HashMap::new()) }
    }

    /// True if `ip` is currently within its block window.
    pub async fn is_blocked(&self, ip: IpAddr) -> bool {
        let entries = self.entries.read().await;
        match entries.get(&ip) {
            Some(entry) => entry.blocked_until.is_some_and(|until| Instant::now() < until),
            None => false,
        }
    }

    /// Record a failed token comparison; blocks the IP once it reaches the
    /// configured strike count.
    pub async fn record_failure(&self, ip: IpAddr) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(ip).or_insert(RateLimiterEntry { failures: 0, blocked_until: None });
        entry.failures += 1;
        if entry.failures >= self.strikes {
            entry.blocked_until = Some(Instant::now() + self.block_duration);
        }
    }

    /// Clear the IP's failure counter after a successful comparison.
    pub async fn record_success(&self, ip: IpAddr) {
        self.entries.write().await.remove(&ip);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
