//! Shared response cache.
//!
//! # Responsibilities
//! - Serve repeat GETs for the same logical URI without dialing out
//! - Honor `Cache-Control: max-age` freshness on stored entries
//!
//! # Design Decisions
//! - Keyed by the logical (inbound-host) URI, so the same resource served
//!   by different physical backends shares one entry
//! - Only successful GET responses with an explicit positive max-age are
//!   stored; no heuristic freshness
//! - In-memory map as the default plug-in; expired entries evict lazily

use std::time::{Duration, Instant};

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use dashmap::DashMap;

/// A stored response with its freshness deadline.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    expires_at: Instant,
}

/// In-memory shared response cache.
#[derive(Debug, Default)]
pub struct HttpCache {
    entries: DashMap<String, CachedResponse>,
}

impl HttpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh entry for `key`, evicting it if stale.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.clone())
    }

    /// Store a response if its headers grant it a freshness lifetime.
    pub fn store(&self, key: &str, status: StatusCode, headers: &HeaderMap, body: &Bytes) {
        if status != StatusCode::OK {
            return;
        }
        let Some(ttl) = freshness_lifetime(headers) else {
            return;
        };
        self.entries.insert(
            key.to_owned(),
            CachedResponse {
                status,
                headers: headers.clone(),
                body: body.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Positive `max-age` from Cache-Control, unless caching is forbidden.
fn freshness_lifetime(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("cache-control")?.to_str().ok()?;
    let mut max_age = None;
    for directive in value.split(',') {
        let directive = directive.trim().to_ascii_lowercase();
        if directive == "no-store" || directive == "no-cache" || directive == "private" {
            return None;
        }
        if let Some(seconds) = directive.strip_prefix("max-age=") {
            max_age = seconds.parse::<u64>().ok();
        }
    }
    match max_age {
        Some(seconds) if seconds > 0 => Some(Duration::from_secs(seconds)),
        _ => None,
    }
}
