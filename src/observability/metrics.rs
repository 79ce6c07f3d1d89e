//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): responses written, by status
//! - `proxy_cache_lookups_total` (counter): cache lookups, by outcome
//!   (`hit`, `stale`, `miss`)
//! - `proxy_revalidations_total` (counter): conditional fetches, by result
//!   (`not_modified`, `replaced`)
//! - `proxy_origin_fetch_duration_seconds` (histogram): origin round trips
//! - `proxy_active_connections` (gauge): connections being served
//! - `proxy_cache_entries` (gauge): entries held by the cache
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
pub const CACHE_LOOKUPS_TOTAL: &str = "proxy_cache_lookups_total";
pub const REVALIDATIONS_TOTAL: &str = "proxy_revalidations_total";
pub const ORIGIN_FETCH_DURATION: &str = "proxy_origin_fetch_duration_seconds";
pub const ACTIVE_CONNECTIONS: &str = "proxy_active_connections";
pub const CACHE_ENTRIES: &str = "proxy_cache_entries";

/// Outcome of consulting the cache for a remote target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Stale,
    Miss,
}

impl CacheOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Stale => "stale",
            CacheOutcome::Miss => "miss",
        }
    }
}

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    metrics::describe_counter!(REQUESTS_TOTAL, "Responses written to clients.");
    metrics::describe_counter!(CACHE_LOOKUPS_TOTAL, "Proxy cache lookups by outcome.");
    metrics::describe_counter!(REVALIDATIONS_TOTAL, "Conditional origin fetches by result.");
    metrics::describe_histogram!(
        ORIGIN_FETCH_DURATION,
        metrics::Unit::Seconds,
        "Duration of origin fetches in seconds."
    );
    metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Client connections being served.");
    metrics::describe_gauge!(CACHE_ENTRIES, "Entries held by the proxy cache.");
}

pub fn record_response(status: Option<u16>) {
    let status = status.map_or_else(|| "unknown".to_string(), |s| s.to_string());
    metrics::counter!(REQUESTS_TOTAL, "status" => status).increment(1);
}

pub fn record_cache_lookup(outcome: CacheOutcome) {
    metrics::counter!(CACHE_LOOKUPS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

pub fn record_revalidation(not_modified: bool) {
    let result = if not_modified { "not_modified" } else { "replaced" };
    metrics::counter!(REVALIDATIONS_TOTAL, "result" => result).increment(1);
}

pub fn record_origin_fetch(start: Instant) {
    metrics::histogram!(ORIGIN_FETCH_DURATION).record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    metrics::gauge!(ACTIVE_CONNECTIONS).set(count as f64);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!(CACHE_ENTRIES).set(entries as f64);
}
