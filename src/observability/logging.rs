//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Build the per-request span that ties events to a connection and request
//!
//! # Design Decisions
//! - `RUST_LOG` takes precedence over the configured level
//! - Human-readable fmt output; no log files

use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::net::connection::ConnectionId;

/// Install the global subscriber. Safe to call more than once; only the first
/// call takes effect.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn default_directive(level: &str) -> String {
    format!("caching_proxy={level},warn")
}

/// Span wrapping the handling of one request.
pub fn request_span(connection_id: ConnectionId, request_id: Uuid) -> Span {
    tracing::info_span!(
        "request",
        connection_id = %connection_id,
        request_id = %request_id,
    )
}
