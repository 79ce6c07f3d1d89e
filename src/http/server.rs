//! HTTP server setup and accept loop.
//!
//! # Responsibilities
//! - Own the shared request dispatcher and proxy cache
//! - Accept connections from a bounded [`Listener`]
//! - Spawn one task per connection, holding its permit for its lifetime
//! - Stop accepting on shutdown and drain in-flight connections

use std::time::Duration;
use tokio::sync::broadcast;

use crate::cache::ProxyCache;
use crate::config::ProxyConfig;
use crate::net::connection::{serve_connection, ConnectionSettings, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};
use crate::routing::Dispatcher;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// HTTP server for the caching proxy.
pub struct HttpServer {
    config: ProxyConfig,
    dispatcher: Dispatcher,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and a fresh cache.
    pub fn new(config: ProxyConfig) -> Self {
        let cache = ProxyCache::new(config.cache.ttl());
        let dispatcher = Dispatcher::from_config(&config, cache);
        Self {
            config,
            dispatcher,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let settings = ConnectionSettings::from_config(&self.config);
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                address = %addr,
                web_root = %self.config.listener.web_root.display(),
                cache_ttl_secs = self.config.cache.ttl_secs,
                "HTTP server starting"
            );
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr, permit) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    tracing::debug!(
                        connection_id = %guard.id(),
                        peer_addr = %peer_addr,
                        "Serving connection"
                    );

                    let dispatcher = self.dispatcher.clone();
                    let settings = settings.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, peer_addr, dispatcher, settings, guard).await;
                        drop(permit);
                    });
                }
            }
        }

        let grace = self.config.timeouts.shutdown_grace();
        let in_flight = self.tracker.active_count();
        if in_flight > 0 {
            tracing::info!(in_flight, grace_secs = grace.as_secs(), "Draining connections");
        }
        if !self.tracker.wait_for_idle(grace).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Grace period elapsed with connections still open"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The cache shared by every connection this server handles.
    pub fn cache(&self) -> &ProxyCache {
        self.dispatcher.cache()
    }
}
