//! Forward-proxy request handling with cache revalidation.
//!
//! # Data Flow
//! ```text
//! absolute http:// target
//!     → RemoteTarget::parse (origin + origin-form path)
//!     → cache lookup
//!         fresh  → cached bytes, no network
//!         stale  → If-Modified-Since: <validator>
//!         absent → unconditional
//!     → OriginClient::fetch
//!     → 304 on a conditional fetch → re-stamp old bytes, serve them
//!     → anything else              → store and serve as received
//! ```
//!
//! # Design Decisions
//! - The client never sees a bare 304 produced by revalidation
//! - HEAD bypasses the cache entirely: a body-less response must not be
//!   stored under a key that GET requests reuse
//! - Lookup, fetch and re-store are not atomic; concurrent requests for one
//!   target race and the last store wins

use bytes::Bytes;
use std::time::Instant as StdInstant;
use thiserror::Error;
use tokio::time::Instant;

use super::origin::{FetchError, OriginClient, RemoteTarget, TargetError};
use crate::cache::ProxyCache;
use crate::http::message::{HttpRequest, Method};
use crate::http::parser::parse_response_head;
use crate::observability::metrics::{self, CacheOutcome};

/// Errors surfaced to the dispatcher.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid proxy target: {0}")]
    InvalidTarget(#[from] TargetError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Serves absolute `http://` targets through the shared cache.
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    cache: ProxyCache,
    client: OriginClient,
}

impl ProxyHandler {
    pub fn new(cache: ProxyCache, client: OriginClient) -> Self {
        Self { cache, client }
    }

    pub fn cache(&self) -> &ProxyCache {
        &self.cache
    }

    /// Produce the serialized response for a remote target.
    pub async fn handle(&self, request: &HttpRequest) -> Result<Bytes, ProxyError> {
        let remote = RemoteTarget::parse(&request.target)?;
        let mut outbound = outbound_request(request, &remote);

        if request.method == Method::Head {
            tracing::debug!(target = %request.target, "HEAD request bypasses cache");
            return Ok(self.fetch(&remote, &outbound).await?);
        }

        let cached = self.cache.get(&request.target);
        match &cached {
            Some(entry) if ProxyCache::is_valid(entry, Instant::now()) => {
                tracing::debug!(target = %request.target, "Serving fresh cache entry");
                metrics::record_cache_lookup(CacheOutcome::Hit);
                return Ok(entry.response.clone());
            }
            Some(entry) => {
                tracing::debug!(
                    target = %request.target,
                    validator = %entry.validator,
                    "Revalidating stale cache entry"
                );
                metrics::record_cache_lookup(CacheOutcome::Stale);
                outbound.headers.insert("If-Modified-Since", &entry.validator);
            }
            None => {
                tracing::debug!(target = %request.target, "Cache miss");
                metrics::record_cache_lookup(CacheOutcome::Miss);
            }
        }

        let response = self.fetch(&remote, &outbound).await?;

        if let Some(entry) = cached {
            let head = parse_response_head(&response).ok();
            let not_modified = head.as_ref().is_some_and(|h| h.is_not_modified());
            metrics::record_revalidation(not_modified);

            if not_modified {
                let validator = head
                    .as_ref()
                    .and_then(|h| h.header("Last-Modified"))
                    .map(str::to_string);
                tracing::info!(
                    target = %request.target,
                    validator = ?validator,
                    "Origin reports not modified; refreshing cache entry"
                );
                self.cache
                    .set(&request.target, entry.response.clone(), validator);
                return Ok(entry.response);
            }
        }

        self.cache.set(&request.target, response.clone(), None);
        Ok(response)
    }

    async fn fetch(&self, remote: &RemoteTarget, outbound: &HttpRequest) -> Result<Bytes, FetchError> {
        let start = StdInstant::now();
        let result = self.client.fetch(&remote.origin, outbound).await;
        metrics::record_origin_fetch(start);
        if let Err(e) = &result {
            tracing::warn!(origin = %remote.origin, error = %e, "Origin fetch failed");
        }
        result
    }
}

/// The request to send upstream: origin-form target, `Host` set to the
/// origin, and `Connection: close` since the response is framed by close.
fn outbound_request(request: &HttpRequest, remote: &RemoteTarget) -> HttpRequest {
    let mut outbound = request.clone();
    outbound.target = remote.path.clone();
    outbound.headers.remove("Proxy-Connection");
    outbound.headers.remove("If-Modified-Since");
    if !outbound.headers.contains("Host") {
        outbound.headers.insert("Host", &remote.origin.host_header());
    }
    outbound.headers.insert("Connection", "close");
    outbound
}
