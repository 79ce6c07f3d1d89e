//! Proxy cache and revalidation behaviour against a live mock origin.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use caching_proxy::ProxyCache;

mod common;

use common::{
    header_value, ok_response, proxy_get, send_raw, start_mock_origin, start_programmable_origin,
    start_proxy, start_revalidating_origin, test_config, ORIGIN_LAST_MODIFIED,
};

#[tokio::test]
async fn fresh_entry_is_served_without_contacting_origin() {
    let web_root = tempfile::tempdir().unwrap();
    let origin = start_mock_origin("hello from origin").await;
    let proxy = start_proxy(test_config(web_root.path())).await;
    let url = origin.url("/page");

    let first = proxy_get(proxy.addr, &url).await;
    let second = proxy_get(proxy.addr, &url).await;

    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.ends_with("hello from origin"));
    assert_eq!(first, second, "cached bytes must be returned verbatim");
    assert_eq!(origin.request_count(), 1);
    assert_eq!(proxy.cache.len(), 1);

    proxy.stop().await;
}

#[tokio::test]
async fn upstream_request_uses_origin_form_and_closes() {
    let web_root = tempfile::tempdir().unwrap();
    let origin = start_mock_origin("x").await;
    let proxy = start_proxy(test_config(web_root.path())).await;

    proxy_get(proxy.addr, &origin.url("/a/b?q=1")).await;

    let requests = origin.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("GET /a/b?q=1 HTTP/1.1\r\n"));
    assert_eq!(header_value(&requests[0], "Host"), Some(origin.addr.to_string().as_str()));
    assert_eq!(header_value(&requests[0], "Connection"), Some("close"));
    assert_eq!(header_value(&requests[0], "User-Agent"), Some("test"));

    // Dot segments reach the origin untouched.
    proxy_get(proxy.addr, &origin.url("/a/../b")).await;
    assert!(origin.requests()[1].starts_with("GET /a/../b HTTP/1.1\r\n"));

    proxy.stop().await;
}

#[tokio::test]
async fn stale_entry_is_revalidated_with_stored_validator() {
    let web_root = tempfile::tempdir().unwrap();
    let origin = start_revalidating_origin("original body").await;
    let mut config = test_config(web_root.path());
    config.cache.ttl_secs = 0;
    let proxy = start_proxy(config).await;
    let url = origin.url("/doc");

    let first = proxy_get(proxy.addr, &url).await;
    let stored = proxy.cache.get(&url).unwrap();
    assert!(origin.requests()[0].find("If-Modified-Since").is_none());

    let second = proxy_get(proxy.addr, &url).await;
    let requests = origin.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        header_value(&requests[1], "If-Modified-Since"),
        Some(stored.validator.as_str())
    );

    // 304: the client sees the original response, the validator moves on.
    assert_eq!(first, second);
    assert!(second.ends_with("original body"));
    let refreshed = proxy.cache.get(&url).unwrap();
    assert_eq!(refreshed.validator, ORIGIN_LAST_MODIFIED);
    assert_eq!(refreshed.response, stored.response);
    assert!(refreshed.expires_at > stored.expires_at);

    proxy_get(proxy.addr, &url).await;
    assert_eq!(
        header_value(&origin.requests()[2], "If-Modified-Since"),
        Some(ORIGIN_LAST_MODIFIED)
    );

    proxy.stop().await;
}

#[tokio::test]
async fn not_modified_makes_entry_fresh_again() {
    let web_root = tempfile::tempdir().unwrap();
    let origin = start_revalidating_origin("steady").await;
    let mut config = test_config(web_root.path());
    config.cache.ttl_secs = 1;
    let proxy = start_proxy(config).await;
    let url = origin.url("/steady");

    proxy_get(proxy.addr, &url).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!ProxyCache::is_valid(&proxy.cache.get(&url).unwrap(), Instant::now()));

    // Stale: revalidated with a 304, which restarts the TTL.
    assert!(proxy_get(proxy.addr, &url).await.ends_with("steady"));
    assert_eq!(origin.request_count(), 2);
    assert!(ProxyCache::is_valid(&proxy.cache.get(&url).unwrap(), Instant::now()));

    // Fresh again: served without contacting the origin.
    assert!(proxy_get(proxy.addr, &url).await.ends_with("steady"));
    assert_eq!(origin.request_count(), 2);

    proxy.stop().await;
}

#[tokio::test]
async fn changed_origin_response_replaces_entry() {
    let web_root = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let origin = start_programmable_origin(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        ok_response(&format!("version {n}"))
    })
    .await;
    let mut config = test_config(web_root.path());
    config.cache.ttl_secs = 0;
    let proxy = start_proxy(config).await;
    let url = origin.url("/");

    assert!(proxy_get(proxy.addr, &url).await.ends_with("version 1"));
    assert!(proxy_get(proxy.addr, &url).await.ends_with("version 2"));

    let entry = proxy.cache.get(&url).unwrap();
    assert!(String::from_utf8_lossy(&entry.response).ends_with("version 2"));
    assert_ne!(entry.validator, ORIGIN_LAST_MODIFIED);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    proxy.stop().await;
}

#[tokio::test]
async fn head_requests_bypass_the_cache() {
    let web_root = tempfile::tempdir().unwrap();
    let origin = start_mock_origin("body").await;
    let proxy = start_proxy(test_config(web_root.path())).await;
    let url = origin.url("/h");

    let request = format!("HEAD {url} HTTP/1.1\r\n\r\n");
    let response = send_raw(proxy.addr, request.as_bytes()).await;
    assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(proxy.cache.is_empty());

    send_raw(proxy.addr, request.as_bytes()).await;
    assert_eq!(origin.request_count(), 2);

    proxy.stop().await;
}

#[tokio::test]
async fn unreachable_origin_yields_500_and_caches_nothing() {
    let web_root = tempfile::tempdir().unwrap();
    let closed_port = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let proxy = start_proxy(test_config(web_root.path())).await;
    let url = format!("http://127.0.0.1:{closed_port}/");

    let response = proxy_get(proxy.addr, &url).await;
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(response.contains("Content-Type: text/html"));
    assert!(proxy.cache.is_empty());

    proxy.stop().await;
}

#[tokio::test]
async fn independent_proxies_do_not_share_a_cache() {
    let web_root = tempfile::tempdir().unwrap();
    let origin = start_mock_origin("shared?").await;
    let a = start_proxy(test_config(web_root.path())).await;
    let b = start_proxy(test_config(web_root.path())).await;
    let url = origin.url("/");

    proxy_get(a.addr, &url).await;
    proxy_get(b.addr, &url).await;
    assert_eq!(origin.request_count(), 2);
    assert_eq!(a.cache.len(), 1);
    assert_eq!(b.cache.len(), 1);

    a.stop().await;
    b.stop().await;
}
