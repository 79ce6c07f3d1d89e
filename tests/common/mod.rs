//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use caching_proxy::config::ProxyConfig;
use caching_proxy::net::Listener;
use caching_proxy::{HttpServer, ProxyCache, Shutdown};

/// Fixed Last-Modified value served by mock origins.
pub const ORIGIN_LAST_MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

/// A mock origin that records every request head it receives.
pub struct MockOrigin {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    /// Requests received so far, as raw text.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a programmable mock origin. `respond` receives the raw request head
/// and returns the complete raw response to write before closing.
pub async fn start_programmable_origin<F>(respond: F) -> MockOrigin
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let recorded = requests.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let recorded = recorded.clone();
            let respond = respond.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                recorded.lock().unwrap().push(head.clone());
                let response = respond(&head);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockOrigin { addr, requests }
}

/// Origin that always answers 200 with `body` and a fixed Last-Modified.
pub async fn start_mock_origin(body: &'static str) -> MockOrigin {
    start_programmable_origin(move |_| ok_response(body)).await
}

/// Origin that answers 304 to conditional requests and 200 otherwise.
pub async fn start_revalidating_origin(body: &'static str) -> MockOrigin {
    start_programmable_origin(move |head| {
        if header_value(head, "If-Modified-Since").is_some() {
            format!(
                "HTTP/1.1 304 Not Modified\r\nLast-Modified: {ORIGIN_LAST_MODIFIED}\r\nConnection: close\r\n\r\n"
            )
        } else {
            ok_response(body)
        }
    })
    .await
}

pub fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nLast-Modified: {ORIGIN_LAST_MODIFIED}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

/// Value of the first header named `name` (case-insensitive) in a raw head.
pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.split("\r\n").skip(1).find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub cache: ProxyCache,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestProxy {
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.handle.await;
    }
}

/// Default test configuration serving `web_root`.
pub fn test_config(web_root: &Path) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.listener.web_root = web_root.to_path_buf();
    config.timeouts.connect_secs = 2;
    config.timeouts.origin_read_secs = 2;
    config.timeouts.client_read_secs = 2;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);

    let server = HttpServer::new(config);
    let cache = server.cache().clone();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestProxy {
        addr,
        cache,
        shutdown,
        handle,
    }
}

/// Send raw bytes, read until the server closes, return the raw response.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

/// Proxy-form GET for `url`.
pub async fn proxy_get(addr: SocketAddr, url: &str) -> String {
    let request = format!("GET {url} HTTP/1.1\r\nUser-Agent: test\r\n\r\n");
    String::from_utf8(send_raw(addr, request.as_bytes()).await).unwrap()
}
