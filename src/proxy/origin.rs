//! Origin fetcher.
//!
//! # Responsibilities
//! - Resolve an absolute `http://` target into the origin to contact
//! - Open a fresh connection per request, write the request, read the full
//!   response until the origin closes
//!
//! # Design Decisions
//! - No pooling and no `Content-Length` framing: the response ends when the
//!   origin closes its side, so outbound requests carry `Connection: close`
//! - Every step has a deadline; a silent origin cannot pin a task forever
//! - The response stays raw bytes; nothing is decoded here

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::{LimitsConfig, TimeoutConfig};
use crate::http::message::HttpRequest;

/// Size of each read from the origin socket.
const READ_CHUNK: usize = 4096;

/// Errors while talking to an origin.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to connect to {origin}: {source}")]
    Connect {
        origin: String,
        source: std::io::Error,
    },

    #[error("failed to send request: {0}")]
    Write(std::io::Error),

    #[error("failed to read response: {0}")]
    Read(std::io::Error),

    #[error("origin timed out during {0}")]
    Timeout(&'static str),

    #[error("origin response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

/// Why a target could not be turned into an origin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("target is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("target has no host")]
    MissingHost,
}

/// Host and port of the server that owns a remote target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub host: String,
    pub port: u16,
}

impl Origin {
    /// Value for the `Host` header: the port is omitted when it is the default.
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A remote target split into the origin and the origin-form path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub origin: Origin,
    /// `path[?query]`, as sent on the outbound request-line.
    pub path: String,
}

impl RemoteTarget {
    /// Parse an absolute-form `http://` request target.
    pub fn parse(target: &str) -> Result<Self, TargetError> {
        let url = Url::parse(target)?;
        if url.scheme() != "http" {
            return Err(TargetError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url.host_str().ok_or(TargetError::MissingHost)?.to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        Ok(Self {
            origin: Origin { host, port },
            path: origin_form(target),
        })
    }
}

/// The request-target after the authority, exactly as the client wrote it.
///
/// `Url` normalizes paths (dot segments, percent-encoding), so the path is
/// cut from the raw target instead. The fragment is never sent.
fn origin_form(target: &str) -> String {
    let after_scheme = target.split_once("://").map_or(target, |(_, rest)| rest);
    let rest = match after_scheme.find(['/', '?', '#']) {
        Some(start) => &after_scheme[start..],
        None => "",
    };
    let rest = rest.split('#').next().unwrap_or_default();
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

/// Fetches responses from origin servers.
#[derive(Debug, Clone)]
pub struct OriginClient {
    connect_timeout: Duration,
    read_timeout: Duration,
    max_response_bytes: usize,
}

impl OriginClient {
    pub fn new(timeouts: &TimeoutConfig, limits: &LimitsConfig) -> Self {
        Self {
            connect_timeout: timeouts.connect(),
            read_timeout: timeouts.origin_read(),
            max_response_bytes: limits.max_response_bytes,
        }
    }

    /// Send `request` to `origin` and return everything it sends back before
    /// closing the connection.
    pub async fn fetch(&self, origin: &Origin, request: &HttpRequest) -> Result<Bytes, FetchError> {
        let addr = (origin.host.as_str(), origin.port);
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| FetchError::Timeout("connect"))?
            .map_err(|source| FetchError::Connect {
                origin: origin.to_string(),
                source,
            })?;

        tracing::debug!(origin = %origin, "Connected to origin");

        timeout(self.read_timeout, stream.write_all(&request.to_bytes()))
            .await
            .map_err(|_| FetchError::Timeout("write"))?
            .map_err(FetchError::Write)?;

        let mut response = BytesMut::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = timeout(self.read_timeout, stream.read(&mut chunk))
                .await
                .map_err(|_| FetchError::Timeout("read"))?
                .map_err(FetchError::Read)?;
            if n == 0 {
                break;
            }
            if response.len() + n > self.max_response_bytes {
                return Err(FetchError::ResponseTooLarge {
                    limit: self.max_response_bytes,
                });
            }
            response.extend_from_slice(&chunk[..n]);
        }

        tracing::debug!(origin = %origin, bytes = response.len(), "Origin closed connection");
        Ok(response.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::message::Method;
    use tokio::net::TcpListener;

    fn client(max_response_bytes: usize) -> OriginClient {
        let timeouts = TimeoutConfig {
            connect_secs: 1,
            origin_read_secs: 1,
            ..TimeoutConfig::default()
        };
        let limits = LimitsConfig {
            max_response_bytes,
            ..LimitsConfig::default()
        };
        OriginClient::new(&timeouts, &limits)
    }

    #[test]
    fn parses_remote_targets() {
        let t = RemoteTarget::parse("http://example.com/a/b?x=1").unwrap();
        assert_eq!(t.origin, Origin { host: "example.com".into(), port: 80 });
        assert_eq!(t.path, "/a/b?x=1");
        assert_eq!(t.origin.host_header(), "example.com");

        let t = RemoteTarget::parse("http://localhost:8081").unwrap();
        assert_eq!(t.origin.port, 8081);
        assert_eq!(t.path, "/");
        assert_eq!(t.origin.host_header(), "localhost:8081");

        let t = RemoteTarget::parse("http://example.com?q=1#frag").unwrap();
        assert_eq!(t.path, "/?q=1");
    }

    #[test]
    fn path_is_forwarded_verbatim() {
        let t = RemoteTarget::parse("http://example.com/a/../b").unwrap();
        assert_eq!(t.path, "/a/../b");

        let t = RemoteTarget::parse("http://example.com:8080/{x}/%7e?a=b").unwrap();
        assert_eq!(t.origin.port, 8080);
        assert_eq!(t.path, "/{x}/%7e?a=b");
    }

    #[test]
    fn rejects_bad_targets() {
        assert!(matches!(
            RemoteTarget::parse("http://"),
            Err(TargetError::InvalidUrl(_))
        ));
        assert_eq!(
            RemoteTarget::parse("ftp://example.com/"),
            Err(TargetError::UnsupportedScheme("ftp".into()))
        );
    }

    #[tokio::test]
    async fn reads_until_origin_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let body = "x".repeat(10_000);
        let reply = format!("HTTP/1.1 200 OK\r\n\r\n{body}");
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let origin = Origin { host: "127.0.0.1".into(), port };
        let mut request = HttpRequest::new(Method::Get, "/thing");
        request.headers.insert("Host", "127.0.0.1");
        let response = client(1 << 20).fetch(&origin, &request).await.unwrap();

        assert_eq!(response.len(), 19 + 10_000);
        assert!(response.ends_with(body.as_bytes()));
        assert_eq!(server.await.unwrap(), "GET /thing HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n");
    }

    #[tokio::test]
    async fn enforces_response_size_cap() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(&[b'a'; 8192]).await;
        });

        let origin = Origin { host: "127.0.0.1".into(), port };
        let err = client(1000)
            .fetch(&origin, &HttpRequest::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge { limit: 1000 }));
    }

    #[tokio::test]
    async fn silent_origin_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let origin = Origin { host: "127.0.0.1".into(), port };
        let err = client(1024)
            .fetch(&origin, &HttpRequest::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout("read")));
        hold.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let origin = Origin { host: "127.0.0.1".into(), port };
        let err = client(1024)
            .fetch(&origin, &HttpRequest::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Connect { .. }));
    }
}
