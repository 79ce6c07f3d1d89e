//! Caching HTTP/1.1 proxy library.
//!
//! Serves files from a web root and forwards absolute `http://` requests to
//! their origin, keeping fetched responses in a TTL cache that is revalidated
//! with `If-Modified-Since`.

pub mod cache;
pub mod config;
pub mod files;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use cache::ProxyCache;
pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::Dispatcher;
