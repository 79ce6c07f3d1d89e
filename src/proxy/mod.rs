//! Forward proxy subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher (target starts with http://)
//!     → handler.rs (cache lookup, conditional request, re-store)
//!     → origin.rs (connect, write, read until close)
//! ```

pub mod handler;
pub mod origin;

pub use handler::{ProxyError, ProxyHandler};
pub use origin::{FetchError, Origin, OriginClient, RemoteTarget, TargetError};
