//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, read / dispatch / write / close)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - One request per connection, no keep-alive

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, ConnectionSettings, ConnectionTracker};
pub use listener::{Listener, ListenerError};
