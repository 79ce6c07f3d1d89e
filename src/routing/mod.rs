//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed HttpRequest
//!     → matcher.rs (version, method, target shape → Route)
//!     → dispatcher.rs (run the route: error page, local file, proxy)
//!     → Serialized response bytes
//! ```
//!
//! # Design Decisions
//! - A single-pass decision; there is no multi-step state machine
//! - Deterministic: same request always takes the same route
//! - Checks run in a fixed order: version, method, target scheme

pub mod dispatcher;
pub mod matcher;

pub use dispatcher::Dispatcher;
pub use matcher::{route, Route};
