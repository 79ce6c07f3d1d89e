//! HTTP/1.1 protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one task per connection)
//!     → parser.rs (bytes → HttpRequest / ParseError)
//!     → [routing::Dispatcher picks local files or the proxy]
//!     → response.rs (status line, standard headers, HTML error pages)
//!     → Send to client, close
//! ```

pub mod message;
pub mod parser;
pub mod response;
pub mod server;

pub use message::{Headers, HttpRequest, Method, ResponseHead, HTTP_VERSION};
pub use parser::ParseError;
pub use response::{HttpResponse, StatusCode};
pub use server::HttpServer;
