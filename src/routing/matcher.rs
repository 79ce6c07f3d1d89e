//! Request classification.
//!
//! # Responsibilities
//! - Reject versions and methods this server does not serve
//! - Tell proxy targets (absolute `http://`) from local paths
//!
//! # Design Decisions
//! - Scheme prefixes are matched case-sensitively, as received
//! - Anything that is not an absolute `http://` or `https://` URL is local

use crate::http::message::{HttpRequest, HTTP_VERSION};

/// Where a request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Version other than `HTTP/1.1` (505).
    UnsupportedVersion,
    /// Method other than GET or HEAD (405).
    MethodNotAllowed,
    /// Absolute `http://` target, served through the proxy cache.
    Remote,
    /// Absolute `https://` target; tunneling is not implemented (501).
    Tls,
    /// Anything else, served from the web root.
    Local,
}

/// Classify a request.
pub fn route(request: &HttpRequest) -> Route {
    if request.version != HTTP_VERSION {
        Route::UnsupportedVersion
    } else if !request.method.is_served() {
        Route::MethodNotAllowed
    } else if request.target.starts_with("http://") {
        Route::Remote
    } else if request.target.starts_with("https://") {
        Route::Tls
    } else {
        Route::Local
    }
}
