//! Request dispatch.
//!
//! # Responsibilities
//! - Turn a parsed request (or a parse failure) into a complete response
//! - Hand local targets to the file server and remote ones to the proxy
//! - Convert every error into an HTML error response
//!
//! # Design Decisions
//! - Status codes are chosen from error kinds, never from error text
//! - The cache is injected, so independent dispatchers never share state

use bytes::Bytes;

use super::matcher::{route, Route};
use crate::cache::ProxyCache;
use crate::config::ProxyConfig;
use crate::files::StaticFiles;
use crate::http::message::HttpRequest;
use crate::http::parser::ParseError;
use crate::http::response::{HttpResponse, StatusCode};
use crate::proxy::{OriginClient, ProxyError, ProxyHandler};

/// Routes requests to local files, the proxy, or an error page.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    files: StaticFiles,
    proxy: ProxyHandler,
}

impl Dispatcher {
    pub fn new(files: StaticFiles, proxy: ProxyHandler) -> Self {
        Self { files, proxy }
    }

    /// Build a dispatcher for `config` around an existing cache.
    pub fn from_config(config: &ProxyConfig, cache: ProxyCache) -> Self {
        let client = OriginClient::new(&config.timeouts, &config.limits);
        Self::new(
            StaticFiles::new(config.listener.web_root.clone()),
            ProxyHandler::new(cache, client),
        )
    }

    pub fn cache(&self) -> &ProxyCache {
        self.proxy.cache()
    }

    /// Produce the serialized response for `request`.
    pub async fn dispatch(&self, request: &HttpRequest) -> Bytes {
        let decision = route(request);
        tracing::debug!(
            method = %request.method,
            target = %request.target,
            route = ?decision,
            "Dispatching request"
        );

        match decision {
            Route::UnsupportedVersion => {
                HttpResponse::error(StatusCode::HttpVersionNotSupported).to_bytes()
            }
            Route::MethodNotAllowed => HttpResponse::error(StatusCode::MethodNotAllowed)
                .with_header("Allow", "GET, HEAD")
                .to_bytes(),
            Route::Tls => HttpResponse::error(StatusCode::NotImplemented).to_bytes(),
            Route::Local => self.files.serve(request).await.to_bytes(),
            Route::Remote => match self.proxy.handle(request).await {
                Ok(response) => response,
                Err(e) => proxy_error_response(&e).to_bytes(),
            },
        }
    }

    /// Response for a request that could not be parsed.
    pub fn reject(error: &ParseError) -> Bytes {
        parse_error_response(error).to_bytes()
    }
}

fn parse_error_response(error: &ParseError) -> HttpResponse {
    if error.is_unsupported_version() {
        HttpResponse::error(StatusCode::HttpVersionNotSupported)
    } else {
        HttpResponse::error_with_message(StatusCode::BadRequest, &error.to_string())
    }
}

fn proxy_error_response(error: &ProxyError) -> HttpResponse {
    match error {
        ProxyError::InvalidTarget(_) => {
            HttpResponse::error_with_message(StatusCode::BadRequest, &error.to_string())
        }
        ProxyError::Fetch(_) => {
            HttpResponse::error_with_message(StatusCode::InternalServerError, &error.to_string())
        }
    }
}
