//! Static file serving.
//!
//! # Responsibilities
//! - Map a local request target onto a file under the web root
//! - Refuse anything that would escape the web root
//! - Answer conditional GETs (`If-Modified-Since`) with 304
//! - Report failures as complete error responses, never as errors
//!
//! # Design Decisions
//! - Targets containing `..` are refused before the file system is touched
//! - The resolved path is canonicalized, so symlinks cannot leave the root
//! - Files are read as bytes; no text decoding

pub mod mime;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

use crate::http::message::{HttpRequest, Method};
use crate::http::response::{http_date, HttpResponse, StatusCode};

const INDEX_FILE: &str = "index.html";

/// Serves files below a web root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build the complete response for a local target.
    pub async fn serve(&self, request: &HttpRequest) -> HttpResponse {
        let path = request.target.split('?').next().unwrap_or_default();

        if path.contains("..") {
            tracing::warn!(target = %request.target, "Path traversal attempt blocked");
            return HttpResponse::error(StatusCode::Forbidden);
        }

        let root = match fs::canonicalize(&self.root).await {
            Ok(root) => root,
            Err(e) => {
                tracing::error!(root = %self.root.display(), error = %e, "Web root unavailable");
                return HttpResponse::error_with_message(
                    StatusCode::InternalServerError,
                    "Web root is unavailable.",
                );
            }
        };

        let relative = match path.trim_start_matches('/') {
            "" => INDEX_FILE,
            rest => rest,
        };
        let mut candidate = root.join(relative);
        if fs::metadata(&candidate).await.is_ok_and(|m| m.is_dir()) {
            candidate.push(INDEX_FILE);
        }

        let resolved = match fs::canonicalize(&candidate).await {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return HttpResponse::error(StatusCode::Forbidden);
            }
            Err(_) => return HttpResponse::error(StatusCode::NotFound),
        };
        if !resolved.starts_with(&root) {
            tracing::warn!(
                target = %request.target,
                resolved = %resolved.display(),
                "Resolved path escapes web root"
            );
            return HttpResponse::error(StatusCode::Forbidden);
        }

        let metadata = match fs::metadata(&resolved).await {
            Ok(m) if m.is_file() => m,
            _ => return HttpResponse::error(StatusCode::NotFound),
        };
        let modified = metadata.modified().ok();

        if let Some(modified) = modified {
            if not_modified_since(request.header("If-Modified-Since"), modified) {
                return HttpResponse::new(StatusCode::NotModified, "text/html", "")
                    .with_header("Last-Modified", http_date(modified));
            }
        }

        let contents = match fs::read(&resolved).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return HttpResponse::error(StatusCode::Forbidden);
            }
            Err(e) => {
                tracing::error!(path = %resolved.display(), error = %e, "Failed to read file");
                return HttpResponse::error_with_message(
                    StatusCode::InternalServerError,
                    &e.to_string(),
                );
            }
        };

        let mut response =
            HttpResponse::new(StatusCode::Ok, mime::content_type_for(&resolved), contents);
        if let Some(modified) = modified {
            response = response.with_header("Last-Modified", http_date(modified));
        }
        if request.method == Method::Head {
            response = response.without_body();
        }
        response
    }
}

/// Whether a file modified at `modified` is unchanged relative to the
/// client's `If-Modified-Since` value. Unparsable dates never match.
fn not_modified_since(if_modified_since: Option<&str>, modified: SystemTime) -> bool {
    let Some(since) = if_modified_since.and_then(|v| httpdate::parse_http_date(v.trim()).ok())
    else {
        return false;
    };
    // HTTP dates have one-second resolution.
    let secs = |t: SystemTime| t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    secs(modified) <= secs(since)
}
