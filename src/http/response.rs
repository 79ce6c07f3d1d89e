//! Response building.
//!
//! # Responsibilities
//! - Map status codes to reason phrases and HTML error bodies
//! - Stamp the standard header set (`Content-Type`, `Content-Length`, `Date`,
//!   `Server`) on every locally generated response
//! - Serialize to wire bytes
//!
//! # Design Decisions
//! - Proxied responses are relayed as the origin sent them and never pass
//!   through this module
//! - HEAD responses keep the `Content-Length` of the full representation

use bytes::{BufMut, Bytes, BytesMut};
use std::time::SystemTime;

use super::message::HTTP_VERSION;

/// Value of the `Server` header.
pub const SERVER_NAME: &str = concat!("caching-proxy/", env!("CARGO_PKG_VERSION"));

/// Status codes this server produces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NotModified,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    NotImplemented,
    HttpVersionNotSupported,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::HttpVersionNotSupported => 505,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

/// Format a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// A response generated by this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    /// Headers beyond the standard set, in order.
    pub extra_headers: Vec<(&'static str, String)>,
    pub body: Bytes,
    /// Length to advertise when the body has been withheld (HEAD).
    content_length: Option<usize>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            extra_headers: Vec::new(),
            body: body.into(),
            content_length: None,
        }
    }

    /// An error page with the standard HTML template.
    pub fn error(status: StatusCode) -> Self {
        Self::html(status, error_page(status, None))
    }

    /// An error page with an explanatory message.
    pub fn error_with_message(status: StatusCode, message: &str) -> Self {
        Self::html(status, error_page(status, Some(message)))
    }

    fn html(status: StatusCode, body: String) -> Self {
        Self::new(status, "text/html", body)
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra_headers.push((name, value.into()));
        self
    }

    /// Drop the body but keep advertising its length.
    pub fn without_body(mut self) -> Self {
        self.content_length = Some(self.body.len());
        self.body = Bytes::new();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize with the current time in the `Date` header.
    pub fn to_bytes(&self) -> Bytes {
        self.to_bytes_at(SystemTime::now())
    }

    pub fn to_bytes_at(&self, now: SystemTime) -> Bytes {
        let content_length = self.content_length.unwrap_or(self.body.len());
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.put_slice(
            format!(
                "{HTTP_VERSION} {} {}\r\n",
                self.status.as_u16(),
                self.status.reason()
            )
            .as_bytes(),
        );
        buf.put_slice(format!("Content-Type: {}\r\n", self.content_type).as_bytes());
        buf.put_slice(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put_slice(format!("Date: {}\r\n", http_date(now)).as_bytes());
        buf.put_slice(format!("Server: {SERVER_NAME}\r\n").as_bytes());
        for (name, value) in &self.extra_headers {
            buf.put_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

fn error_page(status: StatusCode, message: Option<&str>) -> String {
    let title = format!("{} {}", status.as_u16(), status.reason());
    match message {
        Some(message) => format!(
            "<html><body><h1>{title}</h1><p>{}</p></body></html>",
            escape_html(message)
        ),
        None => match status {
            StatusCode::Forbidden => {
                format!("<html><body><h1>{title}</h1><p>Access denied.</p></body></html>")
            }
            StatusCode::NotFound => format!(
                "<html><body><h1>{title}</h1><p>The requested resource was not found.</p></body></html>"
            ),
            _ => format!("<html><body><h1>{title}</h1></body></html>"),
        },
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
