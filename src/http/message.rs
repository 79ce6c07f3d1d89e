//! HTTP message model.
//!
//! # Responsibilities
//! - Represent a parsed request (method, target, version, headers, body)
//! - Represent the head of an origin response (status, headers)
//! - Ordered, case-preserving header storage with case-insensitive lookup
//! - Serialize a request back onto the wire
//!
//! # Design Decisions
//! - Field values are stored exactly as received (no whitespace trimming), so
//!   parse → serialize reproduces the original field-lines byte for byte
//! - `body: None` means "no body present", which is distinct from an empty body

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::str::FromStr;

/// The only protocol version this server speaks.
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Request methods recognised by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }

    /// Methods this server actually serves.
    pub fn is_served(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a token is not one of the supported methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod;

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Method names are case-sensitive (RFC 9110 §9.1).
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(UnknownMethod),
        }
    }
}

/// Ordered header fields.
///
/// Names keep the case they were received with; lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field exactly as it appeared on the wire.
    pub fn append_raw(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Set a field, replacing any existing fields with the same name.
    ///
    /// The stored value gets the conventional single space after the colon.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.fields.push((name.to_string(), format!(" {value}")));
    }

    /// Remove every field with the given name.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Value of the first field with the given name, without surrounding
    /// optional whitespace.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw(name).map(|v| v.trim_matches(|c| c == ' ' || c == '\t'))
    }

    /// Value of the first field with the given name, exactly as stored.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.raw(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn write_to(&self, buf: &mut BytesMut) {
        for (name, value) in &self.fields {
            buf.put_slice(name.as_bytes());
            buf.put_u8(b':');
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
    }
}

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Build a body-less `HTTP/1.1` request.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: HTTP_VERSION.to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Serialize start-line, field-lines, blank line and body.
    pub fn to_bytes(&self) -> Bytes {
        let body_len = self.body.as_ref().map_or(0, Bytes::len);
        let mut buf = BytesMut::with_capacity(256 + body_len);
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.target.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.version.as_bytes());
        buf.put_slice(b"\r\n");
        self.headers.write_to(&mut buf);
        buf.put_slice(b"\r\n");
        if let Some(body) = &self.body {
            buf.put_slice(body);
        }
        buf.freeze()
    }
}

/// Status-line and header fields of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}
