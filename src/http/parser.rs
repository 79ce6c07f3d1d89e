//! HTTP/1.1 message parser.
//!
//! Works directly on the received byte buffer with an explicit cursor, so every
//! error can report the offset at which it was detected. The parser is pure:
//! no I/O, no allocation beyond the owned strings of the resulting message.
//!
//! # Grammar (RFC 9112, reduced)
//! ```text
//! request-line = method SP request-target SP HTTP-version CRLF
//! status-line  = HTTP-version SP status-code [ SP reason-phrase ] CRLF
//! field-line   = field-name ":" field-value CRLF
//! ```

use bytes::Bytes;
use thiserror::Error;

use super::message::{Headers, HttpRequest, Method, ResponseHead, HTTP_VERSION};

/// Reasons a buffer could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("incomplete message: expected CRLF after byte {at}")]
    Incomplete { at: usize },

    #[error("malformed request-line")]
    MalformedRequestLine,

    #[error("malformed status-line")]
    MalformedStatusLine,

    #[error("invalid request-line method")]
    InvalidMethod,

    #[error("invalid HTTP version")]
    InvalidVersion,

    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    #[error("malformed header field-line at byte {at}")]
    MalformedHeaderLine { at: usize },

    #[error("invalid header field-line at byte {at}, unexpected CR or LF")]
    InvalidHeaderLine { at: usize },

    #[error("message head is not valid UTF-8 at byte {at}")]
    InvalidEncoding { at: usize },
}

impl ParseError {
    /// Whether the client should get `505` rather than `400`.
    pub fn is_unsupported_version(&self) -> bool {
        matches!(self, ParseError::UnsupportedVersion(_))
    }
}

/// Forward-only view over a byte buffer.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Split off the next CRLF-terminated line, returning it with its start
    /// offset. The CRLF itself is consumed but not returned.
    fn next_line(&mut self) -> Result<(usize, &'a [u8]), ParseError> {
        let start = self.pos;
        let rest = &self.buf[start..];
        let end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or(ParseError::Incomplete { at: start })?;
        self.pos = start + end + 2;
        Ok((start, &rest[..end]))
    }

    fn remainder(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

/// RFC 9110 §5.6.2 `tchar`.
fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_tchar)
}

fn utf8(line: &[u8], at: usize) -> Result<&str, ParseError> {
    std::str::from_utf8(line).map_err(|e| ParseError::InvalidEncoding {
        at: at + e.valid_up_to(),
    })
}

/// Parse field-lines up to and including the blank line that ends the head.
fn parse_fields(cursor: &mut Cursor<'_>) -> Result<Headers, ParseError> {
    let mut headers = Headers::new();
    loop {
        let (at, line) = cursor.next_line()?;
        if line.is_empty() {
            return Ok(headers);
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(ParseError::MalformedHeaderLine { at });
        };
        // A bare CR or LF survives CRLF splitting; reject it.
        if line.iter().any(|&b| b == b'\r' || b == b'\n') {
            return Err(ParseError::InvalidHeaderLine { at });
        }
        let name = utf8(&line[..colon], at)?;
        let value = utf8(&line[colon + 1..], at + colon + 1)?;
        headers.append_raw(name, value);
    }
}

/// Parse a complete request buffer.
///
/// The body is everything after the blank line, taken verbatim, but only when
/// a `Content-Length` field is present; its value is not checked against the
/// number of bytes actually received.
pub fn parse_request(raw: &[u8]) -> Result<HttpRequest, ParseError> {
    let mut cursor = Cursor::new(raw);

    let (at, line) = cursor.next_line()?;
    let line = utf8(line, at)?;
    let [method, target, version] = line.split(' ').collect::<Vec<&str>>()[..] else {
        return Err(ParseError::MalformedRequestLine);
    };

    if !is_token(method) {
        return Err(ParseError::InvalidMethod);
    }
    let method: Method = method.parse().map_err(|_| ParseError::InvalidMethod)?;

    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidVersion);
    }
    if version != HTTP_VERSION {
        return Err(ParseError::UnsupportedVersion(version.to_string()));
    }

    let headers = parse_fields(&mut cursor)?;

    let body = if headers.contains("Content-Length") {
        Some(Bytes::copy_from_slice(cursor.remainder()))
    } else {
        None
    };

    Ok(HttpRequest {
        method,
        target: target.to_string(),
        version: version.to_string(),
        headers,
        body,
    })
}

/// Parse the status-line and fields at the front of a response buffer.
///
/// Anything after the blank line is ignored.
pub fn parse_response_head(raw: &[u8]) -> Result<ResponseHead, ParseError> {
    let mut cursor = Cursor::new(raw);

    let (at, line) = cursor.next_line()?;
    let line = utf8(line, at)?;
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    let reason = parts.next().unwrap_or_default();

    if !version.starts_with("HTTP/") {
        return Err(ParseError::MalformedStatusLine);
    }
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::MalformedStatusLine);
    }
    let status = code.parse().map_err(|_| ParseError::MalformedStatusLine)?;

    let headers = parse_fields(&mut cursor)?;

    Ok(ResponseHead {
        version: version.to_string(),
        status,
        reason: reason.to_string(),
        headers,
    })
}

/// Status code of a serialized response, reading only its status-line.
pub fn peek_status(raw: &[u8]) -> Option<u16> {
    let line = raw.split(|&b| b == b'\r').next()?;
    let code = line.split(|&b| b == b' ').nth(1)?;
    std::str::from_utf8(code).ok()?.parse().ok()
}

/// Offset just past the blank line ending the head, if it has arrived.
pub fn head_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}
