//! HTTP exchange described as plain data, plus the `Transport` seam.
//!
//! # Design
//! The client never opens sockets itself. It builds an `HttpRequest`, hands
//! it to a `Transport`, and interprets the `HttpResponse` that comes back.
//! `UreqTransport` is the production implementation; tests plug in a stub
//! that records requests and replays canned responses, keeping every status
//! and header path deterministic.
//!
//! Bodies are streams on both sides so file transfers never buffer whole
//! payloads; JSON requests use the `Bytes` variant.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use thiserror::Error;

/// Outgoing body.
pub enum HttpBody<'a> {
    Empty,
    Bytes(Vec<u8>),
    /// Opaque byte stream (uploads). Length is announced via `Content-Length`.
    Stream(Box<dyn Read + 'a>),
}

impl fmt::Debug for HttpBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpBody::Empty => f.write_str("Empty"),
            HttpBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            HttpBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// One physical request. `method` is the literal wire method, which for
/// protocol verbs is the verb name itself (`LIST`, `CALL`, ...).
#[derive(Debug)]
pub struct HttpRequest<'a> {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: HttpBody<'a>,
    pub timeout: Duration,
}

impl HttpRequest<'_> {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// One physical response with its body still unread.
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Failure below the HTTP status line.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect or read did not finish within the request timeout.
    #[error("timed out")]
    Timeout,

    /// DNS, connect, TLS or socket failure.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The peer spoke broken HTTP, or the request could not be framed.
    #[error("HTTP protocol error: {0}")]
    Protocol(String),
}

/// Executes one HTTP exchange. Blocking; no retries.
pub trait Transport {
    fn send(&self, request: HttpRequest<'_>) -> Result<HttpResponse, TransportError>;
}

fn find_header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
