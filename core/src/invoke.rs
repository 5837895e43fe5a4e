//! Turns one validated request into one physical exchange and maps the
//! outcome onto a `Reply` or a typed `CinpError`.
//!
//! # Design
//! Status handling is split in two: `translate_error` is a pure function of
//! (status, parsed body, raw body) so the full status table can be tested
//! without I/O, while `Invoker` owns framing, headers, body reading and the
//! order in which those checks run (401/403/404 never read the body, an
//! unparsable body only matters for statuses that expect JSON).

use std::io::{self, Read};
use std::time::Duration;

use serde_json::Value;

use crate::config::CINP_VERSION;
use crate::error::{snippet, value_text, CinpError};
use crate::http::{HttpBody, HttpRequest, HttpResponse, Transport, TransportError};
use crate::types::{ResponseHeaders, Verb};

/// Statuses a CInP server may legitimately answer with.
pub const HANDLED_STATUSES: [u16; 8] = [200, 201, 202, 400, 401, 403, 404, 500];

const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";
const STREAM_CONTENT_TYPE: &str = "application/octet-stream";

/// A successful protocol exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    /// `None` for an empty response body.
    pub body: Option<Value>,
    pub headers: ResponseHeaders,
}

/// Map a non-success status onto its error kind. Returns `None` for 200,
/// 201 and 202. `raw` is the trimmed response text, used when the body is
/// not a JSON object.
pub fn translate_error(status: u16, body: Option<&Value>, raw: &str) -> Option<CinpError> {
    match status {
        200 | 201 | 202 => None,
        400 => Some(match body {
            Some(Value::Object(map)) if map.contains_key("message") => {
                CinpError::detailed(map.clone())
            }
            _ => CinpError::InvalidRequest(snippet(raw)),
        }),
        500 => Some(CinpError::ServerError(server_message(body, raw))),
        other => Some(bodiless_error(other)),
    }
}

/// Errors decided by the status alone: 401, 403, 404 and anything unhandled.
fn bodiless_error(status: u16) -> CinpError {
    match status {
        401 => CinpError::InvalidSession,
        403 => CinpError::NotAuthorized,
        404 => CinpError::NotFound,
        other => CinpError::ResponseError(format!("HTTP code \"{other}\" unhandled")),
    }
}

fn server_message(body: Option<&Value>, raw: &str) -> String {
    let Some(Value::Object(map)) = body else {
        return format!("Server Error: \"{}\"", snippet(raw));
    };
    match (map.get("message"), map.get("trace")) {
        (Some(message), Some(trace)) => format!(
            "Server Error \"{}\"\n{}",
            value_text(message.clone()),
            value_text(trace.clone())
        ),
        (Some(message), None) => format!("Server Error \"{}\"", value_text(message.clone())),
        _ => Value::Object(map.clone()).to_string(),
    }
}

/// Map an error raised while reading a response body.
pub(crate) fn read_error(err: io::Error, timeout: Duration) -> CinpError {
    if err.kind() == io::ErrorKind::TimedOut {
        CinpError::Timeout { after: timeout }
    } else {
        CinpError::ResponseError(format!("unable to read response: {err}"))
    }
}

/// Frames requests for one host and interprets what comes back.
#[derive(Debug)]
pub struct Invoker<T> {
    transport: T,
    host: String,
    base_headers: Vec<(String, String)>,
}

impl<T: Transport> Invoker<T> {
    pub fn new(transport: T, host: &str, user_agent: &str) -> Self {
        let base_headers = [
            ("User-Agent", user_agent),
            ("Accepts", "application/json"),
            ("Accept-Charset", "utf-8"),
            ("CInP-Version", CINP_VERSION),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            transport,
            host: host.to_string(),
            base_headers,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a protocol verb with an optional JSON body. The caller is
    /// expected to have run `check_request` first.
    pub fn execute(
        &self,
        verb: Verb,
        uri: &str,
        body: Option<&Value>,
        headers: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<Reply, CinpError> {
        tracing::debug!(%verb, uri, "cinp: making request");
        let payload = match body {
            None => HttpBody::Empty,
            Some(value) => HttpBody::Bytes(serde_json::to_vec(value).map_err(|e| {
                CinpError::InvalidRequest(format!("unable to encode body: {e}"))
            })?),
        };
        let response = self.dispatch(
            verb,
            uri,
            payload,
            headers,
            Some(JSON_CONTENT_TYPE),
            timeout,
        )?;
        self.interpret(response, timeout)
    }

    /// UPLOAD pseudo-verb: POST an opaque byte stream.
    pub fn upload(
        &self,
        uri: &str,
        source: Box<dyn Read + '_>,
        headers: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<Reply, CinpError> {
        tracing::debug!(uri, "cinp: making upload request");
        let response = self.dispatch(
            Verb::Upload,
            uri,
            HttpBody::Stream(source),
            headers,
            Some(STREAM_CONTENT_TYPE),
            timeout,
        )?;
        self.interpret(response, timeout)
    }

    /// RAWGET pseudo-verb: plain GET whose body is handed back unread.
    pub fn raw_get(
        &self,
        uri: &str,
        headers: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<HttpResponse, CinpError> {
        tracing::debug!(uri, "cinp: making raw get request");
        let response = self.dispatch(Verb::RawGet, uri, HttpBody::Empty, headers, None, timeout)?;
        match response.status {
            200 => Ok(response),
            401 | 403 | 404 => Err(log_error(bodiless_error(response.status))),
            other => {
                tracing::warn!(status = other, "cinp: unexpected HTTP code for file get");
                Err(CinpError::ResponseError(format!(
                    "unexpected HTTP code \"{other}\" for file get"
                )))
            }
        }
    }

    fn dispatch(
        &self,
        verb: Verb,
        uri: &str,
        body: HttpBody<'_>,
        headers: Vec<(String, String)>,
        content_type: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpResponse, CinpError> {
        let url = format!("{}{uri}", self.host);
        let mut all_headers = self.base_headers.clone();
        all_headers.extend(headers);
        if let Some(content_type) = content_type {
            all_headers.push(("Content-Type".to_string(), content_type.to_string()));
        }

        let request = HttpRequest {
            method: verb.http_method(),
            url,
            headers: all_headers,
            body,
            timeout,
        };

        self.transport.send(request).map_err(|e| match e {
            TransportError::Timeout => {
                tracing::warn!(?timeout, uri, "cinp: request timeout");
                CinpError::Timeout { after: timeout }
            }
            other => {
                tracing::warn!(error = %other, uri, "cinp: transport failure");
                CinpError::ResponseError(format!("{other} for \"{}{uri}\"", self.host))
            }
        })
    }

    fn interpret(&self, mut response: HttpResponse, timeout: Duration) -> Result<Reply, CinpError> {
        let status = response.status;
        tracing::debug!(status, "cinp: got HTTP code");

        if !HANDLED_STATUSES.contains(&status) || matches!(status, 401 | 403 | 404) {
            return Err(log_error(bodiless_error(status)));
        }

        let mut raw = Vec::new();
        response
            .body
            .read_to_end(&mut raw)
            .map_err(|e| read_error(e, timeout))?;
        let raw = String::from_utf8_lossy(&raw);
        let raw = raw.trim();

        let body = if raw.is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(value) => Some(value),
                Err(_) if matches!(status, 400 | 500) => None,
                Err(_) => {
                    tracing::warn!(body = %snippet(raw), "cinp: unable to parse response");
                    return Err(CinpError::ResponseError(format!(
                        "unable to parse response \"{}\"",
                        snippet(raw)
                    )));
                }
            }
        };

        if let Some(err) = translate_error(status, body.as_ref(), raw) {
            return Err(log_error(err));
        }

        Ok(Reply {
            status,
            body,
            headers: ResponseHeaders::from_pairs(&response.headers),
        })
    }
}

fn log_error(err: CinpError) -> CinpError {
    match &err {
        CinpError::ServerError(message) => tracing::error!("cinp: {message}"),
        CinpError::ResponseError(message) => tracing::warn!("cinp: {message}"),
        other => tracing::warn!("cinp: {other}"),
    }
    err
}
