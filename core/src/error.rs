//! Error types for the CInP client.
//!
//! # Design
//! Every protocol outcome other than success has its own `CinpError` variant,
//! so callers match on the kind instead of inspecting message text. The first
//! eight variants mirror the wire-level taxonomy (timeout, unusable response,
//! rejected request, 401/403/404, server fault). `Io` is reserved for the
//! local side of file transfers and never describes a network failure.
//!
//! `ConfigError` is separate: it is produced while assembling a client,
//! before any request can exist.

use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum number of characters of a raw response body carried in errors.
pub(crate) const SNIPPET_LEN: usize = 200;

/// Errors returned by every `CinpClient` operation.
#[derive(Debug, Error)]
pub enum CinpError {
    /// The transport did not complete within the per-call timeout.
    #[error("request timeout after {after:?}")]
    Timeout { after: Duration },

    /// Transport failure, unparsable success body, or an HTTP status the
    /// operation does not accept.
    #[error("response error: {0}")]
    ResponseError(String),

    /// Rejected locally before any I/O, or a 400 without a structured body.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A 400 whose JSON body carried a `message`. `data` holds every body
    /// field other than `class`, `error` and `message`.
    #[error("invalid request: {message}")]
    DetailedInvalidRequest {
        class: Option<String>,
        error: Option<String>,
        message: String,
        data: Map<String, Value>,
    },

    /// HTTP 401.
    #[error("invalid session")]
    InvalidSession,

    /// HTTP 403.
    #[error("not authorized")]
    NotAuthorized,

    /// HTTP 404.
    #[error("not found")]
    NotFound,

    /// HTTP 500; the message is assembled from the body's `message`/`trace`.
    #[error("{0}")]
    ServerError(String),

    /// Local filesystem failure while reading an upload source or writing a
    /// downloaded file.
    #[error("local I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl CinpError {
    /// True for both `InvalidRequest` and its detailed specialization.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            CinpError::InvalidRequest(_) | CinpError::DetailedInvalidRequest { .. }
        )
    }

    /// Build a `DetailedInvalidRequest` from a 400 body, pulling `class`,
    /// `error` and `message` out of it.
    pub(crate) fn detailed(mut body: Map<String, Value>) -> Self {
        let class = body.remove("class").map(value_text);
        let error = body.remove("error").map(value_text);
        let message = body.remove("message").map(value_text).unwrap_or_default();
        CinpError::DetailedInvalidRequest {
            class,
            error,
            message,
            data: body,
        }
    }
}

/// Errors raised while validating a `ClientConfig` or a `UriParser` root.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("host must start with http: or https:, got \"{0}\"")]
    HostScheme(String),

    #[error("host must not end with \"/\", got \"{0}\"")]
    HostTrailingSlash(String),

    #[error("root_path must start and end with \"/\", got \"{0}\"")]
    RootPath(String),

    #[error("invalid proxy \"{proxy}\": {reason}")]
    Proxy { proxy: String, reason: String },
}

/// Render a JSON value as plain text: strings lose their quotes, anything
/// else uses its JSON form.
pub(crate) fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// First `SNIPPET_LEN` characters of a raw body, cut on a char boundary.
pub(crate) fn snippet(raw: &str) -> String {
    raw.chars().take(SNIPPET_LEN).collect()
}
