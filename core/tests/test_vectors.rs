//! Verify request validation and status handling against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Responses are served by a one-shot in-memory transport, so every status
//! path runs through the real invoker and client without a network.

use std::cell::RefCell;
use std::io::Cursor;
use std::time::Duration;

use cinp_core::invoke::Invoker;
use cinp_core::{
    check_request, CinpClient, CinpError, ClientConfig, HttpRequest, HttpResponse, Object,
    Transport, TransportError, UriParser, Verb,
};
use serde_json::Value;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serves one canned response.
struct OneShot(RefCell<Option<(u16, String)>>);

impl OneShot {
    fn new(status: u16, body: &str) -> Self {
        Self(RefCell::new(Some((status, body.to_string()))))
    }
}

impl Transport for OneShot {
    fn send(&self, _request: HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let (status, body) = self.0.borrow_mut().take().expect("one request only");
        Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: Box::new(Cursor::new(body.into_bytes())),
        })
    }
}

fn kind(result: &Result<impl Sized, CinpError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(CinpError::Timeout { .. }) => "Timeout",
        Err(CinpError::ResponseError(_)) => "ResponseError",
        Err(CinpError::InvalidRequest(_)) => "InvalidRequest",
        Err(CinpError::DetailedInvalidRequest { .. }) => "DetailedInvalidRequest",
        Err(CinpError::InvalidSession) => "InvalidSession",
        Err(CinpError::NotAuthorized) => "NotAuthorized",
        Err(CinpError::NotFound) => "NotFound",
        Err(CinpError::ServerError(_)) => "ServerError",
        Err(CinpError::Io(_)) => "Io",
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn validate_test_vectors() {
    let raw = include_str!("../../test-vectors/validate.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let parser = UriParser::new(vectors["root_path"].as_str().unwrap()).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let verb: Verb = case["verb"].as_str().unwrap().parse().unwrap();
        let uri = case["uri"].as_str().unwrap();
        let body = match &case["body"] {
            Value::Null => None,
            other => Some(other),
        };

        let result = check_request(&parser, verb, uri, body);
        if case["ok"].as_bool().unwrap() {
            assert!(result.is_ok(), "{name}: {result:?}");
            continue;
        }

        match result {
            Err(CinpError::InvalidRequest(message)) => {
                if let Some(expected) = case["message"].as_str() {
                    assert_eq!(message, expected, "{name}: message");
                }
            }
            other => panic!("{name}: expected InvalidRequest, got {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status handling
// ---------------------------------------------------------------------------

#[test]
fn status_test_vectors() {
    let raw = include_str!("../../test-vectors/status.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let status = case["status"].as_u64().unwrap() as u16;
        let body = case["body"].as_str().unwrap();
        let expected_kind = case["kind"].as_str().unwrap();
        let expected_call_kind = case["call_kind"].as_str().unwrap_or(expected_kind);

        // Invoker alone: the protocol-wide status table.
        let invoker = Invoker::new(OneShot::new(status, body), "http://localhost", "vectors");
        let result = invoker.execute(
            Verb::Call,
            "/api/v1/ns/model(act)",
            Some(&Value::Object(Object::new())),
            Vec::new(),
            TIMEOUT,
        );
        assert_eq!(kind(&result), expected_kind, "{name}: invoker kind");
        if let (Some(expected), Err(err)) = (case["message"].as_str(), &result) {
            assert_eq!(err.to_string(), expected, "{name}: message");
        }

        // Through the client, which additionally requires 200 for CALL.
        let client = CinpClient::with_transport(
            ClientConfig::new("http://localhost", "/api/v1/"),
            OneShot::new(status, body),
        )
        .unwrap();
        let result = client.call("/api/v1/ns/model(act)", &Object::new(), false, TIMEOUT);
        assert_eq!(kind(&result), expected_call_kind, "{name}: call kind");
    }
}
