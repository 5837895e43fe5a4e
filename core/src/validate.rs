//! Pre-flight legality check for protocol requests.
//!
//! Rules are evaluated in a fixed order so the same bad request always
//! produces the same message. Pure: no I/O, no state.

use serde_json::Value;

use crate::error::CinpError;
use crate::types::Verb;
use crate::uri::UriParser;

/// Accept or reject `(verb, uri, body)` before anything touches the network.
pub fn check_request(
    parser: &UriParser,
    verb: Verb,
    uri: &str,
    body: Option<&Value>,
) -> Result<(), CinpError> {
    tracing::debug!(%verb, uri, "cinp: check request");

    if !verb.is_protocol() {
        return Err(invalid(format!("invalid verb (HTTP method) \"{verb}\"")));
    }

    if body.is_some_and(|b| !b.is_object()) {
        return Err(invalid("body must be a JSON object".to_string()));
    }

    // split() already drops an empty id list
    let address = parser.split(uri)?;
    let has_ids = address.ids.is_some();
    let has_action = address.action.is_some();
    let has_body = body.is_some();

    if has_action && !matches!(verb, Verb::Call | Verb::Describe) {
        return Err(invalid(format!(
            "invalid verb \"{verb}\" for request with action"
        )));
    }

    if verb == Verb::Call && !has_action {
        return Err(invalid(format!("verb \"{verb}\" requires action")));
    }

    if has_ids && !matches!(verb, Verb::Get | Verb::Update | Verb::Delete | Verb::Call) {
        return Err(invalid(format!("invalid verb \"{verb}\" for request with id")));
    }

    if matches!(verb, Verb::Get | Verb::Update | Verb::Delete) && !has_ids {
        return Err(invalid(format!("verb \"{verb}\" requires id")));
    }

    if has_body && !matches!(verb, Verb::List | Verb::Update | Verb::Create | Verb::Call) {
        return Err(invalid(format!(
            "invalid verb \"{verb}\" for request with data"
        )));
    }

    if matches!(verb, Verb::Update | Verb::Create) && !has_body {
        return Err(invalid(format!("verb \"{verb}\" requires data")));
    }

    if verb != Verb::Describe && address.model.as_deref().is_none_or(str::is_empty) {
        return Err(invalid(format!("verb \"{verb}\" requires model")));
    }

    Ok(())
}

fn invalid(message: String) -> CinpError {
    CinpError::InvalidRequest(message)
}
