//! Protocol vocabulary shared by every layer: verbs, interest headers, the
//! LIST cursor triple, and the JSON body helpers.
//!
//! # Design
//! Bodies stay schema-less (`serde_json::Value` / `Object`) because the
//! protocol is schema-less at this layer. Typed callers go through
//! `to_object`, which is also where date-time values become ISO-8601 strings:
//! `chrono` types serialize that way, so no custom encoder is needed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CinpError;

/// A JSON object body.
pub type Object = Map<String, Value>;

/// Operation selector. The first seven are protocol verbs, sent literally as
/// the HTTP method; `Upload` and `RawGet` are client-internal and travel as
/// plain `POST`/`GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Update,
    Create,
    Delete,
    Call,
    Describe,
    Upload,
    RawGet,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::List => "LIST",
            Verb::Update => "UPDATE",
            Verb::Create => "CREATE",
            Verb::Delete => "DELETE",
            Verb::Call => "CALL",
            Verb::Describe => "DESCRIBE",
            Verb::Upload => "UPLOAD",
            Verb::RawGet => "RAWGET",
        }
    }

    /// False for the two pseudo-verbs.
    pub fn is_protocol(self) -> bool {
        !matches!(self, Verb::Upload | Verb::RawGet)
    }

    /// The method string placed on the wire.
    pub fn http_method(self) -> &'static str {
        match self {
            Verb::Upload => "POST",
            Verb::RawGet => "GET",
            protocol => protocol.as_str(),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = CinpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Verb::Get,
            "LIST" => Verb::List,
            "UPDATE" => Verb::Update,
            "CREATE" => Verb::Create,
            "DELETE" => Verb::Delete,
            "CALL" => Verb::Call,
            "DESCRIBE" => Verb::Describe,
            "UPLOAD" => Verb::Upload,
            "RAWGET" => Verb::RawGet,
            other => {
                return Err(CinpError::InvalidRequest(format!(
                    "invalid verb (HTTP method) \"{other}\""
                )))
            }
        })
    }
}

/// Cursor state reported by a LIST response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountMap {
    pub position: u64,
    pub count: u64,
    pub total: u64,
}

/// The response headers the protocol cares about. Lookup is
/// case-insensitive; absent headers stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHeaders {
    pub position: Option<String>,
    pub count: Option<String>,
    pub total: Option<String>,
    pub object_type: Option<String>,
    pub multi_object: Option<String>,
    pub object_id: Option<String>,
    pub verb: Option<String>,
}

impl ResponseHeaders {
    pub fn from_pairs(headers: &[(String, String)]) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
        };
        Self {
            position: find("Position"),
            count: find("Count"),
            total: find("Total"),
            object_type: find("Type"),
            multi_object: find("Multi-Object"),
            object_id: find("Object-Id"),
            verb: find("Verb"),
        }
    }

    /// Missing or unparsable values count as 0.
    pub fn count_map(&self) -> CountMap {
        let number = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0)
        };
        CountMap {
            position: number(&self.position),
            count: number(&self.count),
            total: number(&self.total),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Encode any serializable value as a request body. Fails with
/// `InvalidRequest` when the value is not a JSON object or cannot be encoded.
pub fn to_object<T: Serialize + ?Sized>(value: &T) -> Result<Object, CinpError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(CinpError::InvalidRequest(
            "body must be a JSON object".to_string(),
        )),
        Err(e) => Err(CinpError::InvalidRequest(format!(
            "unable to encode body: {e}"
        ))),
    }
}

/// ISO-8601 form of a timestamp, for building bodies by hand.
pub fn timestamp<Tz: TimeZone>(ts: &DateTime<Tz>) -> Value
where
    Tz::Offset: fmt::Display,
{
    Value::String(ts.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn verb_round_trips_through_str() {
        for verb in [
            Verb::Get,
            Verb::List,
            Verb::Update,
            Verb::Create,
            Verb::Delete,
            Verb::Call,
            Verb::Describe,
            Verb::Upload,
            Verb::RawGet,
        ] {
            assert_eq!(verb.as_str().parse::<Verb>().unwrap(), verb);
        }
        assert!("ASDF".parse::<Verb>().unwrap_err().is_invalid_request());
        assert!("get".parse::<Verb>().is_err());
    }

    #[test]
    fn pseudo_verbs_map_to_plain_http() {
        assert_eq!(Verb::Upload.http_method(), "POST");
        assert_eq!(Verb::RawGet.http_method(), "GET");
        assert_eq!(Verb::List.http_method(), "LIST");
        assert!(!Verb::Upload.is_protocol());
        assert!(Verb::Describe.is_protocol());
    }

    #[test]
    fn headers_match_case_insensitively() {
        let headers = ResponseHeaders::from_pairs(&[
            ("position".to_string(), "10".to_string()),
            ("COUNT".to_string(), "5".to_string()),
            ("Total".to_string(), "25".to_string()),
            ("object-id".to_string(), "/api/v1/model:1:".to_string()),
            ("X-Other".to_string(), "ignored".to_string()),
        ]);
        assert_eq!(
            headers.count_map(),
            CountMap {
                position: 10,
                count: 5,
                total: 25
            }
        );
        assert_eq!(headers.object_id.as_deref(), Some("/api/v1/model:1:"));
        assert!(headers.object_type.is_none());
    }

    #[test]
    fn count_map_defaults_bad_values_to_zero() {
        let headers = ResponseHeaders::from_pairs(&[
            ("Position".to_string(), "a".to_string()),
            ("Count".to_string(), "-1".to_string()),
        ]);
        assert_eq!(headers.count_map(), CountMap::default());
        assert!(ResponseHeaders::from_pairs(&[]).is_empty());
    }

    #[derive(Serialize)]
    struct Stamped {
        name: String,
        at: DateTime<Utc>,
    }

    #[test]
    fn to_object_encodes_timestamps_as_iso8601() {
        let at = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let body = to_object(&Stamped {
            name: "x".to_string(),
            at,
        })
        .unwrap();
        let encoded = body["at"].as_str().unwrap();
        assert!(encoded.starts_with("2021-03-04T05:06:07"), "{encoded}");
        assert_eq!(timestamp(&at), json!("2021-03-04T05:06:07+00:00"));
    }

    #[test]
    fn to_object_rejects_non_objects() {
        assert!(to_object(&json!([1, 2])).unwrap_err().is_invalid_request());
        assert!(to_object(&"text").unwrap_err().is_invalid_request());
        assert!(to_object(&json!({})).unwrap().is_empty());
    }
}
