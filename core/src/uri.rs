//! CInP URI grammar: parse a URI into an `Address` and build one back.
//!
//! # Design
//! A CInP URI is `<root><namespace>/<model>:<id>:<id>:(<action>)`, every part
//! after the root optional. The grammar is a single anchored regex compiled
//! once per root path; `split`, `build` and `extract_ids` are its only users.
//! Parse failures surface as `CinpError::InvalidRequest` because every caller
//! treats an unparsable address as a request the client refuses to send.

use regex::{Captures, Regex};

use crate::error::{CinpError, ConfigError};

const SEGMENT: &str = r"[a-zA-Z0-9\-_.!~*]+";
const ID_CHARS: &str = r"[a-zA-Z0-9\-_.!~*']*";

/// The parsed form of a CInP URI. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    pub namespace: Vec<String>,
    pub model: Option<String>,
    pub action: Option<String>,
    /// Absent, or a non-empty list of opaque ids.
    pub ids: Option<Vec<String>>,
}

impl Address {
    /// More than one id addressed at once.
    pub fn is_multi(&self) -> bool {
        self.ids.as_ref().is_some_and(|ids| ids.len() > 1)
    }
}

/// Parser/builder bound to one API root path such as `/api/v1/`.
#[derive(Debug, Clone)]
pub struct UriParser {
    root_path: String,
    pattern: Regex,
}

impl UriParser {
    pub fn new(root_path: &str) -> Result<Self, ConfigError> {
        if !root_path.starts_with('/') || !root_path.ends_with('/') {
            return Err(ConfigError::RootPath(root_path.to_string()));
        }
        let source = format!(
            r"^({root}|/)((?:{SEGMENT}/)*)({SEGMENT})?(:(?:{ID_CHARS}:)*)?(\({SEGMENT}\))?$",
            root = regex::escape(root_path),
        );
        let pattern =
            Regex::new(&source).map_err(|_| ConfigError::RootPath(root_path.to_string()))?;
        Ok(Self {
            root_path: root_path.to_string(),
            pattern,
        })
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    fn captures<'u>(&self, uri: &'u str) -> Result<Captures<'u>, CinpError> {
        self.pattern
            .captures(uri)
            .ok_or_else(|| CinpError::InvalidRequest(format!("unable to parse URI \"{uri}\"")))
    }

    /// Parse `uri`, which must live under this parser's root path.
    pub fn split(&self, uri: &str) -> Result<Address, CinpError> {
        let caps = self.captures(uri)?;

        let root = caps.get(1).map_or("", |m| m.as_str());
        if root != self.root_path {
            return Err(CinpError::InvalidRequest(format!(
                "URI \"{uri}\" does not start in the root path \"{}\"",
                self.root_path
            )));
        }

        let namespace = caps
            .get(2)
            .map(|m| m.as_str().trim_end_matches('/'))
            .filter(|ns| !ns.is_empty())
            .map(|ns| ns.split('/').map(str::to_string).collect())
            .unwrap_or_default();

        let model = caps.get(3).map(|m| m.as_str().to_string());
        let ids = caps.get(4).and_then(|m| ids_from(m.as_str()));
        let action = caps
            .get(5)
            .map(|m| m.as_str().trim_start_matches('(').trim_end_matches(')').to_string());

        Ok(Address {
            namespace,
            model,
            action,
            ids,
        })
    }

    /// Inverse of `split`. Without a model only the namespace path is
    /// produced; an empty id list is omitted.
    pub fn build(
        &self,
        namespace: &[String],
        model: Option<&str>,
        action: Option<&str>,
        ids: Option<&[String]>,
    ) -> String {
        let mut uri = self.root_path.clone();
        if !namespace.is_empty() {
            uri.push_str(&namespace.join("/"));
            uri.push('/');
        }
        let Some(model) = model else {
            return uri;
        };
        uri.push_str(model);
        if let Some(ids) = ids.filter(|ids| !ids.is_empty()) {
            uri.push(':');
            uri.push_str(&ids.join(":"));
            uri.push(':');
        }
        if let Some(action) = action {
            uri.push('(');
            uri.push_str(action);
            uri.push(')');
        }
        uri
    }

    /// Concatenate the ids carried by every URI in `uris`, in order. URIs
    /// without ids contribute nothing; the root path is not enforced.
    pub fn extract_ids<S: AsRef<str>>(&self, uris: &[S]) -> Result<Vec<String>, CinpError> {
        let mut result = Vec::new();
        for uri in uris {
            let caps = self.captures(uri.as_ref())?;
            if let Some(ids) = caps.get(4).and_then(|m| ids_from(m.as_str())) {
                result.extend(ids);
            }
        }
        Ok(result)
    }
}

/// `:a:b:` → `["a", "b"]`; a bare `:` carries no ids.
fn ids_from(raw: &str) -> Option<Vec<String>> {
    let inner = raw.trim_matches(':');
    if inner.is_empty() {
        return None;
    }
    Some(inner.split(':').map(str::to_string).collect())
}
