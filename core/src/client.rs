//! The operation facade: one method per protocol verb.
//!
//! # Design
//! `CinpClient` owns the configuration, a `UriParser` bound to the root
//! path, the `Invoker`, and the only mutable state, the auth credential.
//! Each operation validates locally, sends exactly one request, then checks
//! the status and body shape it expects. Nothing is retried.
//!
//! The transport is a type parameter defaulting to `UreqTransport`; unit
//! tests substitute a recording stub.

use std::time::Duration;

use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{CinpError, ConfigError};
use crate::http::Transport;
use crate::invoke::{Invoker, Reply};
use crate::transport::UreqTransport;
use crate::types::{CountMap, Object, Verb};
use crate::uri::UriParser;
use crate::validate::check_request;

/// Blocking CInP client. See the crate docs for an example.
#[derive(Debug)]
pub struct CinpClient<T = UreqTransport> {
    config: ClientConfig,
    parser: UriParser,
    invoker: Invoker<T>,
    auth: Option<(String, String)>,
}

impl CinpClient<UreqTransport> {
    /// Validate `config` and build a client backed by ureq.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = UreqTransport::new(&config)?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> CinpClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let parser = UriParser::new(&config.root_path)?;
        let invoker = Invoker::new(transport, &config.host, &config.user_agent);
        Ok(Self {
            config,
            parser,
            invoker,
            auth: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn parser(&self) -> &UriParser {
        &self.parser
    }

    pub fn transport(&self) -> &T {
        self.invoker.transport()
    }

    pub(crate) fn invoker(&self) -> &Invoker<T> {
        &self.invoker
    }

    /// Install or clear the `Auth-Id`/`Auth-Token` pair. A missing or empty
    /// id clears it. No I/O.
    pub fn set_auth(&mut self, id: Option<&str>, token: Option<&str>) {
        match id.filter(|id| !id.is_empty()) {
            Some(id) => {
                tracing::debug!(auth_id = id, "cinp: setting auth");
                self.auth = Some((id.to_string(), token.unwrap_or_default().to_string()));
            }
            None => {
                tracing::debug!("cinp: clearing auth");
                self.auth = None;
            }
        }
    }

    /// Auth headers to attach to every request, in wire order.
    pub(crate) fn auth_headers(&self) -> Vec<(String, String)> {
        match &self.auth {
            Some((id, token)) => vec![
                ("Auth-Id".to_string(), id.clone()),
                ("Auth-Token".to_string(), token.clone()),
            ],
            None => Vec::new(),
        }
    }

    fn request(
        &self,
        verb: Verb,
        uri: &str,
        body: Option<&Value>,
        extra: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<Reply, CinpError> {
        check_request(&self.parser, verb, uri, body)?;
        let mut headers = self.auth_headers();
        headers.extend(extra);
        self.invoker.execute(verb, uri, body, headers, timeout)
    }

    /// DESCRIBE: the server's description of a namespace, model or action.
    pub fn describe(&self, uri: &str, timeout: Duration) -> Result<Option<Value>, CinpError> {
        tracing::debug!(uri, "cinp: DESCRIBE");
        let reply = self.request(Verb::Describe, uri, None, Vec::new(), timeout)?;
        expect_status(&reply, 200, Verb::Describe)?;
        Ok(reply.body)
    }

    /// LIST one page. Returns the listed entries as sent (normally object
    /// URIs) and the cursor reported by the server.
    pub fn list(
        &self,
        uri: &str,
        filter_name: Option<&str>,
        filter: Option<&Object>,
        position: u64,
        count: u64,
        timeout: Duration,
    ) -> Result<(Vec<Value>, CountMap), CinpError> {
        let mut headers = vec![
            ("Position".to_string(), position.to_string()),
            ("Count".to_string(), count.to_string()),
        ];
        if let Some(name) = filter_name {
            headers.push(("Filter".to_string(), name.to_string()));
        }
        let body = Value::Object(filter.cloned().unwrap_or_default());

        tracing::debug!(uri, filter = ?filter_name, "cinp: LIST");
        let reply = self.request(Verb::List, uri, Some(&body), headers, timeout)?;
        expect_status(&reply, 200, Verb::List)?;

        let Some(Value::Array(entries)) = reply.body else {
            return Err(shape_error("id_list must be a list", Verb::List));
        };
        Ok((entries, reply.headers.count_map()))
    }

    /// GET one object, or with `force_multi` a mapping keyed by object URI.
    pub fn get(&self, uri: &str, force_multi: bool, timeout: Duration) -> Result<Object, CinpError> {
        tracing::debug!(uri, "cinp: GET");
        let reply = self.request(Verb::Get, uri, None, multi_header(force_multi), timeout)?;
        expect_status(&reply, 200, Verb::Get)?;
        expect_object(reply.body, Verb::Get)
    }

    /// CREATE. Returns the new object's id (the `Object-Id` header) and the
    /// values the server recorded.
    pub fn create(
        &self,
        uri: &str,
        values: &Object,
        timeout: Duration,
    ) -> Result<(String, Object), CinpError> {
        tracing::debug!(uri, "cinp: CREATE");
        let body = Value::Object(values.clone());
        let reply = self.request(Verb::Create, uri, Some(&body), Vec::new(), timeout)?;
        expect_status(&reply, 201, Verb::Create)?;
        let object_id = reply.headers.object_id.clone();
        let values = expect_object(reply.body, Verb::Create)?;
        let object_id = object_id
            .ok_or_else(|| CinpError::ResponseError("Object-Id header missing".to_string()))?;
        Ok((object_id, values))
    }

    pub fn update(
        &self,
        uri: &str,
        values: &Object,
        force_multi: bool,
        timeout: Duration,
    ) -> Result<Object, CinpError> {
        tracing::debug!(uri, "cinp: UPDATE");
        let body = Value::Object(values.clone());
        let reply = self.request(
            Verb::Update,
            uri,
            Some(&body),
            multi_header(force_multi),
            timeout,
        )?;
        expect_status(&reply, 200, Verb::Update)?;
        expect_object(reply.body, Verb::Update)
    }

    pub fn delete(&self, uri: &str, timeout: Duration) -> Result<bool, CinpError> {
        tracing::debug!(uri, "cinp: DELETE");
        let reply = self.request(Verb::Delete, uri, None, Vec::new(), timeout)?;
        expect_status(&reply, 200, Verb::Delete)?;
        Ok(true)
    }

    /// CALL an action. The return value is whatever JSON the server sent,
    /// `None` for an empty body.
    pub fn call(
        &self,
        uri: &str,
        args: &Object,
        force_multi: bool,
        timeout: Duration,
    ) -> Result<Option<Value>, CinpError> {
        tracing::debug!(uri, "cinp: CALL");
        let body = Value::Object(args.clone());
        let reply = self.request(
            Verb::Call,
            uri,
            Some(&body),
            multi_header(force_multi),
            timeout,
        )?;
        expect_status(&reply, 200, Verb::Call)?;
        Ok(reply.body)
    }
}

fn multi_header(force_multi: bool) -> Vec<(String, String)> {
    if force_multi {
        vec![("Multi-Object".to_string(), "True".to_string())]
    } else {
        Vec::new()
    }
}

pub(crate) fn unexpected_status(status: u16, what: &str) -> CinpError {
    tracing::warn!("cinp: Unexpected HTTP Code \"{status}\" for {what}");
    CinpError::ResponseError(format!("Unexpected HTTP Code \"{status}\" for {what}"))
}

fn expect_status(reply: &Reply, expected: u16, verb: Verb) -> Result<(), CinpError> {
    if reply.status == expected {
        Ok(())
    } else {
        Err(unexpected_status(reply.status, verb.as_str()))
    }
}

fn expect_object(body: Option<Value>, verb: Verb) -> Result<Object, CinpError> {
    match body {
        Some(Value::Object(object)) => Ok(object),
        _ => Err(shape_error("rec_values must be a dict", verb)),
    }
}

fn shape_error(what: &str, verb: Verb) -> CinpError {
    tracing::warn!("cinp: Response {what} for {verb}");
    CinpError::ResponseError(format!("Response {what} for {verb}"))
}
