//! Blocking `Transport` backed by ureq.
//!
//! One `ureq::Agent` per client keeps the connection pool; the per-call
//! timeout is applied to each request individually. Status codes are never
//! turned into errors here, the invoker owns that mapping. Redirects are not
//! followed: a 3xx comes back as-is.

use std::io;
use std::time::Duration;

use ureq::http;
use ureq::{Agent, AsSendBody, SendBody};

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::http::{HttpBody, HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .max_redirects(0);

        if let Some(proxy) = config.proxy() {
            let proxy = ureq::Proxy::new(proxy).map_err(|e| ConfigError::Proxy {
                proxy: proxy.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(Some(proxy));
        }

        if !config.verify_ssl {
            let tls = ureq::tls::TlsConfig::builder()
                .disable_verification(true)
                .build();
            builder = builder.tls_config(tls);
        }

        Ok(Self {
            agent: builder.build().new_agent(),
        })
    }

    fn run<S: AsSendBody>(
        &self,
        builder: http::request::Builder,
        body: S,
        timeout: Duration,
    ) -> Result<http::Response<ureq::Body>, TransportError> {
        let request = builder
            .body(body)
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        let request = self
            .agent
            .configure_request(request)
            .timeout_global(Some(timeout))
            .build();
        self.agent.run(request).map_err(map_error)
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = http::Request::builder().method(method).uri(url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = match body {
            HttpBody::Empty => self.run(builder, (), timeout)?,
            HttpBody::Bytes(bytes) => self.run(builder, bytes, timeout)?,
            HttpBody::Stream(mut reader) => {
                self.run(builder, SendBody::from_reader(&mut reader), timeout)?
            }
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Ok(HttpResponse {
            status,
            headers,
            body: Box::new(response.into_body().into_reader()),
        })
    }
}

fn map_error(err: ureq::Error) -> TransportError {
    let timed_out = match &err {
        ureq::Error::Timeout(_) => true,
        ureq::Error::Io(e) => e.kind() == io::ErrorKind::TimedOut,
        _ => false,
    };
    if timed_out {
        return TransportError::Timeout;
    }
    match &err {
        ureq::Error::StatusCode(_) | ureq::Error::Http(_) | ureq::Error::Protocol(_) => {
            TransportError::Protocol(err.to_string())
        }
        _ => TransportError::Connection(err.to_string()),
    }
}
