//! Client construction settings.
//!
//! `ClientConfig` is plain serde data so callers can embed it in their own
//! configuration files; `validate` enforces the host/root-path shape the
//! protocol relies on when it concatenates `host + uri`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Protocol version announced in the `CInP-Version` header.
pub const CINP_VERSION: &str = "0.9";

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-call timeout used when the caller does not pick one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Download read size.
pub const DEFAULT_CHUNK_SIZE: usize = 4096 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Scheme + authority, e.g. `https://api.example.com:8443`. No trailing `/`.
    pub host: String,
    /// API root, e.g. `/api/v1/`. Must start and end with `/`.
    pub root_path: String,
    /// Proxy used for both http and https. Empty means none.
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_verify_ssl() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("rust CInP client {CLIENT_VERSION}")
}

impl ClientConfig {
    pub fn new(host: &str, root_path: &str) -> Self {
        Self {
            host: host.to_string(),
            root_path: root_path.to_string(),
            proxy: None,
            verify_ssl: default_verify_ssl(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_proxy(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_string());
        self
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    /// The proxy to use, treating an empty string as none.
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref().filter(|p| !p.is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.host.starts_with("http:") || self.host.starts_with("https:")) {
            return Err(ConfigError::HostScheme(self.host.clone()));
        }
        if self.host.ends_with('/') {
            return Err(ConfigError::HostTrailingSlash(self.host.clone()));
        }
        if !self.root_path.starts_with('/') || !self.root_path.ends_with('/') {
            return Err(ConfigError::RootPath(self.root_path.clone()));
        }
        Ok(())
    }
}
