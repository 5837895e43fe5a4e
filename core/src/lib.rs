//! Blocking client for CInP, a JSON-over-HTTP RPC protocol.
//!
//! # Overview
//! CInP addresses objects with URIs such as `/api/v1/ns/model:42:(action)`
//! and carries its verbs (`GET`, `LIST`, `UPDATE`, `CREATE`, `DELETE`,
//! `CALL`, `DESCRIBE`) as literal HTTP methods. `CinpClient` validates each
//! request locally, performs exactly one exchange, and maps every status the
//! protocol allows onto a typed `CinpError`.
//!
//! # Design
//! - The HTTP exchange is plain data (`HttpRequest` / `HttpResponse`) handed
//!   to a `Transport`. `UreqTransport` is the default; tests swap in stubs.
//! - Bodies are schema-less `serde_json` values; `to_object` encodes typed
//!   values (timestamps become ISO-8601 strings).
//! - Multi-request traversals (`get_multi`, `get_filtered_uris`, ...) are
//!   lazy iterators borrowing the client.
//! - File transfer stays streaming in both directions.
//!
//! ```no_run
//! use cinp_core::{CinpClient, ClientConfig, DEFAULT_TIMEOUT};
//!
//! let mut client = CinpClient::new(ClientConfig::new("http://localhost:8080", "/api/v1/"))?;
//! client.set_auth(Some("root"), Some("secret"));
//! let values = client.get("/api/v1/Auth/User:root:", false, DEFAULT_TIMEOUT)?;
//! println!("{values:?}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod invoke;
pub mod paginate;
pub mod stream;
pub mod transport;
pub mod types;
pub mod uri;
pub mod validate;

pub use client::CinpClient;
pub use config::{ClientConfig, CINP_VERSION, DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT};
pub use error::{CinpError, ConfigError};
pub use http::{HttpBody, HttpRequest, HttpResponse, Transport, TransportError};
pub use invoke::{translate_error, Reply};
pub use paginate::{FilteredObjects, FilteredUris, GetMulti, PageOptions};
pub use stream::{ProgressReader, TransferOptions, UploadSource};
pub use transport::UreqTransport;
pub use types::{timestamp, to_object, CountMap, Object, ResponseHeaders, Verb};
pub use uri::{Address, UriParser};
pub use validate::check_request;
