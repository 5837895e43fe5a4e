//! File download (RAWGET) and upload (UPLOAD) helpers.
//!
//! These bypass request validation and JSON handling. Addresses are parsed
//! against the bare `/` root, so file URIs need not live under the API root.
//! Bytes are streamed in both directions; nothing buffers a whole file.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use crate::client::{unexpected_status, CinpClient};
use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT};
use crate::error::CinpError;
use crate::http::{HttpResponse, Transport};
use crate::invoke::read_error;
use crate::uri::UriParser;

/// `(bytes_so_far, total_size)`; `total_size` is 0 when unknown.
pub type Progress<'p> = &'p mut dyn FnMut(u64, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub timeout: Duration,
    /// Download read size in bytes.
    pub chunk_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Where upload bytes come from.
pub enum UploadSource<'r> {
    /// A file on disk; its base name is the default upload name.
    Path(PathBuf),
    /// An already open file. Size comes from its metadata.
    File { file: File, name: Option<String> },
    /// Any reader of known length.
    Reader {
        reader: Box<dyn Read + 'r>,
        name: Option<String>,
        len: u64,
    },
}

impl std::fmt::Debug for UploadSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            UploadSource::File { name, .. } => f.debug_struct("File").field("name", name).finish(),
            UploadSource::Reader { name, len, .. } => f
                .debug_struct("Reader")
                .field("name", name)
                .field("len", len)
                .finish(),
        }
    }
}

/// Reader that knows its total length and reports cumulative progress
/// after every read.
pub struct ProgressReader<'p, R> {
    inner: R,
    total: u64,
    read: u64,
    progress: Option<Progress<'p>>,
}

impl<'p, R: Read> ProgressReader<'p, R> {
    pub fn new(inner: R, total: u64, progress: Option<Progress<'p>>) -> Self {
        Self {
            inner,
            total,
            read: 0,
            progress,
        }
    }

    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if let Some(progress) = self.progress.as_mut() {
            progress(self.read, self.total);
        }
        Ok(n)
    }
}

fn file_parser() -> Result<UriParser, CinpError> {
    UriParser::new("/").map_err(|e| CinpError::InvalidRequest(e.to_string()))
}

fn check_chunk_size(options: &TransferOptions) -> Result<(), CinpError> {
    if options.chunk_size == 0 {
        return Err(CinpError::InvalidRequest(
            "chunk size must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Copy `response` into `writer` in `chunk_size` reads. Returns bytes written.
fn copy_body(
    mut response: HttpResponse,
    writer: &mut dyn Write,
    mut progress: Option<Progress<'_>>,
    options: &TransferOptions,
) -> Result<u64, CinpError> {
    let total = response
        .header("Content-Length")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let mut buf = vec![0u8; options.chunk_size];
    let mut written = 0u64;
    loop {
        let n = match response.body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e, options.timeout)),
        };
        writer.write_all(&buf[..n])?;
        written += n as u64;
        if let Some(progress) = progress.as_mut() {
            progress(written, total);
        }
    }
    writer.flush()?;
    tracing::debug!(bytes = written, "cinp: file download complete");
    Ok(written)
}

impl<T: Transport> CinpClient<T> {
    /// RAWGET `uri`; the model segment of the address is the file name.
    fn fetch_file(
        &self,
        uri: &str,
        options: &TransferOptions,
    ) -> Result<(Option<String>, HttpResponse), CinpError> {
        check_chunk_size(options)?;
        let filename = file_parser()?.split(uri)?.model;
        if let Some(name) = &filename {
            if name.chars().all(|c| c == '.') {
                return Err(CinpError::InvalidRequest(format!(
                    "refusing to use \"{name}\" as a file name"
                )));
            }
        }
        let response = self
            .invoker()
            .raw_get(uri, self.auth_headers(), options.timeout)?;
        Ok((filename, response))
    }

    /// Download into a new file under `target_dir` and return its path. The
    /// server's file name is used when present, otherwise a random one.
    /// A failed transfer leaves the partial file in place.
    pub fn get_file_to_dir(
        &self,
        uri: &str,
        target_dir: &Path,
        progress: Option<Progress<'_>>,
        options: TransferOptions,
    ) -> Result<PathBuf, CinpError> {
        let (filename, response) = self.fetch_file(uri, &options)?;
        let filename = filename.unwrap_or_else(|| format!("cinp-{}", Uuid::new_v4()));
        let path = target_dir.join(filename);
        tracing::debug!(uri, path = %path.display(), "cinp: downloading file");

        let mut file = File::create(&path)?;
        copy_body(response, &mut file, progress, &options)?;
        Ok(path)
    }

    /// Download into a caller-owned writer. Returns the server's file name,
    /// if any. The writer is flushed but not closed.
    pub fn get_file_to_writer(
        &self,
        uri: &str,
        writer: &mut dyn Write,
        progress: Option<Progress<'_>>,
        options: TransferOptions,
    ) -> Result<Option<String>, CinpError> {
        let (filename, response) = self.fetch_file(uri, &options)?;
        tracing::debug!(uri, "cinp: downloading file to writer");
        copy_body(response, writer, progress, &options)?;
        Ok(filename)
    }

    /// Upload `source` to `uri` and return the URI the server assigned.
    /// `filename` overrides the name derived from the source.
    pub fn upload_file(
        &self,
        uri: &str,
        source: UploadSource<'_>,
        filename: Option<&str>,
        progress: Option<Progress<'_>>,
        timeout: Duration,
    ) -> Result<String, CinpError> {
        let parser = file_parser()?;
        let address = parser.split(uri)?;
        if address.action.is_some() || address.ids.is_some() {
            return Err(CinpError::InvalidRequest(
                "file upload target can't be an action nor have ids".to_string(),
            ));
        }

        let (reader, derived_name, len): (Box<dyn Read + '_>, Option<String>, u64) = match source {
            UploadSource::Path(path) => {
                let file = File::open(&path)?;
                let len = file.metadata()?.len();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned());
                (Box::new(file) as Box<dyn Read>, name, len)
            }
            UploadSource::File { file, name } => {
                let len = file.metadata()?.len();
                (Box::new(file) as Box<dyn Read>, name, len)
            }
            UploadSource::Reader { reader, name, len } => (reader, name, len),
        };

        let Some(name) = filename.map(str::to_string).or(derived_name) else {
            return Err(CinpError::InvalidRequest(
                "upload needs a file name".to_string(),
            ));
        };

        let reader = ProgressReader::new(reader, len, progress);
        let headers = {
            let mut headers = self.auth_headers();
            headers.push((
                "Content-Disposition".to_string(),
                format!("inline: filename=\"{name}\""),
            ));
            headers.push(("Content-Length".to_string(), reader.len().to_string()));
            headers
        };

        let target = parser.build(&address.namespace, address.model.as_deref(), None, None);
        tracing::debug!(uri = %target, name = %name, len, "cinp: uploading file");
        let reply = self
            .invoker()
            .upload(&target, Box::new(reader), headers, timeout)?;
        if reply.status != 202 {
            return Err(unexpected_status(reply.status, "File Upload"));
        }

        reply
            .body
            .as_ref()
            .and_then(|body| body.get("uri"))
            .and_then(|uri| uri.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                CinpError::ResponseError("upload response is missing \"uri\"".to_string())
            })
    }
}
