//! HTTP data types exchanged with the transport collaborator.
//!
//! # Design
//! Requests and responses are plain data. The core builds `HttpRequest`
//! values and consumes `HttpResponse` values without ever touching the
//! network; a `Transport` implementation owns the actual I/O. Request
//! bodies are fully materialized `Bytes`. Response bodies are a readable
//! stream so converters can choose between buffering and streaming.

use std::fmt;
use std::io::{self, Cursor, Read};

use bytes::Bytes;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Whether a request with this method carries a body.
    pub fn permits_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully materialized request body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestBody {
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl RequestBody {
    pub fn new(content_type: Option<&str>, content: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.map(str::to_string),
            content: content.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// An HTTP request described as plain data.
///
/// Built by the request builder when a call materializes. The transport is
/// responsible for sending it and producing the matching `HttpResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A readable response body with its declared content type and length.
pub struct ResponseBody {
    content_type: Option<String>,
    content_length: Option<u64>,
    source: Box<dyn Read + Send>,
}

impl ResponseBody {
    pub fn new(
        content_type: Option<String>,
        content_length: Option<u64>,
        source: impl Read + Send + 'static,
    ) -> Self {
        Self {
            content_type,
            content_length,
            source: Box::new(source),
        }
    }

    /// A body backed by bytes already in memory.
    pub fn from_bytes(content_type: Option<&str>, content: impl Into<Bytes>) -> Self {
        let content: Bytes = content.into();
        Self {
            content_type: content_type.map(str::to_string),
            content_length: Some(content.len() as u64),
            source: Box::new(Cursor::new(content)),
        }
    }

    pub fn empty() -> Self {
        Self::from_bytes(None, Bytes::new())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the remaining body into memory.
    pub fn bytes(mut self) -> io::Result<Bytes> {
        let mut buf = Vec::with_capacity(self.content_length.unwrap_or(0).min(64 * 1024) as usize);
        self.source.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Read the remaining body as UTF-8 text.
    pub fn string(self) -> io::Result<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Read and discard whatever is left, then drop the source.
    pub fn drain(mut self) -> io::Result<()> {
        io::copy(&mut self.source, &mut io::sink())?;
        Ok(())
    }

    pub(crate) fn map_source<R, F>(self, wrap: F) -> Self
    where
        R: Read + Send + 'static,
        F: FnOnce(Box<dyn Read + Send>) -> R,
    {
        Self {
            content_type: self.content_type,
            content_length: self.content_length,
            source: Box::new(wrap(self.source)),
        }
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.source.read(buf)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// An HTTP response as produced by the transport.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// True for 2xx status codes.
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
