//! The parsed result of a call.

use std::any::type_name;

use bytes::Bytes;

use crate::error::ConversionError;
use crate::http::find_header;
use crate::types::AnyValue;

/// Transport response metadata kept after the body has been consumed.
///
/// The body cannot be read from here: it was either converted into
/// `Response::body` or buffered into `Response::error_body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// The transport's own classification, taken once when the response
    /// arrived.
    pub successful: bool,
}

impl RawResponse {
    pub fn is_successful(&self) -> bool {
        self.successful
    }
}

/// A non-2xx body, fully read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl ErrorBody {
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.content)
    }
}

/// Either a converted success body or a buffered error body, never both.
/// Both are absent for 204/205 and for methods that discard their body.
#[derive(Debug)]
pub struct Response<T> {
    raw: RawResponse,
    body: Option<T>,
    error_body: Option<ErrorBody>,
}

impl<T> Response<T> {
    pub(crate) fn success(raw: RawResponse, body: Option<T>) -> Self {
        Self {
            raw,
            body,
            error_body: None,
        }
    }

    pub(crate) fn error(raw: RawResponse, error_body: ErrorBody) -> Self {
        Self {
            raw,
            body: None,
            error_body: Some(error_body),
        }
    }

    pub fn code(&self) -> u16 {
        self.raw.status
    }

    pub fn is_successful(&self) -> bool {
        self.raw.is_successful()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.raw.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.raw.headers, name)
    }

    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<T> {
        self.body
    }

    pub fn error_body(&self) -> Option<&ErrorBody> {
        self.error_body.as_ref()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            raw: self.raw,
            body: self.body.map(f),
            error_body: self.error_body,
        }
    }
}

impl Response<AnyValue> {
    /// Recover the concrete body type chosen by the response converter.
    pub fn downcast<T: 'static>(self) -> Result<Response<T>, ConversionError> {
        let body = match self.body {
            Some(value) => Some(*value.downcast::<T>().map_err(|_| {
                ConversionError::new(format!(
                    "response converter did not produce a {}",
                    type_name::<T>()
                ))
            })?),
            None => None,
        };
        Ok(Response {
            raw: self.raw,
            body,
            error_body: self.error_body,
        })
    }
}
