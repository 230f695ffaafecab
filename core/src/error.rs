//! Error taxonomy for compiling and executing service calls.
//!
//! # Design
//! Each failure class gets its own type so converters, transports and the
//! compiler can only produce the errors that belong to them. `CallError`
//! is the umbrella returned from call operations. Every type here is
//! `Clone`: a request that failed to materialize is stored once and handed
//! back verbatim on every later access, so the error must be reproducible
//! without re-running the failing code.
//!
//! Cancellation is a `TransportError` of kind `Canceled` rather than its
//! own variant, so callers handle "the request did not complete" in one
//! place.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// A service method was declared in a way that cannot be compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}\n    for method {service}.{method}")]
pub struct ConfigurationError {
    pub service: String,
    pub method: String,
    pub reason: String,
}

impl ConfigurationError {
    pub fn new(service: &str, method: &str, reason: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Every configuration error found while eagerly validating a service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} method(s) failed validation:\n{}", .0.len(), render_all(.0))]
pub struct ValidationErrors(pub Vec<ConfigurationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ConfigurationError] {
        &self.0
    }
}

fn render_all(errors: &[ConfigurationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A converter could not turn a value into a request body, or a response
/// body into a value.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConversionError {
    message: String,
    #[source]
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause, e.g. a serde or I/O error.
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Distinguishes network failures from cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Io,
    Canceled,
}

/// The transport failed to produce (or finish reading) a response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Arc<io::Error>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Io,
            message: message.into(),
            source: None,
        }
    }

    pub fn canceled() -> Self {
        Self {
            kind: TransportErrorKind::Canceled,
            message: "Canceled".to_string(),
            source: None,
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn is_canceled(&self) -> bool {
        self.kind == TransportErrorKind::Canceled
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: TransportErrorKind::Io,
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

/// A call was executed or enqueued a second time.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Already executed.")]
pub struct CallStateError;

/// Everything that can go wrong between invoking a service method and
/// holding its `Response`.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    State(#[from] CallStateError),
}

impl CallError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, CallError::Transport(e) if e.is_canceled())
    }
}

/// The client builder was missing a required setting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("base URL required")]
    MissingBaseUrl,

    #[error("transport client required")]
    MissingTransport,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Io => write!(f, "io"),
            TransportErrorKind::Canceled => write!(f, "canceled"),
        }
    }
}
