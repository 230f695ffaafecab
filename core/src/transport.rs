//! The transport collaborator: whatever actually performs HTTP I/O.
//!
//! # Design
//! The core never opens a socket. A `Transport` turns an `HttpRequest`
//! into a `TransportCall` handle that can be executed synchronously,
//! enqueued on the transport's own concurrency primitive, or canceled.
//! Implementations must fail an execute/enqueue with
//! `TransportError::canceled()` once the handle has been canceled.

use std::sync::Arc;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// Completion handler for an enqueued transport call. Invoked exactly once,
/// on a thread chosen by the transport.
pub type Completion = Box<dyn FnOnce(Result<HttpResponse, TransportError>) + Send>;

pub trait Transport: Send + Sync {
    fn new_call(&self, request: HttpRequest) -> Arc<dyn TransportCall>;
}

pub trait TransportCall: Send + Sync {
    fn request(&self) -> &HttpRequest;

    /// Block until the response head is available.
    fn execute(&self) -> Result<HttpResponse, TransportError>;

    fn enqueue(&self, completion: Completion);

    fn cancel(&self);

    fn is_canceled(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn new_call(&self, request: HttpRequest) -> Arc<dyn TransportCall> {
        (**self).new_call(request)
    }
}
