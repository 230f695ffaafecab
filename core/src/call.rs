//! The call execution engine.
//!
//! # Design
//! A call is a single-use unit of work bound to one compiled descriptor and
//! one argument list. Nothing touches the transport until the call is
//! executed, enqueued or asked for its request; the transport call is then
//! materialized once and reused. A materialization failure is captured and
//! returned verbatim on every later access.
//!
//! Cancellation is a flag plus a best-effort transport cancel. `cancel`
//! stores the flag before taking the materialization lock, and `execute`
//! re-checks the flag after releasing it, so whichever side loses the race
//! still sees the other's effect.
//!
//! `DynCall` is the type-erased form handed to call adapters; `Call<T>` is
//! the typed view used by application code.

use std::fmt;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::descriptor::MethodDescriptor;
use crate::error::{CallError, CallStateError, ConversionError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::response::{ErrorBody, RawResponse, Response};
use crate::transport::{Transport, TransportCall};
use crate::types::{AnyValue, Arg};

/// Where a call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    Executing,
    Enqueued,
    Completed,
    Failed,
    Canceled,
}

const CREATED: u8 = 0;
const EXECUTING: u8 = 1;
const ENQUEUED: u8 = 2;
const COMPLETED: u8 = 3;
const FAILED: u8 = 4;

/// Receives the outcome of an enqueued call. Exactly one method is invoked,
/// exactly once.
pub trait Callback<T>: Send + 'static {
    fn on_response(self: Box<Self>, response: Response<T>);

    fn on_failure(self: Box<Self>, error: CallError);
}

impl<T, F> Callback<T> for F
where
    F: FnOnce(Result<Response<T>, CallError>) + Send + 'static,
{
    fn on_response(self: Box<Self>, response: Response<T>) {
        (*self)(Ok(response))
    }

    fn on_failure(self: Box<Self>, error: CallError) {
        (*self)(Err(error))
    }
}

struct ExecState {
    raw: Option<Arc<dyn TransportCall>>,
    creation_failure: Option<CallError>,
}

struct CallCore {
    descriptor: Arc<MethodDescriptor>,
    args: Arc<[Arg]>,
    transport: Arc<dyn Transport>,
    base_url: Arc<str>,
    lifecycle: AtomicU8,
    canceled: AtomicBool,
    exec: Mutex<ExecState>,
}

impl CallCore {
    fn new(descriptor: Arc<MethodDescriptor>, args: Arc<[Arg]>, transport: Arc<dyn Transport>, base_url: Arc<str>) -> Self {
        Self {
            descriptor,
            args,
            transport,
            base_url,
            lifecycle: AtomicU8::new(CREATED),
            canceled: AtomicBool::new(false),
            exec: Mutex::new(ExecState {
                raw: None,
                creation_failure: None,
            }),
        }
    }

    fn begin(&self, next: u8) -> Result<(), CallStateError> {
        self.lifecycle
            .compare_exchange(CREATED, next, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| CallStateError)
    }

    fn finish<T>(&self, result: &Result<T, CallError>) {
        let state = if result.is_ok() { COMPLETED } else { FAILED };
        self.lifecycle.store(state, Ordering::Release);
        debug!(
            service = %self.descriptor.service(),
            method = %self.descriptor.name(),
            ok = result.is_ok(),
            "call finished"
        );
    }

    fn flagged(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Create the transport call on first use; later uses see the same
    /// call or the same failure.
    fn raw_call(&self) -> Result<Arc<dyn TransportCall>, CallError> {
        let mut exec = self.exec.lock();
        if let Some(raw) = &exec.raw {
            return Ok(Arc::clone(raw));
        }
        if let Some(err) = &exec.creation_failure {
            return Err(err.clone());
        }
        match self.descriptor.to_request(&self.base_url, &self.args) {
            Ok(request) => {
                let raw = self.transport.new_call(request);
                exec.raw = Some(Arc::clone(&raw));
                Ok(raw)
            }
            Err(err) => {
                warn!(
                    service = %self.descriptor.service(),
                    method = %self.descriptor.name(),
                    error = %err,
                    "failed to create request"
                );
                exec.creation_failure = Some(err.clone());
                Err(err)
            }
        }
    }

    fn run(&self) -> Result<Response<AnyValue>, CallError> {
        if self.flagged() {
            return Err(TransportError::canceled().into());
        }
        let raw = self.raw_call()?;
        if self.flagged() {
            raw.cancel();
        }
        let response = raw.execute()?;
        self.complete(response)
    }

    fn complete(&self, response: HttpResponse) -> Result<Response<AnyValue>, CallError> {
        if self.flagged() {
            debug!(method = %self.descriptor.name(), "discarding response of canceled call");
            return Err(TransportError::canceled().into());
        }
        parse_response(&self.descriptor, response)
    }
}

/// A type-erased call whose success body is whatever the method's response
/// converter produces.
pub struct DynCall {
    core: Arc<CallCore>,
}

impl DynCall {
    pub(crate) fn new(
        descriptor: Arc<MethodDescriptor>,
        args: Arc<[Arg]>,
        transport: Arc<dyn Transport>,
        base_url: Arc<str>,
    ) -> Self {
        Self {
            core: Arc::new(CallCore::new(descriptor, args, transport, base_url)),
        }
    }

    /// Send the request and block until the response has been parsed.
    pub fn execute(&self) -> Result<Response<AnyValue>, CallError> {
        self.core.begin(EXECUTING)?;
        debug!(
            service = %self.core.descriptor.service(),
            method = %self.core.descriptor.name(),
            "executing call"
        );
        let result = self.core.run();
        self.core.finish(&result);
        result
    }

    /// Send the request on the transport's own executor and report the
    /// outcome to `callback`. Only a repeated use is returned as an error.
    pub fn enqueue<F>(&self, callback: F) -> Result<(), CallStateError>
    where
        F: FnOnce(Result<Response<AnyValue>, CallError>) + Send + 'static,
    {
        self.core.begin(ENQUEUED)?;
        debug!(
            service = %self.core.descriptor.service(),
            method = %self.core.descriptor.name(),
            "enqueueing call"
        );

        let core = Arc::clone(&self.core);
        let deliver = move |result: Result<Response<AnyValue>, CallError>| {
            core.finish(&result);
            callback(result);
        };

        if self.core.flagged() {
            deliver(Err(TransportError::canceled().into()));
            return Ok(());
        }
        let raw = match self.core.raw_call() {
            Ok(raw) => raw,
            Err(err) => {
                deliver(Err(err));
                return Ok(());
            }
        };
        if self.core.flagged() {
            raw.cancel();
        }

        let core = Arc::clone(&self.core);
        raw.enqueue(Box::new(move |result: Result<HttpResponse, TransportError>| {
            let result = match result {
                Ok(response) => core.complete(response),
                Err(err) => Err(err.into()),
            };
            deliver(result);
        }));
        Ok(())
    }

    pub fn cancel(&self) {
        if self.core.canceled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(method = %self.core.descriptor.name(), "canceling call");
        let raw = self.core.exec.lock().raw.clone();
        if let Some(raw) = raw {
            raw.cancel();
        }
    }

    pub fn is_canceled(&self) -> bool {
        if self.core.flagged() {
            return true;
        }
        self.core.exec.lock().raw.as_ref().is_some_and(|raw| raw.is_canceled())
    }

    pub fn is_executed(&self) -> bool {
        self.core.lifecycle.load(Ordering::Acquire) != CREATED
    }

    pub fn state(&self) -> CallState {
        let lifecycle = self.core.lifecycle.load(Ordering::Acquire);
        match lifecycle {
            COMPLETED => CallState::Completed,
            FAILED => CallState::Failed,
            _ if self.is_canceled() => CallState::Canceled,
            EXECUTING => CallState::Executing,
            ENQUEUED => CallState::Enqueued,
            _ => CallState::Created,
        }
    }

    /// The request this call sends, materializing it if needed.
    pub fn request(&self) -> Result<HttpRequest, CallError> {
        Ok(self.core.raw_call()?.request().clone())
    }

    pub fn descriptor(&self) -> &Arc<MethodDescriptor> {
        &self.core.descriptor
    }

    pub fn typed<T: 'static>(self) -> Call<T> {
        Call {
            inner: self,
            _body: PhantomData,
        }
    }
}

impl Clone for DynCall {
    /// A fresh, unexecuted call for the same method and arguments.
    fn clone(&self) -> Self {
        Self::new(
            Arc::clone(&self.core.descriptor),
            Arc::clone(&self.core.args),
            Arc::clone(&self.core.transport),
            Arc::clone(&self.core.base_url),
        )
    }
}

impl fmt::Debug for DynCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynCall")
            .field("service", &self.core.descriptor.service())
            .field("method", &self.core.descriptor.name())
            .field("state", &self.state())
            .finish()
    }
}

/// A call whose success body is a `T`.
pub struct Call<T> {
    inner: DynCall,
    _body: PhantomData<fn() -> T>,
}

impl<T: 'static> Call<T> {
    pub fn execute(&self) -> Result<Response<T>, CallError> {
        Ok(self.inner.execute()?.downcast::<T>()?)
    }

    pub fn enqueue(&self, callback: impl Callback<T>) -> Result<(), CallStateError> {
        let callback: Box<dyn Callback<T>> = Box::new(callback);
        self.inner.enqueue(move |result| {
            match result.and_then(|response| response.downcast::<T>().map_err(CallError::from)) {
                Ok(response) => callback.on_response(response),
                Err(err) => callback.on_failure(err),
            }
        })
    }

    pub fn cancel(&self) {
        self.inner.cancel()
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.is_canceled()
    }

    pub fn is_executed(&self) -> bool {
        self.inner.is_executed()
    }

    pub fn state(&self) -> CallState {
        self.inner.state()
    }

    pub fn request(&self) -> Result<HttpRequest, CallError> {
        self.inner.request()
    }

    pub fn into_inner(self) -> DynCall {
        self.inner
    }
}

impl<T> Clone for Call<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _body: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Call").field(&self.inner).finish()
    }
}

/// Records the first read failure of a body without hiding it from the
/// reader's consumer.
struct CapturingReader {
    inner: Box<dyn Read + Send>,
    failure: Arc<Mutex<Option<TransportError>>>,
}

impl Read for CapturingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|e| {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(io::Error::new(e.kind(), e.to_string()).into());
            }
        })
    }
}

struct ConversionOutcome {
    value: Option<AnyValue>,
    stream_error: Option<TransportError>,
    converter_error: Option<ConversionError>,
}

impl ConversionOutcome {
    fn resolve(self) -> Result<Option<AnyValue>, CallError> {
        match (self.stream_error, self.converter_error) {
            (Some(stream), Some(converter)) => {
                debug!(converter_error = %converter, stream_error = %stream, "reporting stream failure over converter failure");
                Err(stream.into())
            }
            (None, Some(converter)) => Err(converter.into()),
            _ => Ok(self.value),
        }
    }
}

fn parse_response(descriptor: &MethodDescriptor, response: HttpResponse) -> Result<Response<AnyValue>, CallError> {
    let successful = response.is_successful();
    let HttpResponse { status, headers, body } = response;
    let raw = RawResponse {
        status,
        headers,
        content_type: body.content_type().map(str::to_string),
        content_length: body.content_length(),
        successful,
    };

    if status == 204 || status == 205 {
        drop(body);
        return Ok(Response::success(raw, None));
    }

    let failure = Arc::new(Mutex::new(None));
    let body = {
        let failure = Arc::clone(&failure);
        body.map_source(move |inner| CapturingReader { inner, failure })
    };

    if !successful {
        let content = body.bytes().map_err(TransportError::from)?;
        let error_body = ErrorBody {
            content_type: raw.content_type.clone(),
            content,
        };
        return Ok(Response::error(raw, error_body));
    }

    let converted = descriptor.response_converter().convert(body);
    let (value, converter_error) = match converted {
        Ok(value) => (value, None),
        Err(err) => (None, Some(err)),
    };
    let outcome = ConversionOutcome {
        value,
        stream_error: failure.lock().take(),
        converter_error,
    };
    Ok(Response::success(raw, outcome.resolve()?))
}
