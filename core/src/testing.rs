//! In-memory transport for unit tests.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::adapter::CallAdapterRegistry;
use crate::call::DynCall;
use crate::converter::{ConverterChain, ConverterFactory, TextConverterFactory};
use crate::descriptor::MethodDescriptor;
use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse, ResponseBody};
use crate::metadata::MethodMetadata;
use crate::transport::{Completion, Transport, TransportCall};
use crate::types::Arg;

pub(crate) const BASE_URL: &str = "http://example.com";

enum Script {
    Respond {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
    },
    BrokenBody {
        status: u16,
        prefix: Bytes,
    },
    Fail(String),
}

/// Hands out scripted outcomes in order, one per created transport call.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Script>>,
    created: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, status: u16, body: &str) {
        self.respond_with(status, Some("text/plain"), body);
    }

    pub(crate) fn respond_with(&self, status: u16, content_type: Option<&str>, body: &str) {
        self.script.lock().push_back(Script::Respond {
            status,
            content_type: content_type.map(str::to_string),
            body: Bytes::copy_from_slice(body.as_bytes()),
        });
    }

    /// A response whose body fails after yielding `prefix`.
    pub(crate) fn broken_body(&self, status: u16, prefix: &str) {
        self.script.lock().push_back(Script::BrokenBody {
            status,
            prefix: Bytes::copy_from_slice(prefix.as_bytes()),
        });
    }

    pub(crate) fn fail(&self, message: &str) {
        self.script.lock().push_back(Script::Fail(message.to_string()));
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn new_call(&self, request: HttpRequest) -> Arc<dyn TransportCall> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        Arc::new(ScriptedCall {
            request,
            script: Mutex::new(self.script.lock().pop_front()),
            canceled: AtomicBool::new(false),
        })
    }
}

struct ScriptedCall {
    request: HttpRequest,
    script: Mutex<Option<Script>>,
    canceled: AtomicBool,
}

impl TransportCall for ScriptedCall {
    fn request(&self) -> &HttpRequest {
        &self.request
    }

    fn execute(&self) -> Result<HttpResponse, TransportError> {
        if self.is_canceled() {
            return Err(TransportError::canceled());
        }
        match self.script.lock().take() {
            Some(Script::Respond {
                status,
                content_type,
                body,
            }) => Ok(HttpResponse::new(status, ResponseBody::from_bytes(content_type.as_deref(), body))),
            Some(Script::BrokenBody { status, prefix }) => Ok(HttpResponse::new(
                status,
                ResponseBody::new(Some("text/plain".to_string()), None, FailingReader { prefix }),
            )),
            Some(Script::Fail(message)) => Err(TransportError::new(message)),
            None => Err(TransportError::new("no scripted response")),
        }
    }

    fn enqueue(&self, completion: Completion) {
        let result = self.execute();
        thread::spawn(move || completion(result));
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// A one-way gate: once opened, every waiter proceeds.
#[derive(Default)]
pub(crate) struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub(crate) fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    pub(crate) fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

/// Holds every execute in flight until released, then answers 200 "Hi"
/// whether or not the call was canceled meanwhile.
#[derive(Default)]
pub(crate) struct GatedTransport {
    pub(crate) started: Arc<Latch>,
    pub(crate) release: Arc<Latch>,
    calls: Mutex<Vec<Arc<GatedCall>>>,
}

impl GatedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether every transport call created so far saw a cancel.
    pub(crate) fn all_canceled(&self) -> bool {
        self.calls.lock().iter().all(|call| call.is_canceled())
    }
}

impl Transport for GatedTransport {
    fn new_call(&self, request: HttpRequest) -> Arc<dyn TransportCall> {
        let call = Arc::new(GatedCall {
            request,
            started: Arc::clone(&self.started),
            release: Arc::clone(&self.release),
            canceled: AtomicBool::new(false),
        });
        self.calls.lock().push(Arc::clone(&call));
        call
    }
}

pub(crate) struct GatedCall {
    request: HttpRequest,
    started: Arc<Latch>,
    release: Arc<Latch>,
    canceled: AtomicBool,
}

fn gated_response(started: &Latch, release: &Latch) -> Result<HttpResponse, TransportError> {
    started.open();
    release.wait();
    Ok(HttpResponse::new(200, ResponseBody::from_bytes(Some("text/plain"), "Hi")))
}

impl TransportCall for GatedCall {
    fn request(&self) -> &HttpRequest {
        &self.request
    }

    fn execute(&self) -> Result<HttpResponse, TransportError> {
        gated_response(&self.started, &self.release)
    }

    fn enqueue(&self, completion: Completion) {
        let started = Arc::clone(&self.started);
        let release = Arc::clone(&self.release);
        thread::spawn(move || completion(gated_response(&started, &release)));
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Yields `prefix`, then fails the way a dropped connection does.
pub(crate) struct FailingReader {
    pub(crate) prefix: Bytes,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.prefix.is_empty() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of stream"));
        }
        let n = buf.len().min(self.prefix.len());
        buf[..n].copy_from_slice(&self.prefix.split_to(n));
        Ok(n)
    }
}

pub(crate) fn descriptor_with(method: MethodMetadata, factories: Vec<Arc<dyn ConverterFactory>>) -> Arc<MethodDescriptor> {
    let descriptor = MethodDescriptor::compile(
        "Service",
        &method,
        &ConverterChain::new(factories),
        &CallAdapterRegistry::default(),
    )
    .expect("test method must compile");
    Arc::new(descriptor)
}

pub(crate) fn call_for<T: Transport + 'static>(method: MethodMetadata, transport: Arc<T>, args: Vec<Arg>) -> DynCall {
    let descriptor = descriptor_with(method, vec![Arc::new(TextConverterFactory)]);
    DynCall::new(descriptor, args.into(), transport, Arc::from(BASE_URL))
}
