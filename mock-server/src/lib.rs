//! Scriptable HTTP server for exercising clients over real sockets.
//!
//! # Design
//! Tests enqueue `MockResponse`s; every incoming request, whatever its
//! method or path, is recorded and answered with the next response in the
//! queue. A response can be marked to fail mid-body, which drops the
//! connection after a prefix has been sent.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{self, HeaderMap, Method, StatusCode, Uri},
    response::Response,
    Router,
};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::TcpListener;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Abort the body stream once `body` has been written.
    pub fail_after_body: bool,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            fail_after_body: false,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body)
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            body: Bytes::from(value.to_string()),
            ..Self::new(status).with_header("Content-Type", "application/json")
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Bytes::copy_from_slice(body.as_bytes());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Send `prefix`, then drop the connection.
    pub fn broken(status: u16, prefix: &str) -> Self {
        Self {
            fail_after_body: true,
            ..Self::new(status).with_body(prefix)
        }
    }
}

/// A request as the server saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query string.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<MockResponse>,
    requests: VecDeque<RecordedRequest>,
}

/// Shared queue of scripted responses and recorded requests.
#[derive(Clone, Default)]
pub struct MockState {
    script: Arc<Mutex<Script>>,
}

impl MockState {
    pub fn enqueue(&self, response: MockResponse) {
        self.script.lock().responses.push_back(response);
    }

    /// The oldest request not yet taken.
    pub fn take_request(&self) -> Option<RecordedRequest> {
        self.script.lock().requests.pop_front()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().requests.len()
    }
}

pub fn app(state: MockState) -> Router {
    Router::new().fallback(respond).with_state(state)
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), io::Error> {
    axum::serve(listener, app(state)).await
}

async fn respond(State(state): State<MockState>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let recorded = RecordedRequest {
        method: method.to_string(),
        target: uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string()),
        headers: headers
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect(),
        body,
    };

    let scripted = {
        let mut script = state.script.lock();
        script.requests.push_back(recorded);
        script.responses.pop_front()
    };
    let Some(scripted) = scripted else {
        return plain(StatusCode::INTERNAL_SERVER_ERROR, "no scripted response");
    };

    let body = if scripted.fail_after_body {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(scripted.body),
            Err(io::Error::new(io::ErrorKind::ConnectionAborted, "scripted disconnect")),
        ];
        Body::from_stream(futures::stream::iter(chunks))
    } else {
        Body::from(scripted.body)
    };

    let mut builder = http::Response::builder().status(scripted.status);
    for (name, value) in &scripted.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(body)
        .unwrap_or_else(|_| plain(StatusCode::INTERNAL_SERVER_ERROR, "invalid scripted response"))
}

fn plain(status: StatusCode, message: &'static str) -> Response {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}
