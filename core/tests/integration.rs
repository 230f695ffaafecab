//! End-to-end calls against the scripted mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives service calls over
//! real HTTP through a `Transport` backed by ureq. Each test scripts the
//! server's responses and inspects the requests it recorded, so the
//! request builder, the converters and the response parser are exercised
//! against an actual socket.

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use ferrofit_core::{
    Arg, Call, CallError, Callback, Completion, HttpMethod, HttpRequest, HttpResponse, JsonConverterFactory,
    MethodAnnotation, MethodMetadata, ParamMetadata, Response, ResponseBody, RestClient, Service, ServiceDescriptor,
    ServiceRouter, TextConverterFactory, Transport, TransportCall, TransportError,
};
use mock_server::{MockResponse, MockState};
use serde_json::{json, Value};

const TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// ureq transport
// ---------------------------------------------------------------------------

/// Executes requests with ureq, counting every transport call it creates.
///
/// Disables ureq's status-code-as-error behavior so 4xx/5xx responses are
/// returned as data and status interpretation stays with the core.
struct UreqTransport {
    agent: ureq::Agent,
    created: AtomicUsize,
}

impl UreqTransport {
    fn new() -> Arc<Self> {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Arc::new(Self {
            agent,
            created: AtomicUsize::new(0),
        })
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Transport for UreqTransport {
    fn new_call(&self, request: HttpRequest) -> Arc<dyn TransportCall> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(UreqCall {
            agent: self.agent.clone(),
            request,
            canceled: AtomicBool::new(false),
        })
    }
}

struct UreqCall {
    agent: ureq::Agent,
    request: HttpRequest,
    canceled: AtomicBool,
}

impl TransportCall for UreqCall {
    fn request(&self) -> &HttpRequest {
        &self.request
    }

    fn execute(&self) -> Result<HttpResponse, TransportError> {
        if self.is_canceled() {
            return Err(TransportError::canceled());
        }
        send(&self.agent, &self.request)
    }

    fn enqueue(&self, completion: Completion) {
        if self.is_canceled() {
            completion(Err(TransportError::canceled()));
            return;
        }
        let agent = self.agent.clone();
        let request = self.request.clone();
        std::thread::spawn(move || completion(send(&agent, &request)));
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, request: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    request: &HttpRequest,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match &request.body {
        Some(body) => builder.send(&body.content[..]),
        None => builder.send_empty(),
    }
}

fn send(agent: &ureq::Agent, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let url = request.url.as_str();
    let result = match request.method {
        HttpMethod::Get => with_headers(agent.get(url), request).call(),
        HttpMethod::Head => with_headers(agent.head(url), request).call(),
        HttpMethod::Delete => with_headers(agent.delete(url), request).call(),
        HttpMethod::Options => with_headers(agent.options(url), request).call(),
        HttpMethod::Post => send_body(with_headers(agent.post(url), request), request),
        HttpMethod::Put => send_body(with_headers(agent.put(url), request), request),
        HttpMethod::Patch => send_body(with_headers(agent.patch(url), request), request),
    };
    let response = result.map_err(|e| TransportError::new(e.to_string()))?;

    let (parts, body) = response.into_parts();
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    let header = |name: &str| {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };
    let content_type = header("content-type");
    let content_length = header("content-length").and_then(|v| v.parse().ok());

    let mut response = HttpResponse::new(
        parts.status.as_u16(),
        ResponseBody::new(content_type, content_length, body.into_reader()),
    );
    response.headers = headers;
    Ok(response)
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Start the mock server on a random port and return its base URL.
fn start_server(state: MockState) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, state).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

/// Typed facade over the methods the tests call.
struct TestService {
    router: ServiceRouter,
}

impl Service for TestService {
    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new("TestService")
            .method(MethodMetadata::get("getString", "/").returns_call::<String>())
            .method(MethodMetadata::get("getBody", "/").returns_call::<ResponseBody>())
            .method(
                MethodMetadata::get("getStreamingBody", "/")
                    .returns_call::<ResponseBody>()
                    .annotate(MethodAnnotation::Streaming),
            )
            .method(
                MethodMetadata::get("searchTodos", "/users/{id}/todos")
                    .returns_call::<Value>()
                    .param(ParamMetadata::path::<u64>("id"))
                    .param(ParamMetadata::query::<String>("q"))
                    .param(ParamMetadata::query::<u32>("limit")),
            )
            .method(
                MethodMetadata::post("createTodo", "/todos")
                    .returns_call::<Value>()
                    .annotate(MethodAnnotation::Header("X-Client".to_string(), "ferrofit".to_string()))
                    .param(ParamMetadata::header::<String>("X-Request-Id"))
                    .param(ParamMetadata::body::<Value>()),
            )
            .method(MethodMetadata::delete("deleteTodo", "/todos/{id}").param(ParamMetadata::path::<u64>("id")))
    }

    fn bind(router: ServiceRouter) -> Self {
        Self { router }
    }
}

impl TestService {
    fn get_string(&self) -> Call<String> {
        self.router.call("getString", vec![]).unwrap()
    }

    fn get_body(&self) -> Call<ResponseBody> {
        self.router.call("getBody", vec![]).unwrap()
    }

    fn get_streaming_body(&self) -> Call<ResponseBody> {
        self.router.call("getStreamingBody", vec![]).unwrap()
    }

    fn search_todos(&self, id: u64, q: &str, limit: Option<u32>) -> Call<Value> {
        self.router
            .call("searchTodos", vec![Arg::from(id), Arg::from(q), Arg::from(limit)])
            .unwrap()
    }

    fn create_todo(&self, request_id: &str, todo: Value) -> Call<Value> {
        self.router
            .call("createTodo", vec![Arg::from(request_id), Arg::from(todo)])
            .unwrap()
    }

    fn delete_todo(&self, id: u64) -> Call<()> {
        self.router.call("deleteTodo", vec![Arg::from(id)]).unwrap()
    }
}

struct Fixture {
    state: MockState,
    transport: Arc<UreqTransport>,
    service: TestService,
}

fn fixture() -> Fixture {
    let state = MockState::default();
    let base_url = start_server(state.clone());
    let transport = UreqTransport::new();
    let client = RestClient::builder()
        .base_url(&base_url)
        .client(Arc::clone(&transport))
        .add_converter_factory(TextConverterFactory)
        .add_converter_factory(JsonConverterFactory)
        .validate_eagerly(true)
        .build()
        .unwrap();
    let service = client.create_service().unwrap();
    Fixture {
        state,
        transport,
        service,
    }
}

/// Forwards the callback outcome to a channel.
struct Forward<T>(mpsc::Sender<Result<Response<T>, CallError>>);

impl<T: Send + 'static> Callback<T> for Forward<T> {
    fn on_response(self: Box<Self>, response: Response<T>) {
        self.0.send(Ok(response)).unwrap();
    }

    fn on_failure(self: Box<Self>, error: CallError) {
        self.0.send(Err(error)).unwrap();
    }
}

// ---------------------------------------------------------------------------
// Status handling
// ---------------------------------------------------------------------------

#[test]
fn http_200_sync() {
    let f = fixture();
    f.state.enqueue(MockResponse::text(200, "Hi"));

    let response = f.service.get_string().execute().unwrap();
    assert!(response.is_successful());
    assert_eq!(response.code(), 200);
    assert_eq!(response.body().map(String::as_str), Some("Hi"));
    assert!(response.error_body().is_none());
    assert_eq!(f.state.take_request().unwrap().method, "GET");
}

#[test]
fn http_404_sync() {
    let f = fixture();
    f.state.enqueue(MockResponse::text(404, "Hi"));

    let response = f.service.get_string().execute().unwrap();
    assert!(!response.is_successful());
    assert_eq!(response.code(), 404);
    assert!(response.body().is_none());
    assert_eq!(response.error_body().unwrap().text().unwrap(), "Hi");
}

#[test]
fn http_200_async() {
    let f = fixture();
    f.state.enqueue(MockResponse::text(200, "Hi"));

    let (tx, rx) = mpsc::channel();
    f.service.get_string().enqueue(Forward(tx)).unwrap();

    let response = rx.recv_timeout(TIMEOUT).unwrap().unwrap();
    assert_eq!(response.code(), 200);
    assert_eq!(response.into_body().as_deref(), Some("Hi"));
}

#[test]
fn http_404_async() {
    let f = fixture();
    f.state.enqueue(MockResponse::text(404, "Hi"));

    let (tx, rx) = mpsc::channel();
    f.service.get_string().enqueue(Forward(tx)).unwrap();

    let response = rx.recv_timeout(TIMEOUT).unwrap().unwrap();
    assert_eq!(response.code(), 404);
    assert_eq!(response.error_body().unwrap().text().unwrap(), "Hi");
}

#[test]
fn no_content_has_no_body() {
    let f = fixture();
    f.state.enqueue(MockResponse::new(204));
    f.state.enqueue(MockResponse::new(205));

    for _ in 0..2 {
        let response = f.service.get_string().execute().unwrap();
        assert!(response.is_successful());
        assert!(response.body().is_none());
        assert!(response.error_body().is_none());
    }
}

#[test]
fn unit_call_discards_body() {
    let f = fixture();
    f.state.enqueue(MockResponse::text(200, "gone"));

    let response = f.service.delete_todo(7).execute().unwrap();
    assert!(response.is_successful());
    assert!(response.body().is_none());

    let recorded = f.state.take_request().unwrap();
    assert_eq!(recorded.method, "DELETE");
    assert_eq!(recorded.target, "/todos/7");
}

// ---------------------------------------------------------------------------
// Request materialization
// ---------------------------------------------------------------------------

#[test]
fn path_and_query_parameters_reach_the_server() {
    let f = fixture();
    f.state.enqueue(MockResponse::json(200, &json!([{"id": 1, "title": "Buy milk"}])));
    f.state.enqueue(MockResponse::json(200, &json!([])));

    let response = f.service.search_todos(42, "milk", Some(5)).execute().unwrap();
    assert_eq!(response.into_body().unwrap()[0]["title"], "Buy milk");
    assert_eq!(f.state.take_request().unwrap().target, "/users/42/todos?q=milk&limit=5");

    f.service.search_todos(42, "milk", None).execute().unwrap();
    assert_eq!(f.state.take_request().unwrap().target, "/users/42/todos?q=milk");
}

#[test]
fn body_and_headers_reach_the_server() {
    let f = fixture();
    f.state.enqueue(MockResponse::json(201, &json!({"id": 1, "title": "Buy milk", "completed": false})));

    let response = f
        .service
        .create_todo("req-1", json!({"title": "Buy milk", "completed": false}))
        .execute()
        .unwrap();
    assert_eq!(response.code(), 201);
    assert_eq!(response.body().unwrap()["id"], 1);

    let recorded = f.state.take_request().unwrap();
    assert_eq!(recorded.method, "POST");
    assert_eq!(recorded.target, "/todos");
    assert_eq!(recorded.header("X-Client"), Some("ferrofit"));
    assert_eq!(recorded.header("X-Request-Id"), Some("req-1"));
    assert_eq!(recorded.header("Content-Type"), Some("application/json"));
    let sent: Value = serde_json::from_slice(&recorded.body).unwrap();
    assert_eq!(sent, json!({"title": "Buy milk", "completed": false}));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

fn unreachable_service() -> TestService {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    RestClient::builder()
        .base_url(&format!("http://{addr}"))
        .client(UreqTransport::new())
        .add_converter_factory(TextConverterFactory)
        .build()
        .unwrap()
        .create_service()
        .unwrap()
}

#[test]
fn transport_failure_sync() {
    let service = unreachable_service();
    let err = service.get_string().execute().unwrap_err();
    assert!(matches!(err, CallError::Transport(_)));
    assert!(!err.is_canceled());
}

#[test]
fn transport_failure_async() {
    let service = unreachable_service();

    let (tx, rx) = mpsc::channel();
    service.get_string().enqueue(Forward(tx)).unwrap();

    let err = rx.recv_timeout(TIMEOUT).unwrap().unwrap_err();
    assert!(matches!(err, CallError::Transport(_)));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn cancel_before_execute() {
    let f = fixture();
    f.state.enqueue(MockResponse::text(200, "Hi"));
    let call = f.service.get_string();

    call.cancel();
    assert!(call.is_canceled());
    let err = call.execute().unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(f.transport.created(), 0);
    assert_eq!(f.state.request_count(), 0);
}

#[test]
fn buffered_body_surfaces_disconnect_from_execute() {
    let f = fixture();
    f.state.enqueue(MockResponse::broken(200, "Hi"));

    let err = f.service.get_body().execute().unwrap_err();
    assert!(matches!(err, CallError::Transport(_)));
}

#[test]
fn streaming_body_surfaces_disconnect_on_read() {
    let f = fixture();
    f.state.enqueue(MockResponse::broken(200, "Hi"));

    let mut body = f.service.get_streaming_body().execute().unwrap().into_body().unwrap();
    let mut content = Vec::new();
    assert!(body.read_to_end(&mut content).is_err());
}

#[test]
fn malformed_json_is_a_conversion_error() {
    let f = fixture();
    f.state.enqueue(MockResponse::text(200, "not json"));

    let err = f.service.search_todos(1, "x", None).execute().unwrap_err();
    assert!(matches!(err, CallError::Conversion(_)));
}

// ---------------------------------------------------------------------------
// Call lifecycle
// ---------------------------------------------------------------------------

#[test]
fn call_executes_once_and_clones_fresh() {
    let f = fixture();
    f.state.enqueue(MockResponse::text(200, "Hi"));
    f.state.enqueue(MockResponse::text(200, "Hello"));
    let call = f.service.get_string();

    assert_eq!(call.execute().unwrap().into_body().as_deref(), Some("Hi"));
    assert!(matches!(call.execute().unwrap_err(), CallError::State(_)));

    let clone = call.clone();
    assert!(!clone.is_executed());
    assert_eq!(clone.execute().unwrap().into_body().as_deref(), Some("Hello"));
    assert_eq!(f.transport.created(), 2);
}
