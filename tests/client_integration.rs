use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use backoffice_http::{
    FilePart, HttpPipeline, MemoryTokenStore, PipelineError, PipelineOptions, RequestSpec,
    TokenStore, TransportError,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
enum MockBody {
    Json(JsonValue),
    Text(&'static str),
}

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: MockBody,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body: MockBody::Json(body),
            delay: Duration::from_millis(0),
        }
    }

    fn text(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            body: MockBody::Text(body),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct SeenRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    hits: Arc<AtomicUsize>,
}

async fn api_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    _body: axum::body::Bytes,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .seen
        .lock()
        .expect("seen mutex must not be poisoned")
        .push(SeenRequest {
            method,
            uri,
            headers,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    match response.body {
        MockBody::Json(body) => (response.status, Json(body)).into_response(),
        MockBody::Text(text) => {
            (response.status, [(header::CONTENT_TYPE, "text/plain")], text).into_response()
        }
    }
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            timeout: Duration::from_secs(2),
            retry_delay: Duration::from_millis(1),
            rate_limit_base_delay: Duration::from_millis(1),
            queue_delay: Duration::from_millis(1),
            cache_hit_delay: Duration::from_millis(1),
            ..PipelineOptions::new(format!("{}/api", self.base_url))
        }
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen mutex must not be poisoned").clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        seen: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new().fallback(api_handler).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        seen: state.seen,
        task,
    }
}

#[tokio::test]
async fn get_returns_body_and_serves_repeat_from_cache() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!([{"id": 1, "name": "Kiosk"}]),
    )])
    .await;
    let pipeline = HttpPipeline::builder(server.options())
        .build()
        .expect("pipeline must build");

    let first = pipeline
        .merchants()
        .list(json!({"limit": 20}))
        .await
        .expect("listing must succeed");
    let second = pipeline
        .merchants()
        .list(json!({"limit": 20}))
        .await
        .expect("cached listing must succeed");

    assert_eq!(first.status, 200);
    assert_eq!(first.data, json!([{"id": 1, "name": "Kiosk"}]));
    assert_eq!(second.data, first.data);
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);

    let seen = server.seen();
    assert_eq!(seen[0].method, Method::GET);
    assert_eq!(seen[0].uri.path(), "/api/merchants");
    assert_eq!(seen[0].uri.query(), Some("limit=20"));
}

#[tokio::test]
async fn bearer_token_and_client_headers_reach_the_server() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"ok": true}))]).await;
    let store = Arc::new(MemoryTokenStore::with_token("secret-token"));
    let pipeline = HttpPipeline::builder(server.options())
        .token_store(store)
        .build()
        .expect("pipeline must build");

    pipeline
        .tasks()
        .create(json!({"title": "Call merchant"}))
        .await
        .expect("create must succeed");

    let seen = server.seen();
    let headers = &seen[0].headers;
    assert_eq!(
        headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
        Some("Bearer secret-token")
    );
    assert!(headers.contains_key("x-request-time"));
    assert!(headers.contains_key("x-client-version"));
    assert_eq!(
        headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
}

#[tokio::test]
async fn retries_on_retryable_http_status() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"message": "boom"})),
        MockResponse::json(StatusCode::OK, json!({"id": 5, "status": "open"})),
    ])
    .await;
    let pipeline = HttpPipeline::builder(server.options())
        .build()
        .expect("pipeline must build");

    let response = pipeline
        .tasks()
        .update_status(5, "open")
        .await
        .expect("request must succeed after retry");

    assert_eq!(response.data["status"], "open");
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limit_is_retried() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::TOO_MANY_REQUESTS, json!({"message": "slow down"})),
        MockResponse::json(StatusCode::TOO_MANY_REQUESTS, json!({"message": "slow down"})),
        MockResponse::json(StatusCode::OK, json!({"revenue": 1200})),
    ])
    .await;
    let pipeline = HttpPipeline::builder(server.options())
        .build()
        .expect("pipeline must build");

    let response = pipeline
        .analytics()
        .revenue(json!({"period": "month"}))
        .await
        .expect("request must succeed after backing off");
    assert_eq!(response.data["revenue"], 1200);
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"ok": true}))
        .with_delay(Duration::from_millis(150))])
    .await;
    let options = PipelineOptions {
        timeout: Duration::from_millis(20),
        max_retries: 0,
        ..server.options()
    };
    let pipeline = HttpPipeline::builder(options)
        .build()
        .expect("pipeline must build");

    let err = pipeline
        .content()
        .delete(3)
        .await
        .expect_err("request must time out");

    match err {
        PipelineError::Transport {
            source: TransportError::Timeout(after),
            ..
        } => assert_eq!(after, Duration::from_millis(20)),
        other => panic!("expected transport timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_body_becomes_the_message() {
    let server = spawn_server(vec![MockResponse::text(StatusCode::BAD_REQUEST, "Bad input")]).await;
    let pipeline = HttpPipeline::builder(server.options())
        .build()
        .expect("pipeline must build");

    let err = pipeline
        .disputes()
        .create(json!({"taskId": 1}))
        .await
        .expect_err("400 must fail");
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.message(), "Bad input");
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unauthorized_response_clears_stored_token() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::UNAUTHORIZED,
        json!({"message": "Token expired"}),
    )])
    .await;
    let store = Arc::new(MemoryTokenStore::with_token("stale"));
    let pipeline = HttpPipeline::builder(server.options())
        .token_store(store.clone())
        .build()
        .expect("pipeline must build");

    let err = pipeline
        .security()
        .sessions()
        .await
        .expect_err("401 must fail");
    assert_eq!(err.status(), Some(401));
    assert_eq!(store.get_token(), None);
}

#[tokio::test]
async fn login_stores_token_for_following_requests() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::OK, json!({"token": "issued", "user": {"role": "admin"}})),
        MockResponse::json(StatusCode::OK, json!({"id": "u1"})),
    ])
    .await;
    let pipeline = HttpPipeline::builder(server.options())
        .build()
        .expect("pipeline must build");

    pipeline
        .auth()
        .login("admin@example.com", "pw")
        .await
        .expect("login must succeed");
    pipeline.users().get("u1").await.expect("get must succeed");

    let seen = server.seen();
    assert_eq!(seen[0].uri.path(), "/api/auth/login");
    assert!(seen[0].headers.get(header::AUTHORIZATION).is_none());
    assert_eq!(
        seen[1].headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
        Some("Bearer issued")
    );
}

#[tokio::test]
async fn multipart_upload_reaches_the_server() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::CREATED,
        json!({"url": "/files/receipt.pdf"}),
    )])
    .await;
    let pipeline = HttpPipeline::builder(server.options())
        .build()
        .expect("pipeline must build");

    let response = pipeline
        .uploads()
        .file(
            FilePart::new("file", "receipt.pdf", "application/pdf", b"%PDF-1.4".to_vec()),
            vec![("kind".to_owned(), "receipt".to_owned())],
        )
        .await
        .expect("upload must succeed");
    assert_eq!(response.status, 201);

    let seen = server.seen();
    let content_type = seen[0]
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("multipart/form-data"));
}

#[tokio::test]
async fn quiet_not_found_endpoint_returns_none() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"message": "No merchant yet"}),
    )])
    .await;
    let pipeline = HttpPipeline::builder(server.options())
        .build()
        .expect("pipeline must build");

    let merchant = pipeline
        .merchants()
        .my_merchant()
        .await
        .expect("404 must not be an error");
    assert_eq!(merchant, None);
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn explicit_request_spec_round_trip() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({"status": "ok"}))]).await;
    let pipeline = HttpPipeline::builder(server.options())
        .build()
        .expect("pipeline must build");

    let response = pipeline
        .send(RequestSpec::get("/health").timeout(Duration::from_millis(500)))
        .await
        .expect("health must succeed");
    assert!(response.is_success());
    assert_eq!(response.header("content-type"), Some("application/json"));
}
