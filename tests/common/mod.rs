//! Test utilities and common setup.
//!
//! Spins up a mock upstream API on an ephemeral port so the proxy under
//! test performs real forwarding, including live byte streams.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};

use chatrelay::api::{AppState, create_router};
use chatrelay::upstream::UpstreamClient;

/// What the mock upstream answers on send-prompt.
pub enum SendBehavior {
    /// A buffered JSON body with the given status.
    Json(StatusCode, Value),
    /// A chunked byte stream; `Err` aborts the body mid-stream.
    Chunks(Vec<Result<&'static str, ()>>),
}

pub struct MockUpstream {
    pub send_behavior: Mutex<SendBehavior>,
    pub history_behavior: Mutex<(StatusCode, Value)>,
    pub send_hits: AtomicUsize,
    pub history_hits: AtomicUsize,
    pub last_send_body: Mutex<Option<Value>>,
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self {
            send_behavior: Mutex::new(SendBehavior::Json(StatusCode::OK, json!({"status": "ok"}))),
            history_behavior: Mutex::new((
                StatusCode::OK,
                json!({"status": "success", "memory": []}),
            )),
            send_hits: AtomicUsize::new(0),
            history_hits: AtomicUsize::new(0),
            last_send_body: Mutex::new(None),
        }
    }
}

impl MockUpstream {
    pub fn send_hits(&self) -> usize {
        self.send_hits.load(Ordering::SeqCst)
    }

    pub fn history_hits(&self) -> usize {
        self.history_hits.load(Ordering::SeqCst)
    }

    pub fn set_send(&self, behavior: SendBehavior) {
        *self.send_behavior.lock().unwrap() = behavior;
    }

    pub fn set_history(&self, status: StatusCode, body: Value) {
        *self.history_behavior.lock().unwrap() = (status, body);
    }

    pub fn last_send_body(&self) -> Option<Value> {
        self.last_send_body.lock().unwrap().clone()
    }
}

async fn mock_send(State(mock): State<Arc<MockUpstream>>, Json(body): Json<Value>) -> Response {
    mock.send_hits.fetch_add(1, Ordering::SeqCst);
    *mock.last_send_body.lock().unwrap() = Some(body);

    match &*mock.send_behavior.lock().unwrap() {
        SendBehavior::Json(status, value) => (*status, Json(value.clone())).into_response(),
        SendBehavior::Chunks(chunks) => {
            let chunks = chunks.clone();
            // Yield between chunks so hyper flushes headers and earlier
            // chunks before an `Err` aborts the body; an always-ready
            // stream would abort the connection before the response
            // headers leave the mock, turning a mid-stream failure into
            // a connect failure.
            let stream = futures::stream::iter(chunks).then(|chunk| async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                match chunk {
                    Ok(text) => Ok(Bytes::from(text)),
                    Err(()) => Err(io::Error::other("mock stream failure")),
                }
            });
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/event-stream")
                .body(Body::from_stream(stream))
                .unwrap()
        }
    }
}

async fn mock_history(State(mock): State<Arc<MockUpstream>>, Json(_): Json<Value>) -> Response {
    mock.history_hits.fetch_add(1, Ordering::SeqCst);
    let (status, body) = mock.history_behavior.lock().unwrap().clone();
    (status, Json(body)).into_response()
}

/// Bind the mock upstream on an ephemeral port and return its base URL.
pub async fn spawn_mock_upstream(mock: Arc<MockUpstream>) -> String {
    let app = Router::new()
        .route("/api/v2/send-prompt", post(mock_send))
        .route("/api/v2/get-history", post(mock_history))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// Proxy router wired to a fresh mock upstream.
pub async fn test_app() -> (Router, Arc<MockUpstream>) {
    let mock = Arc::new(MockUpstream::default());
    let base_url = spawn_mock_upstream(mock.clone()).await;
    let state = AppState::new(UpstreamClient::new(base_url, "test-token"));
    (create_router(state), mock)
}

/// Proxy router without an upstream credential.
pub fn test_app_unconfigured() -> Router {
    create_router(AppState::unconfigured())
}
