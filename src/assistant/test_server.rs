//! Local stand-in for an LLM provider, for tests that drive the real
//! `LlmClient` over HTTP.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub api_key: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    body: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

/// Answers every request with the same status and body, and records what
/// it was sent. The server task lives until the test runtime shuts down.
pub struct StubProvider {
    pub endpoint: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl StubProvider {
    pub async fn spawn(status: StatusCode, body: impl Into<String>) -> StubProvider {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let canned = Canned { status, body: body.into(), seen: seen.clone() };
        let app = Router::new().fallback(reply).with_state(canned);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        StubProvider { endpoint: format!("http://{addr}"), seen }
    }

    /// An endpoint nothing listens on.
    pub async fn refused() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn reply(State(canned): State<Canned>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let header_text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    canned.seen.lock().unwrap().push(SeenRequest {
        path: uri.path().to_string(),
        authorization: header_text(header::AUTHORIZATION.as_str()),
        api_key: header_text("x-goog-api-key"),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    (canned.status, [(header::CONTENT_TYPE, "application/json")], canned.body).into_response()
}
