//! Shared helpers: solver doubles, a fake Gemini endpoint, multipart bodies.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use neuralmath::{EncodedPayload, SolveError, Solution, Solver};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

// ── Solver doubles ───────────────────────────────────────────────────────────

/// Answers with a fixed outcome and records every payload it saw.
pub struct Canned {
    pub reply: Result<Solution, SolveError>,
    pub seen: Mutex<Vec<EncodedPayload>>,
}

impl Canned {
    pub fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(Solution::text(text)),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn err(error: SolveError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Solver for Canned {
    fn name(&self) -> &str {
        "canned"
    }

    async fn solve(
        &self,
        payload: &EncodedPayload,
        _instruction: &str,
    ) -> Result<Solution, SolveError> {
        self.seen.lock().unwrap().push(payload.clone());
        self.reply.clone()
    }
}

/// Holds every request until `release` is called.
pub struct Gated {
    pub gate: Notify,
    pub text: String,
}

impl Gated {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            text: text.to_string(),
        })
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl Solver for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    async fn solve(
        &self,
        _payload: &EncodedPayload,
        _instruction: &str,
    ) -> Result<Solution, SolveError> {
        self.gate.notified().await;
        Ok(Solution::text(self.text.clone()))
    }
}

/// Sleeps for the number of milliseconds given by the payload's first byte
/// × 10, then answers with the payload's file type.
pub struct Delayed;

#[async_trait]
impl Solver for Delayed {
    fn name(&self) -> &str {
        "delayed"
    }

    async fn solve(
        &self,
        payload: &EncodedPayload,
        _instruction: &str,
    ) -> Result<Solution, SolveError> {
        let bytes = payload.decode().expect("valid base64");
        let delay = u64::from(bytes.first().copied().unwrap_or(0)) * 10;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(Solution::text(format!("answer for {}", payload.mime_type)))
    }
}

// ── Fake Gemini endpoint ─────────────────────────────────────────────────────

/// What the fake endpoint received.
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub api_key: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct FakeState {
    status: StatusCode,
    body: serde_json::Value,
    delay: Duration,
    captured: Arc<Mutex<Vec<Captured>>>,
}

pub struct FakeGemini {
    pub addr: SocketAddr,
    pub captured: Arc<Mutex<Vec<Captured>>>,
}

impl FakeGemini {
    /// API root to hand to `SolverConfig::api_base`.
    pub fn api_base(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }
}

/// Start a fake `generateContent` endpoint replying with `status` / `body`.
pub async fn fake_gemini(status: StatusCode, body: serde_json::Value) -> FakeGemini {
    fake_gemini_delayed(status, body, Duration::ZERO).await
}

pub async fn fake_gemini_delayed(
    status: StatusCode,
    body: serde_json::Value,
    delay: Duration,
) -> FakeGemini {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = FakeState {
        status,
        body,
        delay,
        captured: Arc::clone(&captured),
    };

    let app = Router::new()
        .route("/v1beta/{*rest}", post(fake_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeGemini { addr, captured }
}

async fn fake_handler(
    State(state): State<FakeState>,
    uri: axum::http::Uri,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.captured.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body,
    });
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (state.status, Json(state.body))
}

/// A successful `generateContent` response carrying `text`.
pub fn gemini_text(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 270, "candidatesTokenCount": 21 },
        "modelVersion": "gemini-1.5-pro-002"
    })
}

// ── Multipart ────────────────────────────────────────────────────────────────

pub const BOUNDARY: &str = "neuralmath-test-boundary";

/// Build a `multipart/form-data` body with one file field.
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Build a `multipart/form-data` body with one plain text field.
pub fn multipart_text_body(field: &str, value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n--{BOUNDARY}--\r\n"
    )
    .into_bytes()
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Smallest valid-looking PNG header, enough for type sniffing.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";
