//! The upload form served over a real socket, with solver doubles.

mod common;

use common::{
    multipart_body, multipart_content_type, multipart_text_body, Canned, Gated, PNG_BYTES,
};
use neuralmath::{router, AppState, InferenceError, ServerConfig, SolveError, Solver};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn start(solver: Arc<dyn Solver>, config: ServerConfig) -> SocketAddr {
    let state = AppState::new(solver, "solve it", &config);
    let app = router(state, config.max_upload_bytes);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn upload(addr: SocketAddr, file_name: &str, content_type: &str, bytes: &[u8]) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/upload"))
        .header("content-type", multipart_content_type())
        .body(multipart_body("image", file_name, content_type, bytes))
        .send()
        .await
        .unwrap()
}

async fn state(addr: SocketAddr) -> serde_json::Value {
    reqwest::get(format!("http://{addr}/api/state"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Poll `/api/state` until nothing is in flight.
async fn settled(addr: SocketAddr) -> serde_json::Value {
    for _ in 0..200 {
        let s = state(addr).await;
        if s["pending"] == false {
            return s;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("requests never settled");
}

#[tokio::test]
async fn initial_page_has_static_panels_only() {
    let addr = start(Canned::ok("unused"), ServerConfig::default()).await;
    let html = reqwest::get(format!("http://{addr}/")).await.unwrap().text().await.unwrap();

    assert!(html.contains("NeuralMath: AI Interpreter for Handwritten Math"));
    assert!(html.contains("How to Use"));
    assert!(!html.contains("<img"));
    assert!(!html.contains("Math Expression Result"));

    let health = reqwest::get(format!("http://{addr}/health")).await.unwrap().text().await.unwrap();
    assert_eq!(health, "ok");
}

#[tokio::test]
async fn preview_is_shown_before_the_request_resolves() {
    let solver = Gated::new("x = 5, derived by subtracting 5 from both sides then dividing by 3.");
    let addr = start(solver.clone(), ServerConfig::default()).await;

    // The 303 is followed to GET /, which must already show the preview.
    let resp = upload(addr, "equation.png", "image/png", PNG_BYTES).await;
    assert!(resp.status().is_success());
    let html = resp.text().await.unwrap();
    assert!(html.contains("src=\"/preview/1\""));
    assert!(html.contains("Solving…"));
    assert!(html.contains("http-equiv=\"refresh\""));

    let preview = reqwest::get(format!("http://{addr}/preview/1")).await.unwrap();
    assert_eq!(preview.headers()["content-type"], "image/png");
    assert_eq!(preview.bytes().await.unwrap().as_ref(), PNG_BYTES);

    solver.release();
    let s = settled(addr).await;
    assert_eq!(s["result"]["state"], "solved");

    let html = reqwest::get(format!("http://{addr}/")).await.unwrap().text().await.unwrap();
    assert!(html.contains(
        "<pre>x = 5, derived by subtracting 5 from both sides then dividing by 3.</pre>"
    ));
    assert!(!html.contains("http-equiv=\"refresh\""));
}

#[tokio::test]
async fn empty_selection_is_a_no_op() {
    let solver = Canned::ok("unused");
    let addr = start(solver.clone(), ServerConfig::default()).await;

    let resp = upload(addr, "", "application/octet-stream", b"").await;
    assert!(resp.status().is_success());

    let s = state(addr).await;
    assert!(s["image"].is_null());
    assert_eq!(s["result"]["state"], "empty");
    assert_eq!(solver.calls(), 0);
}

#[tokio::test]
async fn non_image_file_is_accepted() {
    let solver = Canned::ok("Not a mathematical expression.");
    let addr = start(solver.clone(), ServerConfig::default()).await;

    upload(addr, "notes.txt", "text/plain", b"hello").await;
    let s = settled(addr).await;

    assert_eq!(s["image"]["mime_type"], "text/plain");
    assert_eq!(s["result"]["state"], "solved");
    let seen = solver.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].mime_type, "text/plain");
    assert_eq!(seen[0].decode().unwrap(), b"hello");
}

#[tokio::test]
async fn inference_failure_shows_error_panel() {
    let solver = Canned::err(
        InferenceError::Network {
            detail: "connection reset".into(),
        }
        .into(),
    );
    let addr = start(solver, ServerConfig::default()).await;

    upload(addr, "equation.png", "image/png", PNG_BYTES).await;
    let s = settled(addr).await;
    assert_eq!(s["result"]["state"], "failed");
    assert_eq!(s["result"]["error"]["kind"], "inference");

    let html = reqwest::get(format!("http://{addr}/")).await.unwrap().text().await.unwrap();
    assert!(html.contains("Could not solve this image"));
    assert!(html.contains("connection reset"));
    assert!(!html.contains("Math Expression Result"));
}

#[tokio::test]
async fn oversized_upload_becomes_read_failure() {
    let solver = Canned::ok("unused");
    let config = ServerConfig {
        max_upload_bytes: 1024,
        ..ServerConfig::default()
    };
    let addr = start(solver.clone(), config).await;

    let big = vec![0u8; 64 * 1024];
    let _ = reqwest::Client::new()
        .post(format!("http://{addr}/upload"))
        .header("content-type", multipart_content_type())
        .body(multipart_body("image", "huge.png", "image/png", &big))
        .send()
        .await;

    let mut s = state(addr).await;
    for _ in 0..100 {
        if s["result"]["state"] != "empty" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        s = state(addr).await;
    }
    assert_eq!(s["result"]["state"], "failed");
    assert_eq!(s["result"]["error"]["kind"], "read_failure");
    assert_eq!(solver.calls(), 0);

    // The UI stays usable afterwards.
    upload(addr, "small.png", "image/png", PNG_BYTES).await;
    let s = settled(addr).await;
    assert_eq!(s["result"]["state"], "solved");
}

#[tokio::test]
async fn retry_requires_reselecting_the_file() {
    let solver = Canned::err(SolveError::MalformedResponse {
        detail: "no text".into(),
    });
    let addr = start(solver.clone(), ServerConfig::default()).await;

    upload(addr, "equation.png", "image/png", PNG_BYTES).await;
    settled(addr).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(solver.calls(), 1, "no automatic retry");

    upload(addr, "equation.png", "image/png", PNG_BYTES).await;
    settled(addr).await;
    assert_eq!(solver.calls(), 2);
}

#[tokio::test]
async fn superseded_preview_is_gone() {
    let addr = start(Canned::ok("x = 5"), ServerConfig::default()).await;

    upload(addr, "a.png", "image/png", PNG_BYTES).await;
    upload(addr, "b.png", "image/png", PNG_BYTES).await;

    let old = reqwest::get(format!("http://{addr}/preview/1")).await.unwrap();
    assert_eq!(old.status(), reqwest::StatusCode::NOT_FOUND);
    let current = reqwest::get(format!("http://{addr}/preview/2")).await.unwrap();
    assert!(current.status().is_success());
}

#[tokio::test]
async fn data_uri_text_field_is_decoded() {
    let solver = Canned::ok("x = 5");
    let addr = start(solver.clone(), ServerConfig::default()).await;

    let resp = upload_text(addr, "data:image/jpeg;base64,/9j/4A==").await;
    assert!(resp.status().is_success());

    let s = settled(addr).await;
    assert_eq!(s["image"]["mime_type"], "image/jpeg");
    assert_eq!(s["result"]["state"], "solved");

    let seen = solver.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].mime_type, "image/jpeg");
    assert_eq!(seen[0].data, "/9j/4A==");
}

#[tokio::test]
async fn malformed_data_uri_is_a_read_failure() {
    let solver = Canned::ok("unused");
    let addr = start(solver.clone(), ServerConfig::default()).await;

    upload_text(addr, "data:image/png;base64,@@@").await;

    let s = state(addr).await;
    assert_eq!(s["result"]["state"], "failed");
    assert_eq!(s["result"]["error"]["kind"], "read_failure");
    assert_eq!(solver.calls(), 0);
}

async fn upload_text(addr: SocketAddr, value: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/upload"))
        .header("content-type", multipart_content_type())
        .body(multipart_text_body("image", value))
        .send()
        .await
        .unwrap()
}
