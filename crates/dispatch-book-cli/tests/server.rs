//! Router tests, driven without a socket

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use dispatch_book::store::JsonDocument;
use dispatch_book::{Layout, RecordUpdater};
use dispatch_book_cli::{router, AppState};
use pretty_assertions::assert_eq;
use std::path::Path;
use tower::ServiceExt;

fn app(store: &Path, static_dir: Option<&Path>) -> Router {
    let updater = RecordUpdater::json(store, Layout::default());
    router(AppState::new(updater, static_dir.map(Path::to_path_buf)))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn post(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/save_data")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_save_data_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("records.json");

    let (status, body) = send(
        app(&store, None),
        post(r#"{"type":"dispatch","location":"Dibba","quantity":42.5,"dayOfMonth":3}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"success": true, "message": "Saved to the workbook"})
    );

    let doc = JsonDocument::load(&store).unwrap();
    assert_eq!(doc.dispatch["Dibba|3"].quantity, 42.5);
}

#[tokio::test]
async fn test_save_data_failures_are_http_200() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("records.json");

    for body in [
        "this is not json",
        r#"{"type":"dispatch","quantity":1,"dayOfMonth":1}"#,
        r#"{"type":"meter","shipNumber":7,"meter1Final":1,"meter1Previous":0,"date":"2024-05-01"}"#,
    ] {
        let (status, bytes) = send(app(&store, None), post(body)).await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false, "{body}");
        assert!(json["message"].as_str().unwrap().starts_with("Failed to save: "));
    }
    assert!(!store.exists());
}

#[tokio::test]
async fn test_view_data() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("records.json");

    let (status, body) = send(app(&store, None), get("/view_data")).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "running");
    assert_eq!(json["store"], store.display().to_string());
}

#[tokio::test]
async fn test_index_page() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("records.json");

    let (status, _) = send(app(&store, None), get("/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app(&store, Some(dir.path())), get("/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    std::fs::write(dir.path().join("index.html"), "<h1>Dispatch</h1>").unwrap();
    let (status, body) = send(app(&store, Some(dir.path())), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>Dispatch</h1>");
}
