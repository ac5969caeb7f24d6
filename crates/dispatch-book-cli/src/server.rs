use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use dispatch_book::{RecordUpdater, SaveResponse};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory holding `index.html`
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: None,
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    updater: Arc<RecordUpdater>,
    store: Arc<str>,
    static_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(updater: RecordUpdater, static_dir: Option<PathBuf>) -> Self {
        let store = updater.describe_store().into();
        Self {
            updater: Arc::new(updater),
            store,
            static_dir,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/save_data", post(save_data))
        .route("/view_data", get(view_data))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn save_data(State(state): State<AppState>, body: Bytes) -> Json<SaveResponse> {
    let updater = state.updater.clone();
    // Store I/O is blocking and serialized by the updater
    let response = tokio::task::spawn_blocking(move || updater.handle_json(&body))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update task failed: {e}");
            SaveResponse::failed(e)
        });
    Json(response)
}

async fn view_data(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "running",
        "message": "Dispatch book service is running",
        "store": &*state.store,
    }))
}

async fn index(State(state): State<AppState>) -> Response {
    let Some(dir) = &state.static_dir else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let path = dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!("cannot read {}: {e}", path.display());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: ServerConfig, updater: RecordUpdater) -> io::Result<()> {
    let state = AppState::new(updater, config.static_dir.clone());
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("listening on {}", listener.local_addr()?);
    tracing::info!("store: {}", state.store);
    if let Some(dir) = &config.static_dir {
        tracing::info!("static files: {}", dir.display());
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
