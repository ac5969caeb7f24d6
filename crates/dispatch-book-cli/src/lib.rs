//! HTTP endpoint for dispatch-book
//!
//! Serves the save form and accepts its posts:
//!
//! - `POST /save_data`: apply a save request, always answered with HTTP 200
//!   and `{success, message}`
//! - `GET /view_data`: status of the running service
//! - `GET /`: `index.html` from the static directory

pub mod server;

pub use server::{router, serve, AppState, ServerConfig};
