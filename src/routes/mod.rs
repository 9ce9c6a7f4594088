mod health;
mod lessons;

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::services::ServeDir;

use crate::response::json_error;
use crate::state::AppState;

/// Builds the API router. `media_dir` is served under `/media` when images
/// are kept on the local filesystem.
pub fn router(state: AppState, media_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .nest("/health", health::router())
        .nest("/api/health", health::router())
        .nest("/api/lessons", lessons::router());

    if let Some(dir) = media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }

    app.fallback(fallback_handler).with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "endpoint not found").into_response()
}
