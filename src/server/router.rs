use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// API 라우터
///
/// - `/health`, `/api/status`
/// - 파일 처리: `/api/files/load`, `/api/files`, `/api/summary`, `/api/records/:id`
/// - 질의: `/api/query`, `/api/history`, `/api/reset`
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::get_status))
        .route("/api/files/load", post(handlers::load_files))
        .route("/api/files", get(handlers::list_files))
        .route("/api/summary", get(handlers::get_summary))
        .route("/api/records/:record_id", get(handlers::get_record))
        .route("/api/query", post(handlers::query))
        .route(
            "/api/history",
            get(handlers::get_history).delete(handlers::clear_history),
        )
        .route("/api/reset", post(handlers::reset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
