use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::collector::{CollectorConfig, SheetCollector};
use crate::session::is_summary_request;

use super::error::ApiError;
use super::AppState;

// ============================================================================
// Health / Status
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let session = state.session.lock().await;
    let status = session.status().await?;
    Ok(Json(status))
}

// ============================================================================
// Files
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoadRequest {
    /// 처리할 파일 목록 (지정하면 dir은 무시)
    pub paths: Vec<PathBuf>,
    /// 스프레드시트를 찾을 디렉토리 (기본: 작업 디렉토리)
    pub dir: Option<PathBuf>,
    pub recursive: bool,
}

pub async fn load_files(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let paths = if request.paths.is_empty() {
        let dir = match request.dir {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(ApiError::internal)?,
        };
        if !dir.is_dir() {
            return Err(ApiError::BadRequest(format!("Not a directory: {}", dir.display())));
        }

        let collector = SheetCollector::new(CollectorConfig {
            recursive: request.recursive,
            ..CollectorConfig::default()
        });
        collector
            .collect_directory(&dir)?
            .into_iter()
            .map(|file| file.path)
            .collect()
    } else {
        request.paths
    };

    if paths.is_empty() {
        return Err(ApiError::BadRequest("No spreadsheet files found".to_string()));
    }

    let mut session = state.session.lock().await;
    let reports = session.process_files(&paths).await?;

    Ok(Json(json!({
        "reports": reports,
        "record_count": session.record_count(),
    })))
}

pub async fn list_files(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(json!({ "files": session.reports() }))
}

pub async fn get_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(json!({ "summary": session.data_summary() }))
}

pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(record_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session.lock().await;
    match session.get_record(record_id)? {
        Some(stored) => Ok(Json(stored)),
        None => Err(ApiError::NotFound(format!("Record {} not found", record_id))),
    }
}

// ============================================================================
// Query / History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    let mut session = state.session.lock().await;

    if is_summary_request(question) {
        return Ok(Json(json!({
            "question": question,
            "answer": session.data_summary(),
            "kind": "summary",
            "sources": [],
        })));
    }

    let answer = session.query(question).await;
    Ok(Json(json!({
        "question": question,
        "answer": answer.text,
        "kind": answer.kind,
        "sources": answer.sources,
    })))
}

pub async fn get_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(json!({ "history": session.history() }))
}

pub async fn clear_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.session.lock().await.reset_chat();
    Json(json!({ "status": "cleared" }))
}

pub async fn reset(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    state.session.lock().await.clear_all().await?;
    Ok(Json(json!({ "status": "reset" })))
}
