//! HTTP API 서버 (axum)
//!
//! 세션 하나를 Mutex로 공유하며, 기본 포트는 8501입니다.

mod error;
mod handlers;
mod router;

pub use error::ApiError;
pub use router::router;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::session::RagSession;

/// 공유 서버 상태
pub struct AppState {
    pub session: Mutex<RagSession>,
}

impl AppState {
    pub fn new(session: RagSession) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
        })
    }
}

/// 서버 실행 (Ctrl-C로 종료)
pub async fn serve(config: AppConfig) -> Result<()> {
    let bind_addr = config.bind_address();
    let session = RagSession::open(config).await?;
    let state = AppState::new(session);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::knowledge::RecordStore;

    const PAYROLL_CSV: &str = "Sl,Agent Name,Organization,Net Pay\n\
        10234,Rahim Uddin,Dhaka North,15200\n\
        10235,Karim,Sylhet Branch,9800\n";

    async fn test_state(dir: &TempDir) -> Arc<AppState> {
        let config = AppConfig {
            data_dir: dir.path().join("data"),
            ..AppConfig::default()
        };
        let store = RecordStore::open(&config.records_db_path()).unwrap();
        let session = RagSession::with_components(config, store, None, None)
            .await
            .unwrap();
        AppState::new(session)
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn load_payroll(dir: &TempDir, state: &Arc<AppState>) -> Value {
        let path = dir.path().join("payroll.csv");
        std::fs::write(&path, PAYROLL_CSV).unwrap();
        let (status, body) = send(state, post_json("/api/files/load", serde_json::json!({ "paths": [path] }))).await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let (status, body) = send(&state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_load_and_query() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let body = load_payroll(&dir, &state).await;
        assert_eq!(body["record_count"], 2);
        assert_eq!(body["reports"][0]["status"], "success");
        assert_eq!(body["reports"][0]["file_id"], "file_1");

        let (status, body) = send(
            &state,
            post_json("/api/query", serde_json::json!({ "question": "Organization of 10235?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "field_value");
        assert_eq!(
            body["answer"],
            "The Organization of 10235 is Sylhet Branch.\n\n(Source: payroll.csv)"
        );

        let (_, body) = send(&state, get("/api/history")).await;
        assert_eq!(body["history"].as_array().unwrap().len(), 2);
        assert_eq!(body["history"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_query_validation() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let (status, body) = send(&state, post_json("/api/query", serde_json::json!({ "question": "   " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_summary_request_via_query() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        load_payroll(&dir, &state).await;

        let (_, body) = send(&state, post_json("/api/query", serde_json::json!({ "question": "Show All Data" }))).await;
        assert_eq!(body["kind"], "summary");
        assert!(body["answer"]
            .as_str()
            .unwrap()
            .starts_with("**Total Records Loaded: 2**"));

        let (_, body) = send(&state, get("/api/summary")).await;
        assert!(body["summary"].as_str().unwrap().contains("Sample IDs: 10234, 10235"));
    }

    #[tokio::test]
    async fn test_load_empty_directory() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let empty = tempfile::Builder::new().prefix("sheets").tempdir().unwrap();

        let (status, _) = send(
            &state,
            post_json("/api/files/load", serde_json::json!({ "dir": empty.path() })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_records_and_reset() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        load_payroll(&dir, &state).await;

        let (_, files) = send(&state, get("/api/files")).await;
        assert_eq!(files["files"][0]["filename"], "payroll.csv");

        let id = state.session.lock().await.records()[0].id;
        let (status, body) = send(&state, get(&format!("/api/records/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["filename"], "payroll.csv");

        let (status, _) = send(&state, get("/api/records/999999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&state, post_json("/api/reset", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "reset");

        let (_, body) = send(&state, get("/api/status")).await;
        assert_eq!(body["record_count"], 0);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        send(&state, post_json("/api/query", serde_json::json!({ "question": "anything" }))).await;

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/history")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.session.lock().await.history().is_empty());
    }
}
