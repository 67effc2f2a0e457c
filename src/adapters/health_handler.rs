use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adapters::template_store::TemplateStore;
use crate::config::SharedRuntime;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub templates_loaded: usize,
    pub template_reloads: u64,
}

pub struct HealthHandler {
    runtime: SharedRuntime,
    store: Arc<TemplateStore>,
    start_time: std::time::Instant,
}

impl HealthHandler {
    pub fn new(runtime: SharedRuntime, store: Arc<TemplateStore>) -> Self {
        Self {
            runtime,
            store,
            start_time: std::time::Instant::now(),
        }
    }

    /// Basic health check - returns 200 if server is running
    pub async fn health(&self) -> impl IntoResponse {
        let status = HealthStatus {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            templates_loaded: self.store.len(),
            template_reloads: self.store.reload_count(),
        };

        (StatusCode::OK, Json(status))
    }

    /// Readiness check - ready once there is something to answer with:
    /// a loaded template or an upstream to forward to
    pub async fn ready(&self) -> impl IntoResponse {
        let has_upstream = self.runtime.read().await.target_url.is_some();

        if has_upstream || !self.store.is_empty() {
            (StatusCode::OK, Json(serde_json::json!({
                "status": "ready",
                "message": "Server is ready to accept requests"
            })))
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({
                "status": "not_ready",
                "message": "No templates loaded and no upstream target configured"
            })))
        }
    }

    /// Liveness check - returns 200 if server is alive
    pub async fn live(&self) -> impl IntoResponse {
        (StatusCode::OK, Json(serde_json::json!({
            "status": "alive",
            "message": "Server is alive"
        })))
    }
}
