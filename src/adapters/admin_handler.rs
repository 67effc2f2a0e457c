//! Admin API: template inventory, forced reload, live settings.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::adapters::template_loader::TemplateLoader;
use crate::adapters::template_store::TemplateStore;
use crate::config::SharedRuntime;
use crate::error::GatewayError;

#[derive(Clone)]
pub struct AdminState {
    pub loader: Arc<TemplateLoader>,
    pub store: Arc<TemplateStore>,
    pub runtime: SharedRuntime,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Serialize)]
pub struct TemplateSummary {
    pub path: String,
    #[serde(rename = "useMock")]
    pub use_mock: Option<bool>,
    pub verbs: Vec<String>,
    pub source: String,
}

#[derive(Serialize)]
pub struct TemplateInventory {
    pub count: usize,
    pub reloads: u64,
    pub templates: Vec<TemplateSummary>,
}

#[derive(Serialize)]
pub struct ReloadResult {
    pub count: usize,
    pub reloads: u64,
}

pub async fn list_templates(State(state): State<AdminState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    let mut templates: Vec<TemplateSummary> = snapshot
        .values()
        .map(|unit| TemplateSummary {
            path: unit.resource_path.clone(),
            use_mock: unit.use_mock,
            verbs: unit.verbs(),
            source: unit.source.display().to_string(),
        })
        .collect();
    templates.sort_by(|a, b| a.path.cmp(&b.path));

    Json(ApiResponse::success(TemplateInventory {
        count: templates.len(),
        reloads: state.store.reload_count(),
        templates,
    }))
}

pub async fn reload_templates(State(state): State<AdminState>) -> axum::response::Response {
    let AdminState { loader, store, .. } = state;
    let outcome = {
        let store = store.clone();
        tokio::task::spawn_blocking(move || loader.reload_into(&store)).await
    };

    match outcome {
        Ok(Ok(count)) => {
            tracing::info!(templates = count, "Templates reloaded via admin API");
            (
                StatusCode::OK,
                Json(ApiResponse::success(ReloadResult {
                    count,
                    reloads: store.reload_count(),
                })),
            )
                .into_response()
        }
        Ok(Err(e)) => GatewayError::Reload(format!("{:#}", e)).into_response(),
        Err(e) => GatewayError::Reload(e.to_string()).into_response(),
    }
}

pub async fn get_settings(State(state): State<AdminState>) -> impl IntoResponse {
    let runtime = state.runtime.read().await.clone();
    Json(ApiResponse::success(runtime))
}
