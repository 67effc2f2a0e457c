//! Request-scoped gateway errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors raised while serving a single request.
///
/// Every variant is converted to a JSON response at the request boundary;
/// none of them escape the serving loop.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A template handler failed at runtime
    #[error("Template handler failed for '{path}': {message}")]
    Template { path: String, message: String },

    /// Network-level failure talking to the upstream (refused, DNS, reset)
    #[error("Upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream did not send response headers in time
    #[error("Upstream request to {url} timed out after {timeout_ms}ms")]
    UpstreamTimeout { url: String, timeout_ms: u64 },

    /// Mock missed and there is nowhere to forward to
    #[error("No upstream target configured")]
    UpstreamNotConfigured,

    /// The incoming request could not be read
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Template reload failed as a whole
    #[error("Template reload failed: {0}")]
    Reload(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::Template { .. } => "Mock template failed",
            Self::Upstream { .. } => "Upstream request failed",
            Self::UpstreamTimeout { .. } => "Upstream request timed out",
            Self::UpstreamNotConfigured => "Upstream target not configured",
            Self::InvalidRequest(_) => "Invalid request",
            Self::PayloadTooLarge(_) => "Request body too large",
            Self::Reload(_) => "Template reload failed",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.message(),
            "error": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
