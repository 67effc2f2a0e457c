use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::cors;
use crate::adapters::metrics_handler::MetricsCollector;
use crate::config::UpstreamSettings;
use crate::domain::{ForwardRequest, UpstreamPort};
use crate::error::GatewayError;

/// Connection-scoped headers that must not be relayed in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Relays requests to the upstream service with at most one fallback retry.
pub struct UpstreamForwarder {
    client: reqwest::Client,
    /// Deadline for the response headers; the relayed body is not bounded
    timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl UpstreamForwarder {
    pub fn new(settings: &UpstreamSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            timeout: Duration::from_millis(settings.timeout_ms),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn send(&self, url: &str, request: &ForwardRequest) -> Result<reqwest::Response, GatewayError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| GatewayError::InvalidRequest(format!("Unsupported method: {}", e)))?;

        let pending = self
            .client
            .request(method, url)
            .headers(outgoing_headers(&request.headers))
            .body(request.body.clone())
            .send();

        let error = match tokio::time::timeout(self.timeout, pending).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(source)) => {
                tracing::error!(url, error = %source, "Upstream request failed");
                GatewayError::Upstream {
                    url: url.to_string(),
                    source,
                }
            }
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::error!(url, timeout_ms, "Upstream request timed out");
                GatewayError::UpstreamTimeout {
                    url: url.to_string(),
                    timeout_ms,
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.upstream_errors.inc();
        }
        Err(error)
    }

    /// Streams the upstream response back with the caller's CORS origin.
    fn relay(&self, upstream: reqwest::Response, origin: Option<&HeaderValue>) -> Response {
        let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = incoming_headers(upstream.headers());

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        cors::apply_origin(response.headers_mut(), origin);
        response
    }
}

#[async_trait]
impl UpstreamPort for UpstreamForwarder {
    async fn forward(&self, target: &str, request: ForwardRequest) -> Result<Response, GatewayError> {
        let mut retried = false;
        let mut path = request.path_and_query.as_str();

        loop {
            let url = join_url(target, path);
            tracing::debug!(method = %request.method, url = %url, "Forwarding upstream");
            let upstream = self.send(&url, &request).await?;

            if upstream.status() == reqwest::StatusCode::NOT_FOUND && !retried {
                if let Some(fallback) = request.fallback.as_deref() {
                    tracing::info!(
                        method = %request.method,
                        url = %url,
                        fallback = %fallback,
                        "Upstream returned 404, retrying without proxy prefix"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.fallback_retries.inc();
                    }
                    // Abandon the first response before the retry
                    drop(upstream);
                    retried = true;
                    path = fallback;
                    continue;
                }
            }

            let status = upstream.status();
            if status.is_client_error() || status.is_server_error() {
                tracing::warn!(method = %request.method, url = %url, status = status.as_u16(), "Upstream error status");
            } else {
                tracing::debug!(method = %request.method, url = %url, status = status.as_u16(), "Upstream responded");
            }
            if let Some(metrics) = &self.metrics {
                metrics
                    .upstream_forwards
                    .with_label_values(&[status.as_str()])
                    .inc();
            }

            return Ok(self.relay(upstream, request.origin()));
        }
    }
}

pub fn join_url(target: &str, path_and_query: &str) -> String {
    let base = target.trim_end_matches('/');
    if path_and_query.starts_with('/') {
        format!("{}{}", base, path_and_query)
    } else {
        format!("{}/{}", base, path_and_query)
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// Request headers for the upstream: `Host` is dropped so the client sets
/// the upstream's own, and the body length is recomputed.
fn outgoing_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = name.as_str();
        if name == "host" || name == "content-length" || is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}

fn incoming_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}
