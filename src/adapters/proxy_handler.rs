//! Per-request orchestration: mock first, upstream on a miss.

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::cors;
use crate::adapters::metrics_handler::MetricsCollector;
use crate::adapters::mock_resolver::MockResolver;
use crate::config::SharedRuntime;
use crate::domain::{parse_query, ForwardRequest, RequestDescriptor, UpstreamPort};
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Path carried the proxy prefix; the 404 fallback applies.
    Proxy,
    Direct,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Direct => "direct",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Preflight,
    Mock,
    Forward,
    Error,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Mock => "mock",
            Self::Forward => "forward",
            Self::Error => "error",
        }
    }
}

pub struct ProxyHandler {
    resolver: Arc<MockResolver>,
    upstream: Arc<dyn UpstreamPort>,
    runtime: SharedRuntime,
    metrics: Option<Arc<MetricsCollector>>,
    proxy_prefix: String,
    max_body_bytes: usize,
}

impl ProxyHandler {
    pub fn new(
        resolver: Arc<MockResolver>,
        upstream: Arc<dyn UpstreamPort>,
        runtime: SharedRuntime,
        proxy_prefix: &str,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            resolver,
            upstream,
            runtime,
            metrics: None,
            proxy_prefix: proxy_prefix.trim_end_matches('/').to_string(),
            max_body_bytes,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Axum fallback handler.
    pub async fn handle(State(handler): State<Arc<ProxyHandler>>, request: Request) -> Response {
        handler.serve(request).await
    }

    pub fn mode(&self, path: &str) -> Mode {
        if self.strip_prefix(path).is_some() {
            Mode::Proxy
        } else {
            Mode::Direct
        }
    }

    /// Remainder of `path` after the proxy prefix, if it starts with it as a
    /// whole segment.
    fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.proxy_prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')).then_some(rest)
    }

    pub async fn serve(&self, request: Request) -> Response {
        let started = Instant::now();
        let mode = self.mode(request.uri().path());
        let origin = request.headers().get(header::ORIGIN).cloned();

        let (outcome, response) = if request.method() == Method::OPTIONS {
            (Outcome::Preflight, cors::preflight(request.headers()))
        } else {
            match self.dispatch(mode, request).await {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(mode = mode.as_str(), error = %e, "Request failed");
                    let mut response = e.into_response();
                    cors::apply_origin(response.headers_mut(), origin.as_ref());
                    (Outcome::Error, response)
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .requests_total
                .with_label_values(&[mode.as_str(), outcome.as_str()])
                .inc();
            metrics
                .request_duration
                .with_label_values(&[mode.as_str()])
                .observe(started.elapsed().as_secs_f64());
        }

        response
    }

    async fn dispatch(&self, mode: Mode, request: Request) -> Result<(Outcome, Response), GatewayError> {
        let (parts, body) = request.into_parts();

        if content_length(&parts.headers).is_some_and(|len| len > self.max_body_bytes) {
            return Err(GatewayError::PayloadTooLarge(self.max_body_bytes));
        }
        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| GatewayError::InvalidRequest(format!("Failed to read body: {}", e)))?;

        // One view of the live settings for the whole request
        let runtime = self.runtime.read().await.clone();

        let raw_path = parts.uri.path();
        let mock_path = match mode {
            Mode::Proxy => self.strip_prefix(raw_path).unwrap_or(raw_path),
            Mode::Direct => raw_path,
        };
        let query = parts.uri.query().map(parse_query).unwrap_or_default();
        let descriptor = RequestDescriptor::new(parts.method.as_str(), mock_path)
            .with_query(query)
            .with_body(parse_body(&parts.headers, &bytes));

        if let Some(mock) = self.resolver.resolve(&descriptor, runtime.mock_enabled)? {
            tracing::info!(
                mode = mode.as_str(),
                method = %descriptor.method,
                path = %descriptor.path,
                status = mock.status,
                "Mock hit"
            );
            if let Some(metrics) = &self.metrics {
                metrics.mock_hits.with_label_values(&[descriptor.method.as_str()]).inc();
            }
            if runtime.mock_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(runtime.mock_delay_ms)).await;
            }

            let status = StatusCode::from_u16(mock.status).unwrap_or(StatusCode::OK);
            let mut response = (status, Json(mock.body)).into_response();
            cors::apply_origin(response.headers_mut(), parts.headers.get(header::ORIGIN));
            return Ok((Outcome::Mock, response));
        }

        let target = runtime
            .target_url
            .as_deref()
            .ok_or(GatewayError::UpstreamNotConfigured)?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let fallback = match mode {
            Mode::Proxy => self.strip_prefix(&path_and_query).map(|rest| {
                if rest.starts_with('/') {
                    rest.to_string()
                } else {
                    format!("/{}", rest)
                }
            }),
            Mode::Direct => None,
        };

        let forward = ForwardRequest {
            method: parts.method,
            path_and_query,
            fallback,
            headers: parts.headers,
            body: bytes,
        };
        let response = self.upstream.forward(target, forward).await?;
        Ok((Outcome::Forward, response))
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Body as handed to templates: JSON and form bodies decoded, empty as `{}`,
/// anything else as a string.
pub fn parse_body(headers: &HeaderMap, bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Object(Map::new());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let text = String::from_utf8_lossy(bytes);

    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Value::Object(parse_query(&text));
    }
    if content_type.is_empty() || content_type.contains("json") {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return value;
        }
    }
    Value::String(text.into_owned())
}
