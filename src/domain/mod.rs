use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::response::Response;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::GatewayError;

pub mod template;

pub use template::{id_verb, Handler, NativeGenerator, TemplateSet, TemplateUnit, VERBS};

/// Strips the leading and trailing `/` and anything after `?`.
pub fn normalize_path(raw: &str) -> &str {
    let path = raw.split('?').next().unwrap_or_default();
    path.trim_start_matches('/').trim_end_matches('/')
}

/// A request as seen by the mock resolver.
///
/// `method` is lowercase and `path` is normalized, so `GET /users/42?x=1`
/// becomes `("get", "users/42")` with `x` moved into `query`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: String,
    pub path: String,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Value,
}

impl RequestDescriptor {
    pub fn new(method: &str, raw_path: &str) -> Self {
        let query = raw_path
            .split_once('?')
            .map(|(_, query)| parse_query(query))
            .unwrap_or_default();

        Self {
            method: method.to_ascii_lowercase(),
            path: normalize_path(raw_path).to_string(),
            params: Map::new(),
            query,
            body: Value::Object(Map::new()),
        }
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query.extend(query);
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// Decodes an `a=1&b=two` query or form string into a JSON object of strings.
/// Later duplicates win.
pub fn parse_query(raw: &str) -> Map<String, Value> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), Value::String(decode_component(value)))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

/// Synthesized response produced by a mock hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MockResponse {
    pub status: u16,
    pub body: Value,
}

impl MockResponse {
    /// Consumes the reserved `statusCode` field of an object payload.
    ///
    /// The field never reaches the body. Values outside `100..=599` fall back
    /// to 200.
    pub fn from_payload(mut payload: Value) -> Self {
        let mut status = 200;

        if let Value::Object(map) = &mut payload {
            if let Some(code) = map.remove("statusCode") {
                match code.as_u64().filter(|c| (100..=599).contains(c)) {
                    Some(code) => status = code as u16,
                    None if code.is_null() || code == Value::from(0) => {}
                    None => tracing::warn!(status_code = %code, "Ignoring invalid statusCode in mock payload"),
                }
            }
        }

        Self { status, body: payload }
    }
}

/// Everything the upstream forwarder needs to replay a request.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Path and query exactly as received, e.g. `/proxy/users?page=2`.
    pub path_and_query: String,
    /// Prefix-stripped path and query used for the single 404 fallback
    /// attempt. `None` disables the fallback.
    pub fallback: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    pub fn origin(&self) -> Option<&HeaderValue> {
        self.headers.get(axum::http::header::ORIGIN)
    }
}

/// Port for relaying a request to the real service.
#[async_trait]
pub trait UpstreamPort: Send + Sync {
    async fn forward(&self, target: &str, request: ForwardRequest) -> Result<Response, GatewayError>;
}
