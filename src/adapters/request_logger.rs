use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::Instrument;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Short id used to correlate the log lines of one request.
pub fn request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Logs one line per request at a level chosen by the response status and
/// tags the response with `x-request-id`.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let id = request_id();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let span = tracing::info_span!("request", id = %id);
    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    span.in_scope(|| {
        if status.is_server_error() {
            tracing::error!(%method, %uri, status = status.as_u16(), elapsed_ms, "Request completed");
        } else if status.is_client_error() {
            tracing::warn!(%method, %uri, status = status.as_u16(), elapsed_ms, "Request completed");
        } else {
            tracing::info!(%method, %uri, status = status.as_u16(), elapsed_ms, "Request completed");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
