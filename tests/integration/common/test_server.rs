use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use futures::StreamExt;
use gproxy::config::Settings;
use gproxy::Gateway;
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// One request as received by the upstream stand-in.
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

type Hits = Arc<Mutex<Vec<Hit>>>;

pub const STALL: Duration = Duration::from_millis(1500);
pub const TRICKLE_CHUNKS: usize = 4;
pub const TRICKLE_GAP: Duration = Duration::from_millis(250);

/// Upstream stand-in. Paths under `/proxy/` and paths containing `gone`
/// answer 404. Paths containing `stall` hold the response headers for
/// [`STALL`]; paths containing `trickle` send [`TRICKLE_CHUNKS`] chunks
/// [`TRICKLE_GAP`] apart. Everything else echoes the request as JSON.
pub struct Upstream {
    pub addr: SocketAddr,
    pub base_url: String,
    hits: Hits,
}

impl Upstream {
    pub async fn start() -> Self {
        let hits: Hits = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().fallback(record).with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            base_url: format!("http://{}", addr),
            hits,
        }
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

async fn record(
    State(hits): State<Hits>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    hits.lock().unwrap().push(Hit {
        method: method.to_string(),
        path_and_query: path_and_query.clone(),
        headers,
        body: body.clone(),
    });

    if uri.path().contains("stall") {
        tokio::time::sleep(STALL).await;
    }
    if uri.path().contains("trickle") {
        let chunks = futures::stream::iter(0..TRICKLE_CHUNKS).then(|i| async move {
            tokio::time::sleep(TRICKLE_GAP).await;
            Ok::<_, std::io::Error>(Bytes::from(format!("chunk{};", i)))
        });
        return (StatusCode::OK, Body::from_stream(chunks)).into_response();
    }

    let status = if uri.path().starts_with("/proxy/") || uri.path().contains("gone") {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };

    (
        status,
        [("x-upstream", "yes")],
        Json(json!({
            "method": method.as_str(),
            "path": path_and_query,
            "host": host,
            "body": String::from_utf8_lossy(&body),
        })),
    )
        .into_response()
}

/// A gateway listening on an ephemeral port with its own template directory.
pub struct TestServer {
    pub base_url: String,
    pub gateway: Gateway,
    pub dir: TempDir,
}

impl TestServer {
    /// Starts a gateway over `templates` (relative path, content) with mocking
    /// on by default and no delay. `configure` adjusts settings before build.
    pub async fn start(templates: &[(&str, &str)], configure: impl FnOnce(&mut Settings)) -> Self {
        let dir = TempDir::new().unwrap();
        write_templates(&dir.path().join("templates"), templates);

        let mut settings = Settings::default();
        settings.mock.enabled = true;
        settings.mock.delay_ms = 0;
        settings.mock.templates_dir = dir.path().join("templates");
        settings.mock.routes_dir = dir.path().join("routes");
        settings.hot_reload.env_file = dir.path().join(".env");
        settings.hot_reload.debounce_ms = 50;
        configure(&mut settings);

        let gateway = Gateway::build(&settings).unwrap();
        let app = gateway.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            gateway,
            dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.dir.path().join("templates")
    }
}

pub fn write_templates(root: &Path, files: &[(&str, &str)]) {
    std::fs::create_dir_all(root).unwrap();
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
