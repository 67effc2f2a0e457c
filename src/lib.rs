//! # gproxy - mock-or-forward HTTP gateway
//!
//! gproxy sits between a client and a real service. For every request it
//! decides whether to answer from a local response template or to relay the
//! request to the upstream.
//!
//! ## Features
//!
//! - **Hierarchical templates**: a template directory tree maps onto request
//!   paths; `useMock` flags are inherited by sub-paths
//! - **Scripted and static templates**: Rhai scripts or mockjs-style JSON/YAML
//! - **Proxy prefix fallback**: a 404 through `/proxy` is retried once on the
//!   bare path
//! - **Hot reload**: templates and the `.env` file are watched
//! - **Metrics**: Prometheus metrics for monitoring
//! - **Health Checks**: Kubernetes-ready health endpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gproxy::{config::Settings, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_file("gproxy.toml".as_ref())?;
//!     let gateway = Gateway::build(&settings)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, gateway.router()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Domain**: request descriptors, template units, the upstream port
//! - **Adapters**: resolver, forwarder, loaders and HTTP handlers
//! - **Config**: settings, `.env` overrides and the file watcher

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;

use crate::adapters::admin_handler::{self, AdminState};
use crate::adapters::health_handler::HealthHandler;
use crate::adapters::metrics_handler::{MetricsCollector, MetricsHandler};
use crate::adapters::mock_resolver::MockResolver;
use crate::adapters::proxy_handler::ProxyHandler;
use crate::adapters::request_logger;
use crate::adapters::script_engine::ScriptEngine;
use crate::adapters::static_routes::StaticRoutes;
use crate::adapters::template_loader::TemplateLoader;
use crate::adapters::template_store::TemplateStore;
use crate::adapters::upstream_forwarder::UpstreamForwarder;
use crate::config::{FileWatcher, Settings, SharedRuntime};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;

/// Handlers shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ProxyHandler>,
    pub health: Arc<HealthHandler>,
    pub metrics: Arc<MetricsHandler>,
    pub admin: AdminState,
    pub admin_prefix: String,
}

/// Creates the Axum application router.
///
/// Health, metrics and admin routes are matched first; every other request
/// falls through to the proxy handler.
pub fn create_app(state: AppState) -> Router {
    let health_handler = state.health.clone();
    let metrics_handler = state.metrics.clone();

    let public_router = Router::new()
        // Health check endpoints
        .route("/health", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.health().await }
            }
        }))
        .route("/health/ready", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.ready().await }
            }
        }))
        .route("/health/live", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.live().await }
            }
        }))
        // Metrics endpoint
        .route("/metrics", get({
            let handler = metrics_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.metrics().await }
            }
        }));

    let admin_router = Router::new()
        .route("/templates", get(admin_handler::list_templates))
        .route("/templates/reload", post(admin_handler::reload_templates))
        .route("/settings", get(admin_handler::get_settings))
        .with_state(state.admin.clone());

    let router = public_router.nest(&state.admin_prefix, admin_router).layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    // Everything else is mocked or forwarded; CORS there echoes the caller
    let proxy_router = Router::new()
        .fallback(ProxyHandler::handle)
        .with_state(state.proxy.clone());

    router
        .merge(proxy_router)
        .layer(axum::middleware::from_fn(request_logger::log_requests))
}

/// Fully wired gateway. The watcher is built but not started.
pub struct Gateway {
    pub state: AppState,
    pub loader: Arc<TemplateLoader>,
    pub store: Arc<TemplateStore>,
    pub routes: Arc<StaticRoutes>,
    pub runtime: SharedRuntime,
    pub watcher: FileWatcher,
}

impl Gateway {
    /// Loads templates and static routes and wires every component from
    /// `settings`.
    pub fn build(settings: &Settings) -> anyhow::Result<Self> {
        let engine = Arc::new(ScriptEngine::new(settings.mock.script_max_operations));
        let loader = Arc::new(TemplateLoader::new(settings.mock.templates_dir.clone(), engine.clone()));
        let store = Arc::new(TemplateStore::with_templates(loader.load()?));

        let routes = Arc::new(StaticRoutes::from_config(&settings.static_routes));
        let from_files = routes.load_dir(&settings.mock.routes_dir)?;
        tracing::info!(
            configured = settings.static_routes.len(),
            from_files,
            "Static routes registered"
        );

        let runtime = settings.shared_runtime();
        let collector = Arc::new(MetricsCollector::new()?);
        let forwarder = UpstreamForwarder::new(&settings.upstream)?.with_metrics(collector.clone());
        let resolver = Arc::new(MockResolver::new(store.clone(), routes.clone(), engine));

        let proxy = ProxyHandler::new(
            resolver,
            Arc::new(forwarder),
            runtime.clone(),
            &settings.upstream.proxy_prefix,
            settings.server.max_body_bytes,
        )
        .with_metrics(collector.clone());

        let state = AppState {
            proxy: Arc::new(proxy),
            health: Arc::new(HealthHandler::new(runtime.clone(), store.clone())),
            metrics: Arc::new(MetricsHandler::new(collector, store.clone())),
            admin: AdminState {
                loader: loader.clone(),
                store: store.clone(),
                runtime: runtime.clone(),
            },
            admin_prefix: settings.server.admin_prefix.clone(),
        };

        let watcher = FileWatcher::new(
            settings.hot_reload.env_file.clone(),
            Duration::from_millis(settings.hot_reload.debounce_ms),
            loader.clone(),
            store.clone(),
            runtime.clone(),
        );

        Ok(Self {
            state,
            loader,
            store,
            routes,
            runtime,
            watcher,
        })
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }
}
