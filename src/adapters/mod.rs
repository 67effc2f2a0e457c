pub mod admin_handler;
pub mod cors;
pub mod health_handler;
pub mod metrics_handler;
pub mod mock_expander;
pub mod mock_resolver;
pub mod proxy_handler;
pub mod request_logger;
pub mod script_engine;
pub mod static_routes;
pub mod template_loader;
pub mod template_store;
pub mod upstream_forwarder;
