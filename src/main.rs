use clap::Parser;
use gproxy::cli::Cli;
use gproxy::config::Settings;
use gproxy::Gateway;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration with CLI overrides
    let settings = Settings::new_with_cli(&cli)?;

    // Initialize tracing with the configured level
    let level = Level::from_str(&settings.logging.level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
    if !settings.logging.level.eq_ignore_ascii_case(level.as_str()) {
        warn!("Unknown log level '{}', using {}", settings.logging.level, level);
    }

    // Settings are loaded before the subscriber exists, so report the
    // .env layer here
    if settings.hot_reload.env_file.is_file() {
        info!(file = %settings.hot_reload.env_file.display(), "Applied .env overrides");
    }

    let host = settings.server.host.clone();
    let port = settings.server.port;
    info!("Starting gproxy on {}:{}", host, port);
    match &settings.upstream.target_url {
        Some(target) => info!("Forwarding unmatched requests to {}", target),
        None => warn!("No upstream target configured, unmatched requests will fail"),
    }
    info!(
        mock_enabled = settings.mock.enabled,
        delay_ms = settings.mock.delay_ms,
        templates = %settings.mock.templates_dir.display(),
        "Mock settings"
    );

    let gateway = Gateway::build(&settings)?;

    // Start file watcher
    if settings.hot_reload.enabled {
        gateway.watcher.start()?;
    } else {
        info!("Hot reload disabled");
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, gateway.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.watcher.stop();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
