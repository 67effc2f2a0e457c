use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod env_file;
pub mod validator;
pub mod watcher;

pub use env_file::EnvOverrides;
pub use watcher::FileWatcher;

use crate::adapters::static_routes::StaticRouteConfig;
use crate::cli::Cli;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub mock: MockSettings,
    #[serde(default)]
    pub hot_reload: HotReloadSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Routes answered before the template tree is consulted
    #[serde(default)]
    pub static_routes: Vec<StaticRouteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Mount point of the admin API
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,
    /// Request bodies larger than this are rejected
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_prefix: default_admin_prefix(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_admin_prefix() -> String {
    "/_gproxy".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamSettings {
    /// Base URL of the real service; unmatched requests fail without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    /// Path marker that enables the 404 fallback retry
    #[serde(default = "default_proxy_prefix")]
    pub proxy_prefix: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            target_url: None,
            proxy_prefix: default_proxy_prefix(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_proxy_prefix() -> String {
    "/proxy".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockSettings {
    /// Default for paths whose templates do not declare `useMock`
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_routes_dir")]
    pub routes_dir: PathBuf,
    /// Upper bound on operations per script evaluation
    #[serde(default = "default_script_max_operations")]
    pub script_max_operations: u64,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: default_delay_ms(),
            templates_dir: default_templates_dir(),
            routes_dir: default_routes_dir(),
            script_max_operations: default_script_max_operations(),
        }
    }
}

fn default_delay_ms() -> u64 {
    200
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_routes_dir() -> PathBuf {
    PathBuf::from("routes")
}

fn default_script_max_operations() -> u64 {
    crate::adapters::script_engine::DEFAULT_MAX_OPERATIONS
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotReloadSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    /// Quiet period before a burst of file events triggers one reload
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for HotReloadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            env_file: default_env_file(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_debounce_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The part of the settings that may change while the server runs.
///
/// Handlers read it once per request; `.env` reloads replace fields in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeSettings {
    pub target_url: Option<String>,
    pub mock_enabled: bool,
    pub mock_delay_ms: u64,
}

pub type SharedRuntime = Arc<RwLock<RuntimeSettings>>;

impl Settings {
    /// Create settings from CLI arguments: defaults, then the config file,
    /// then the `.env` file, then CLI flags and environment variables.
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let mut settings = Self::from_file(&cli.config)?;

        if let Some(env_file) = &cli.env_file {
            settings.hot_reload.env_file = env_file.clone();
        }
        if let Some(overrides) = EnvOverrides::load_optional(&settings.hot_reload.env_file)? {
            overrides.apply(&mut settings);
        }

        // Apply CLI overrides (CLI > env vars > .env > config file)
        settings.apply_cli_overrides(cli);

        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overlaid with `path` if it exists. Not validated.
    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let s = Config::builder()
            .add_source(File::from(path).required(false))
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .build()?;

        Ok(s.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                error_messages.join("\n")
            )
        })
    }

    /// Apply CLI argument overrides to settings
    fn apply_cli_overrides(&mut self, cli: &Cli) {
        // Server overrides
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }

        // Upstream and mock overrides
        if let Some(target) = &cli.target {
            self.upstream.target_url = Some(target.clone()).filter(|t| !t.is_empty());
        }
        if let Some(templates) = &cli.templates {
            self.mock.templates_dir = templates.clone();
        }
        if let Some(enabled) = cli.mock_enabled {
            self.mock.enabled = enabled;
        }
        if let Some(delay) = cli.mock_delay {
            self.mock.delay_ms = delay;
        }

        if let Some(hot_reload) = cli.hot_reload {
            self.hot_reload.enabled = hot_reload;
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
    }

    pub fn runtime(&self) -> RuntimeSettings {
        RuntimeSettings {
            target_url: self.upstream.target_url.clone(),
            mock_enabled: self.mock.enabled,
            mock_delay_ms: self.mock.delay_ms,
        }
    }

    pub fn shared_runtime(&self) -> SharedRuntime {
        Arc::new(RwLock::new(self.runtime()))
    }
}
