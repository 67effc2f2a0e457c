use clap::Parser;
use std::path::PathBuf;

/// gproxy - mock-or-forward HTTP gateway with hot-reloaded templates
#[derive(Parser, Debug, Clone)]
#[command(name = "gproxy", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "GPROXY_CONFIG", default_value = "gproxy.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "GPROXY_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the real service unmatched requests are forwarded to
    #[arg(short, long, env = "TARGET_SERVICE_URL")]
    pub target: Option<String>,

    /// Template root directory
    #[arg(long, env = "GPROXY_TEMPLATES")]
    pub templates: Option<PathBuf>,

    /// Default for paths whose templates do not declare useMock
    #[arg(long, env = "MOCK_ENABLED", num_args = 0..=1, default_missing_value = "true")]
    pub mock_enabled: Option<bool>,

    /// Artificial latency added to mock responses, in milliseconds
    #[arg(long, env = "MOCK_DELAY")]
    pub mock_delay: Option<u64>,

    /// Watch templates and the .env file for changes
    #[arg(long, env = "HOT_RELOAD", num_args = 0..=1, default_missing_value = "true")]
    pub hot_reload: Option<bool>,

    /// Path to the .env file read at startup and watched for changes
    #[arg(long, env = "GPROXY_ENV_FILE")]
    pub env_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}
