//! `.env` file overrides.
//!
//! The file is `KEY=VALUE` lines, read with the `config` crate's INI format.
//! Recognized keys: `TARGET_SERVICE_URL`, `MOCK_ENABLED`, `MOCK_DELAY`,
//! `HOT_RELOAD`, `PORT`, `LOG_LEVEL`. Anything else is ignored.

use anyhow::{Context, Result};
use config::{Config, File, FileFormat};
use std::collections::HashMap;
use std::path::Path;

use crate::config::{RuntimeSettings, Settings};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub target_url: Option<String>,
    pub mock_enabled: Option<bool>,
    pub mock_delay_ms: Option<u64>,
    pub hot_reload: Option<bool>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl EnvOverrides {
    pub fn load(path: &Path) -> Result<Self> {
        let values: HashMap<String, String> = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Self::from_pairs(values)
    }

    /// Like [`EnvOverrides::load`], but a missing file is `None`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Builds overrides from key/value pairs. Keys are case-insensitive and
    /// surrounding quotes on values are dropped.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::default();

        for (key, value) in pairs {
            let value = unquote(value.as_ref().trim());
            match key.as_ref().trim().to_ascii_uppercase().as_str() {
                "TARGET_SERVICE_URL" => {
                    overrides.target_url = Some(value.to_string()).filter(|v| !v.is_empty());
                }
                // Only the literal "true" enables mocking
                "MOCK_ENABLED" => overrides.mock_enabled = Some(value == "true"),
                "MOCK_DELAY" => {
                    let delay = value
                        .parse()
                        .with_context(|| format!("MOCK_DELAY must be milliseconds, got '{}'", value))?;
                    overrides.mock_delay_ms = Some(delay);
                }
                // Only the literal "false" disables hot reload
                "HOT_RELOAD" => overrides.hot_reload = Some(value != "false"),
                "PORT" => {
                    let port = value
                        .parse()
                        .with_context(|| format!("PORT must be a port number, got '{}'", value))?;
                    overrides.port = Some(port);
                }
                "LOG_LEVEL" => overrides.log_level = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(overrides)
    }

    /// Overlays every present key onto startup settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(target) = &self.target_url {
            settings.upstream.target_url = Some(target.clone());
        }
        if let Some(enabled) = self.mock_enabled {
            settings.mock.enabled = enabled;
        }
        if let Some(delay) = self.mock_delay_ms {
            settings.mock.delay_ms = delay;
        }
        if let Some(hot_reload) = self.hot_reload {
            settings.hot_reload.enabled = hot_reload;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
    }

    /// Applies the live-reloadable keys and returns the names of those whose
    /// value changed. Absent keys leave the current value alone.
    pub fn apply_runtime(&self, runtime: &mut RuntimeSettings) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if let Some(target) = &self.target_url {
            if runtime.target_url.as_ref() != Some(target) {
                runtime.target_url = Some(target.clone());
                changed.push("TARGET_SERVICE_URL");
            }
        }
        if let Some(enabled) = self.mock_enabled {
            if runtime.mock_enabled != enabled {
                runtime.mock_enabled = enabled;
                changed.push("MOCK_ENABLED");
            }
        }
        if let Some(delay) = self.mock_delay_ms {
            if runtime.mock_delay_ms != delay {
                runtime.mock_delay_ms = delay;
                changed.push("MOCK_DELAY");
            }
        }

        changed
    }

    /// Keys that differ from `previous` but only take effect after a restart.
    pub fn restart_required(&self, previous: &EnvOverrides) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.port.is_some() && self.port != previous.port {
            keys.push("PORT");
        }
        if self.hot_reload.is_some() && self.hot_reload != previous.hot_reload {
            keys.push("HOT_RELOAD");
        }
        if self.log_level.is_some() && self.log_level != previous.log_level {
            keys.push("LOG_LEVEL");
        }
        keys
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> RuntimeSettings {
        RuntimeSettings {
            target_url: Some("http://old".to_string()),
            mock_enabled: false,
            mock_delay_ms: 200,
        }
    }

    #[test]
    fn test_load_env_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# local overrides\nTARGET_SERVICE_URL=\"http://localhost:9000\"\nMOCK_ENABLED=true\nMOCK_DELAY=50\nPORT=8081\nOTHER=ignored\n",
        )
        .unwrap();

        let overrides = EnvOverrides::load(&path).unwrap();
        assert_eq!(overrides.target_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(overrides.mock_enabled, Some(true));
        assert_eq!(overrides.mock_delay_ms, Some(50));
        assert_eq!(overrides.port, Some(8081));
        assert_eq!(overrides.hot_reload, None);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(EnvOverrides::load_optional(&dir.path().join(".env")).unwrap().is_none());
    }

    #[test]
    fn test_flag_semantics() {
        let overrides = EnvOverrides::from_pairs([("MOCK_ENABLED", "yes"), ("HOT_RELOAD", "0")]).unwrap();
        assert_eq!(overrides.mock_enabled, Some(false));
        assert_eq!(overrides.hot_reload, Some(true));

        let overrides = EnvOverrides::from_pairs([("mock_enabled", "'true'"), ("hot_reload", "false")]).unwrap();
        assert_eq!(overrides.mock_enabled, Some(true));
        assert_eq!(overrides.hot_reload, Some(false));
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(EnvOverrides::from_pairs([("MOCK_DELAY", "soon")]).is_err());
        assert!(EnvOverrides::from_pairs([("PORT", "99999")]).is_err());
    }

    #[test]
    fn test_apply_runtime_reports_changes() {
        let mut current = runtime();
        let overrides = EnvOverrides::from_pairs([
            ("TARGET_SERVICE_URL", "http://new"),
            ("MOCK_ENABLED", "false"),
            ("MOCK_DELAY", "0"),
        ])
        .unwrap();

        let changed = overrides.apply_runtime(&mut current);
        assert_eq!(changed, vec!["TARGET_SERVICE_URL", "MOCK_DELAY"]);
        assert_eq!(current.target_url.as_deref(), Some("http://new"));
        assert_eq!(current.mock_delay_ms, 0);
        assert!(!current.mock_enabled);
    }

    #[test]
    fn test_absent_keys_keep_runtime_values() {
        let mut current = runtime();
        let changed = EnvOverrides::default().apply_runtime(&mut current);
        assert!(changed.is_empty());
        assert_eq!(current, runtime());
    }

    #[test]
    fn test_restart_required_keys() {
        let previous = EnvOverrides::from_pairs([("PORT", "3000")]).unwrap();
        let next = EnvOverrides::from_pairs([("PORT", "3001"), ("LOG_LEVEL", "debug")]).unwrap();
        assert_eq!(next.restart_required(&previous), vec!["PORT", "LOG_LEVEL"]);
        assert!(previous.restart_required(&previous).is_empty());
    }
}
