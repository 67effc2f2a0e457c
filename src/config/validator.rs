use thiserror::Error;

use crate::adapters::static_routes::StaticRouteConfig;
use crate::config::{MockSettings, ServerSettings, Settings, UpstreamSettings};
use crate::domain::VERBS;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        // Validate server settings
        if let Err(e) = Self::validate_server(&settings.server) {
            errors.extend(e);
        }

        // Validate upstream settings
        if let Err(e) = Self::validate_upstream(&settings.upstream) {
            errors.extend(e);
        }

        // Validate mock settings
        if let Err(e) = Self::validate_mock(&settings.mock) {
            errors.extend(e);
        }

        // Validate static routes
        if let Err(e) = Self::validate_static_routes(&settings.static_routes) {
            errors.extend(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(server: &ServerSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if server.host.is_empty() {
            errors.push(ValidationError::MissingField("server.host".to_string()));
        }

        if server.port == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "server.port".to_string(),
                reason: "Port must be greater than 0".to_string(),
            });
        }

        if !server.admin_prefix.starts_with('/') || server.admin_prefix.len() < 2 {
            errors.push(ValidationError::InvalidValue {
                field: "server.admin_prefix".to_string(),
                reason: format!("'{}' must start with '/' and name a path", server.admin_prefix),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_upstream(upstream: &UpstreamSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(target) = &upstream.target_url {
            match reqwest::Url::parse(target) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(ValidationError::InvalidValue {
                    field: "upstream.target_url".to_string(),
                    reason: format!("Unsupported scheme '{}'", url.scheme()),
                }),
                Err(e) => errors.push(ValidationError::InvalidValue {
                    field: "upstream.target_url".to_string(),
                    reason: format!("'{}' is not a valid URL: {}", target, e),
                }),
            }
        }

        if !upstream.proxy_prefix.starts_with('/') || upstream.proxy_prefix == "/" {
            errors.push(ValidationError::InvalidValue {
                field: "upstream.proxy_prefix".to_string(),
                reason: format!("'{}' must start with '/' and name a path", upstream.proxy_prefix),
            });
        }

        if upstream.timeout_ms == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "upstream.timeout_ms".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if upstream.connect_timeout_ms == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "upstream.connect_timeout_ms".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_mock(mock: &MockSettings) -> Result<(), Vec<ValidationError>> {
        if mock.script_max_operations == 0 {
            return Err(vec![ValidationError::InvalidValue {
                field: "mock.script_max_operations".to_string(),
                reason: "Operation budget must be greater than 0".to_string(),
            }]);
        }
        Ok(())
    }

    fn validate_static_routes(routes: &[StaticRouteConfig]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (idx, route) in routes.iter().enumerate() {
            if route.path.trim_matches('/').is_empty() {
                errors.push(ValidationError::MissingField(format!("static_routes[{}].path", idx)));
            }

            if !VERBS.contains(&route.method.to_ascii_lowercase().as_str()) {
                errors.push(ValidationError::InvalidValue {
                    field: format!("static_routes[{}].method", idx),
                    reason: format!("Unknown method '{}'", route.method),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_config() {
        let mut settings = Settings::default();
        settings.upstream.target_url = Some("https://api.example.com".to_string());

        let result = ConfigValidator::validate(&settings);
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;

        let result = ConfigValidator::validate(&settings);
        assert!(result.is_err());
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_invalid_upstream() {
        let mut settings = Settings::default();
        settings.upstream.target_url = Some("ftp://files.example.com".to_string());
        settings.upstream.proxy_prefix = "/".to_string();
        settings.upstream.timeout_ms = 0;

        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert_eq!(errors.len(), 3);

        settings.upstream = UpstreamSettings {
            target_url: Some("not a url".to_string()),
            ..UpstreamSettings::default()
        };
        assert!(ConfigValidator::validate(&settings).is_err());
    }

    #[test]
    fn test_invalid_static_routes() {
        let mut settings = Settings::default();
        settings.static_routes = vec![
            StaticRouteConfig {
                method: "fetch".to_string(),
                path: "users".to_string(),
                response: json!({}),
            },
            StaticRouteConfig {
                method: "GET".to_string(),
                path: "/".to_string(),
                response: json!({}),
            },
        ];

        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingField(_))));
    }
}
