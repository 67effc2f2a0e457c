//! Registry of routes fixed at startup, consulted before the template tree.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::RwLock;

use crate::domain::{normalize_path, Handler};

/// A route declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticRouteConfig {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Clone)]
struct Route {
    method: String,
    path: String,
    segments: Vec<String>,
    handler: Handler,
}

impl Route {
    fn new(method: &str, path: &str, handler: Handler) -> Self {
        let path = normalize_path(path).to_string();
        let segments = path.split('/').map(str::to_string).collect();
        Self {
            method: method.to_ascii_lowercase(),
            path,
            segments,
            handler,
        }
    }

    fn is_parametric(&self) -> bool {
        self.segments.iter().any(|s| s.starts_with(':'))
    }

    /// Matches `path` segment by segment, capturing `:name` segments.
    fn capture(&self, segments: &[&str]) -> Option<Map<String, Value>> {
        if segments.len() != self.segments.len() {
            return None;
        }
        let mut params = Map::new();
        for (pattern, segment) in self.segments.iter().zip(segments) {
            match pattern.strip_prefix(':') {
                Some(name) => {
                    params.insert(name.to_string(), Value::String(segment.to_string()));
                }
                None if pattern == segment => {}
                None => return None,
            }
        }
        Some(params)
    }
}

/// A registry hit: the handler plus captured path parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub handler: Handler,
    pub params: Map<String, Value>,
}

/// Ordered `(method, path) -> handler` registry.
///
/// Independent of the template directory, so it survives template reloads.
#[derive(Debug, Default)]
pub struct StaticRoutes {
    routes: RwLock<Vec<Route>>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(routes: &[StaticRouteConfig]) -> Self {
        let registry = Self::new();
        for route in routes {
            registry.add_template(&route.path, &route.method, Handler::Static(route.response.clone()));
        }
        registry
    }

    /// Loads every `*.json`/`*.yaml`/`*.yml` route file in `dir`. Each file
    /// holds a list of routes. A file that fails to parse is logged and
    /// skipped as a whole. A missing directory adds nothing.
    pub fn load_dir(&self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
        let mut added = 0;
        for entry in glob::glob(&pattern)? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Failed to read glob entry: {}", e);
                    continue;
                }
            };
            if !path.is_file() || !is_route_file(&path) {
                continue;
            }

            match read_route_file(&path) {
                Ok(routes) => {
                    tracing::debug!(file = %path.display(), count = routes.len(), "Loaded route file");
                    for route in routes {
                        self.add_template(&route.path, &route.method, Handler::Static(route.response));
                        added += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %format!("{:#}", e), "Failed to load route file, skipping");
                }
            }
        }
        Ok(added)
    }

    /// Registers a handler. Re-registering the same method and path replaces
    /// the handler without changing its position.
    pub fn add_template(&self, path: &str, method: &str, handler: Handler) {
        let route = Route::new(method, path, handler);
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());

        match routes
            .iter_mut()
            .find(|r| r.method == route.method && r.path == route.path)
        {
            Some(existing) => {
                tracing::debug!(method = %route.method, path = %route.path, "Replacing static route");
                *existing = route;
            }
            None => {
                tracing::debug!(method = %route.method, path = %route.path, "Registered static route");
                routes.push(route);
            }
        }
    }

    /// Exact match first, then the first parametric route (in registration
    /// order) with the same segment count whose literal segments agree.
    pub fn find(&self, method: &str, path: &str) -> Option<RouteMatch> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());

        if let Some(route) = routes.iter().find(|r| r.method == method && r.path == path) {
            return Some(RouteMatch {
                handler: route.handler.clone(),
                params: Map::new(),
            });
        }

        let segments: Vec<&str> = path.split('/').collect();
        routes
            .iter()
            .filter(|r| r.method == method && r.is_parametric())
            .find_map(|r| {
                r.capture(&segments).map(|params| RouteMatch {
                    handler: r.handler.clone(),
                    params,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_route_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml")
    )
}

/// Parses a whole route file before any of its routes are registered.
fn read_route_file(path: &Path) -> Result<Vec<StaticRouteConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content).with_context(|| format!("JSON parse error in {}", path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("YAML parse error in {}", path.display()))
    }
}
