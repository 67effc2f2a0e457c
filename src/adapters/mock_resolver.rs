use serde_json::{Map, Value};
use std::sync::Arc;

use crate::adapters::mock_expander::MockExpander;
use crate::adapters::script_engine::ScriptEngine;
use crate::adapters::static_routes::StaticRoutes;
use crate::adapters::template_store::TemplateStore;
use crate::domain::{id_verb, Handler, MockResponse, RequestDescriptor, TemplateSet};
use crate::error::GatewayError;

/// Where a request was matched, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    StaticExact,
    StaticParam,
    Exact,
    ById,
    Ancestor,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaticExact => "static_exact",
            Self::StaticParam => "static_param",
            Self::Exact => "exact",
            Self::ById => "by_id",
            Self::Ancestor => "ancestor",
        }
    }
}

struct Matched {
    handler: Handler,
    params: Map<String, Value>,
    kind: MatchKind,
    key: String,
}

/// Decides whether a request is mocked and generates the payload.
pub struct MockResolver {
    store: Arc<TemplateStore>,
    routes: Arc<StaticRoutes>,
    engine: Arc<ScriptEngine>,
    expander: MockExpander,
}

impl MockResolver {
    pub fn new(store: Arc<TemplateStore>, routes: Arc<StaticRoutes>, engine: Arc<ScriptEngine>) -> Self {
        Self {
            store,
            routes,
            engine,
            expander: MockExpander::new(),
        }
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    /// Nearest `useMock` declared on `path` or one of its ancestors, else
    /// `default_enabled`.
    pub fn should_mock(&self, path: &str, default_enabled: bool) -> bool {
        should_mock_in(&self.store.snapshot(), path, default_enabled)
    }

    /// Resolves `req` against one store snapshot.
    ///
    /// `Ok(None)` means the request is not mocked and should be forwarded.
    pub fn resolve(&self, req: &RequestDescriptor, default_enabled: bool) -> Result<Option<MockResponse>, GatewayError> {
        let snapshot = self.store.snapshot();

        if !should_mock_in(&snapshot, &req.path, default_enabled) {
            tracing::debug!(path = %req.path, "Mocking disabled for path");
            return Ok(None);
        }

        let Some(matched) = self.find(&snapshot, req) else {
            tracing::debug!(method = %req.method, path = %req.path, "No template matched");
            return Ok(None);
        };

        tracing::debug!(
            method = %req.method,
            path = %req.path,
            matched = matched.kind.as_str(),
            key = %matched.key,
            "Template matched"
        );

        let mut params = req.params.clone();
        params.extend(matched.params);
        let payload = self.generate(&matched.handler, &req.path, params, req)?;
        Ok(Some(MockResponse::from_payload(payload)))
    }

    fn find(&self, snapshot: &TemplateSet, req: &RequestDescriptor) -> Option<Matched> {
        let method = req.method.as_str();
        let path = req.path.as_str();

        // Registered routes, exact then parametric
        if let Some(hit) = self.routes.find(method, path) {
            let kind = if hit.params.is_empty() {
                MatchKind::StaticExact
            } else {
                MatchKind::StaticParam
            };
            return Some(Matched {
                handler: hit.handler,
                params: hit.params,
                kind,
                key: format!("{method}:{path}"),
            });
        }

        // Template at the full path
        if let Some(handler) = snapshot.get(path).and_then(|unit| unit.handler(method)) {
            return Some(Matched {
                handler: handler.clone(),
                params: Map::new(),
                kind: MatchKind::Exact,
                key: path.to_string(),
            });
        }

        // Parent template with a by-id handler
        if let Some((parent, id)) = path.rsplit_once('/') {
            if let Some(handler) = snapshot.get(parent).and_then(|unit| unit.handler(&id_verb(method))) {
                let mut params = Map::new();
                params.insert("id".to_string(), Value::String(id.to_string()));
                return Some(Matched {
                    handler: handler.clone(),
                    params,
                    kind: MatchKind::ById,
                    key: parent.to_string(),
                });
            }
        }

        // Closest ancestor that still has more than one segment
        let mut current = path;
        while let Some((parent, _)) = current.rsplit_once('/') {
            if let Some(handler) = snapshot.get(current).and_then(|unit| unit.handler(method)) {
                return Some(Matched {
                    handler: handler.clone(),
                    params: Map::new(),
                    kind: MatchKind::Ancestor,
                    key: current.to_string(),
                });
            }
            current = parent;
        }

        None
    }

    fn generate(
        &self,
        handler: &Handler,
        path: &str,
        params: Map<String, Value>,
        req: &RequestDescriptor,
    ) -> Result<Value, GatewayError> {
        let params = Value::Object(params);
        let query = Value::Object(req.query.clone());

        match handler {
            Handler::Static(template) => Ok(self.expander.expand(template)),
            Handler::Native(generator) => Ok(generator(&params, &query, &req.body)),
            Handler::Script { ast, function, arity } => self
                .engine
                .call(ast, function, *arity, &params, &query, &req.body)
                .map_err(|e| {
                    tracing::error!(path, function = %function, error = %e, "Template handler failed");
                    GatewayError::Template {
                        path: path.to_string(),
                        message: e.to_string(),
                    }
                }),
        }
    }
}

fn should_mock_in(snapshot: &TemplateSet, path: &str, default_enabled: bool) -> bool {
    let mut current = path;
    loop {
        if let Some(flag) = snapshot.get(current).and_then(|unit| unit.use_mock) {
            tracing::debug!(path, declared_by = current, use_mock = flag, "useMock override");
            return flag;
        }
        match current.rsplit_once('/') {
            Some((parent, _)) => current = parent,
            None => return default_enabled,
        }
    }
}
