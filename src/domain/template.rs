//! Compiled template units and their per-verb handlers.

use rhai::AST;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// HTTP verbs a template may answer, as lowercase keys.
pub const VERBS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

/// Key of the single-resource-by-id handler for `method`, e.g. `get/:id`.
pub fn id_verb(method: &str) -> String {
    format!("{}/:id", method.to_ascii_lowercase())
}

/// Generator implemented in Rust: `(params, query, body) -> payload`.
pub type NativeGenerator = dyn Fn(&Value, &Value, &Value) -> Value + Send + Sync;

/// How a verb produces its payload.
#[derive(Clone)]
pub enum Handler {
    /// A function in a compiled Rhai script.
    Script {
        ast: Arc<AST>,
        function: String,
        arity: usize,
    },
    /// A structural template, expanded by the mock expander on every call.
    Static(Value),
    Native(Arc<NativeGenerator>),
}

impl Handler {
    pub fn native<F>(generator: F) -> Self
    where
        F: Fn(&Value, &Value, &Value) -> Value + Send + Sync + 'static,
    {
        Self::Native(Arc::new(generator))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Script { .. } => "script",
            Self::Static(_) => "static",
            Self::Native(_) => "native",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script { function, arity, .. } => f
                .debug_struct("Script")
                .field("function", function)
                .field("arity", arity)
                .finish(),
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Native(_) => f.write_str("Native"),
        }
    }
}

/// One template file, compiled. Immutable once published to the store.
#[derive(Debug, Clone)]
pub struct TemplateUnit {
    pub resource_path: String,
    /// `None` defers to the ancestor chain and then the global default.
    pub use_mock: Option<bool>,
    pub handlers: HashMap<String, Handler>,
    pub source: PathBuf,
}

impl TemplateUnit {
    pub fn new(resource_path: impl Into<String>) -> Self {
        Self {
            resource_path: resource_path.into(),
            use_mock: None,
            handlers: HashMap::new(),
            source: PathBuf::new(),
        }
    }

    pub fn with_use_mock(mut self, use_mock: bool) -> Self {
        self.use_mock = Some(use_mock);
        self
    }

    pub fn with_handler(mut self, verb: &str, handler: Handler) -> Self {
        self.handlers.insert(verb.to_ascii_lowercase(), handler);
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    pub fn handler(&self, verb: &str) -> Option<&Handler> {
        self.handlers.get(verb)
    }

    /// Verb keys in a stable order.
    pub fn verbs(&self) -> Vec<String> {
        let mut verbs: Vec<String> = self.handlers.keys().cloned().collect();
        verbs.sort();
        verbs
    }
}

/// Snapshot contents: resource path to unit.
pub type TemplateSet = HashMap<String, Arc<TemplateUnit>>;
