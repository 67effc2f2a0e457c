//! Rhai runtime for scripted templates.

use anyhow::{anyhow, Context, Result};
use fake::faker::address::en::CityName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::Rng;
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, Scope, AST};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::adapters::mock_expander::MockExpander;
use crate::domain::{id_verb, Handler, TemplateUnit, VERBS};

/// Name of the top-level flag a script may set.
const USE_MOCK_VAR: &str = "use_mock";
const BY_ID_SUFFIX: &str = "_by_id";

pub const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;

/// Compiles template scripts and invokes their verb functions.
pub struct ScriptEngine {
    engine: Engine,
}

impl ScriptEngine {
    pub fn new(max_operations: u64) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(max_operations);

        // Faker helpers
        engine.register_fn("fake_name", || Name().fake::<String>());
        engine.register_fn("fake_first_name", || FirstName().fake::<String>());
        engine.register_fn("fake_last_name", || LastName().fake::<String>());
        engine.register_fn("fake_email", || SafeEmail().fake::<String>());
        engine.register_fn("fake_word", || Word().fake::<String>());
        engine.register_fn("fake_sentence", || Sentence(3..10).fake::<String>());
        engine.register_fn("fake_paragraph", || Paragraph(1..3).fake::<String>());
        engine.register_fn("fake_city", || CityName().fake::<String>());
        engine.register_fn("fake_phone", || PhoneNumber().fake::<String>());
        engine.register_fn("uuid", || uuid::Uuid::new_v4().to_string());
        engine.register_fn("random_int", |min: i64, max: i64| {
            rand::thread_rng().gen_range(min.min(max)..=min.max(max))
        });
        engine.register_fn("now_ms", || chrono::Utc::now().timestamp_millis());

        let expander = MockExpander::new();
        engine.register_fn(
            "mock",
            move |template: Dynamic| -> Result<Dynamic, Box<EvalAltResult>> {
                let template: Value = rhai::serde::from_dynamic(&template)?;
                rhai::serde::to_dynamic(expander.expand(&template))
            },
        );

        Self { engine }
    }

    /// Compiles `script` and evaluates its top level once to read the
    /// `use_mock` flag.
    pub fn compile_unit(&self, resource_path: &str, source: &Path, script: &str) -> Result<TemplateUnit> {
        let ast = self
            .engine
            .compile(script)
            .with_context(|| format!("Failed to compile {}", source.display()))?;

        let mut scope = Scope::new();
        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| anyhow!("Failed to evaluate {}: {}", source.display(), e))?;

        let use_mock = match scope.get_value::<Dynamic>(USE_MOCK_VAR) {
            Some(flag) => Some(
                flag.as_bool()
                    .map_err(|ty| anyhow!("`{}` must be a bool in {}, got {}", USE_MOCK_VAR, source.display(), ty))?,
            ),
            None => None,
        };

        let ast = Arc::new(ast);
        let mut unit = TemplateUnit::new(resource_path).with_source(source);
        unit.use_mock = use_mock;

        for function in ast.iter_functions() {
            let Some(verb) = verb_for_function(function.name) else {
                continue;
            };
            let arity = function.params.len();
            if arity > 3 {
                tracing::warn!(
                    file = %source.display(),
                    function = function.name,
                    arity,
                    "Verb function takes more than (params, query, body), skipping"
                );
                continue;
            }
            unit = unit.with_handler(
                &verb,
                Handler::Script {
                    ast: ast.clone(),
                    function: function.name.to_string(),
                    arity,
                },
            );
        }

        Ok(unit)
    }

    /// Calls a verb function with as many of `(params, query, body)` as it
    /// declares.
    pub fn call(
        &self,
        ast: &AST,
        function: &str,
        arity: usize,
        params: &Value,
        query: &Value,
        body: &Value,
    ) -> Result<Value> {
        let mut args = Vec::with_capacity(arity);
        for value in [params, query, body].into_iter().take(arity) {
            args.push(serde_json::from_value::<Dynamic>(value.clone())?);
        }

        let mut scope = Scope::new();
        let options = CallFnOptions::new().eval_ast(false);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut scope, ast, function, args)
            .map_err(|e| anyhow!("{}", e))?;

        Ok(serde_json::to_value(&result)?)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPERATIONS)
    }
}

/// `get` -> `get`, `get_by_id` -> `get/:id`; anything else is a helper.
fn verb_for_function(name: &str) -> Option<String> {
    if VERBS.contains(&name) {
        return Some(name.to_string());
    }
    name.strip_suffix(BY_ID_SUFFIX)
        .filter(|verb| VERBS.contains(verb))
        .map(id_verb)
}
