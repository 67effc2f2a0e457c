use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::script_engine::ScriptEngine;
use crate::adapters::template_store::TemplateStore;
use crate::domain::{Handler, TemplateSet, TemplateUnit, VERBS};

/// Extensions recognized as template files.
pub const TEMPLATE_EXTENSIONS: &[&str] = &["rhai", "json", "yaml", "yml"];

const USE_MOCK_KEY: &str = "useMock";

/// Builds a [`TemplateSet`] from a directory tree.
///
/// `<root>/marketing/bd/storeList.rhai` becomes resource path
/// `marketing/bd/storeList`. A file that fails to load is logged and skipped;
/// the rest of the tree still loads.
pub struct TemplateLoader {
    root: PathBuf,
    engine: Arc<ScriptEngine>,
}

impl TemplateLoader {
    pub fn new(root: impl Into<PathBuf>, engine: Arc<ScriptEngine>) -> Self {
        Self {
            root: root.into(),
            engine,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the template directory and compiles every template file.
    pub fn load(&self) -> Result<TemplateSet> {
        let mut templates = TemplateSet::new();

        if !self.root.is_dir() {
            tracing::warn!(dir = %self.root.display(), "Template directory not found, no templates loaded");
            return Ok(templates);
        }

        let root = self
            .root
            .to_str()
            .ok_or_else(|| anyhow!("Template directory is not valid UTF-8: {}", self.root.display()))?;
        let pattern = format!("{}/**/*", glob::Pattern::escape(root));

        for entry in glob::glob(&pattern)? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Failed to read glob entry: {}", e);
                    continue;
                }
            };
            if !path.is_file() || !self.is_template_file(&path) {
                continue;
            }

            match self.load_file(&path) {
                Ok(unit) => {
                    tracing::debug!(
                        resource = %unit.resource_path,
                        file = %path.display(),
                        verbs = ?unit.verbs(),
                        "Loaded template"
                    );
                    if let Some(previous) = templates.insert(unit.resource_path.clone(), Arc::new(unit)) {
                        tracing::warn!(
                            resource = %previous.resource_path,
                            replaced = %previous.source.display(),
                            by = %path.display(),
                            "Duplicate template resource path"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %format!("{:#}", e), "Failed to load template, skipping");
                }
            }
        }

        tracing::info!(dir = %self.root.display(), count = templates.len(), "Templates loaded");
        Ok(templates)
    }

    /// Reloads the whole tree and publishes it. On failure the store keeps
    /// its previous snapshot.
    pub fn reload_into(&self, store: &TemplateStore) -> Result<usize> {
        let templates = self.load()?;
        let count = templates.len();
        store.replace(templates);
        Ok(count)
    }

    pub fn load_file(&self, path: &Path) -> Result<TemplateUnit> {
        let resource_path = self
            .resource_path(path)
            .ok_or_else(|| anyhow!("{} is outside the template directory", path.display()))?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        match extension(path) {
            Some("rhai") => self.engine.compile_unit(&resource_path, path, &content),
            Some("json") => {
                let document: Value = serde_json::from_str(&content)
                    .with_context(|| format!("JSON parse error in {}", path.display()))?;
                static_unit(resource_path, path, document)
            }
            Some("yaml" | "yml") => {
                let document: Value = serde_yaml::from_str(&content)
                    .with_context(|| format!("YAML parse error in {}", path.display()))?;
                static_unit(resource_path, path, document)
            }
            _ => bail!("Unsupported template file {}", path.display()),
        }
    }

    /// Resource path of a template file: relative to the root, extension
    /// removed, `/`-separated.
    pub fn resource_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?.with_extension("");
        let segments: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        if segments.is_empty() {
            return None;
        }
        Some(segments.join("/"))
    }

    /// A template file has a known extension and no dotfile component below
    /// the root.
    pub fn is_template_file(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        let hidden = relative
            .components()
            .any(|c| c.as_os_str().to_str().map_or(true, |s| s.starts_with('.')));
        !hidden && extension(path).map_or(false, |ext| TEMPLATE_EXTENSIONS.contains(&ext))
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

fn static_unit(resource_path: String, source: &Path, document: Value) -> Result<TemplateUnit> {
    let Value::Object(map) = document else {
        bail!("Template {} must be an object", source.display());
    };

    let mut unit = TemplateUnit::new(resource_path).with_source(source);
    for (key, value) in map {
        if key == USE_MOCK_KEY {
            let flag = value
                .as_bool()
                .ok_or_else(|| anyhow!("`{}` must be a bool in {}", USE_MOCK_KEY, source.display()))?;
            unit = unit.with_use_mock(flag);
            continue;
        }

        let verb = key.to_ascii_lowercase();
        let base = verb.strip_suffix("/:id").unwrap_or(&verb);
        if VERBS.contains(&base) {
            unit = unit.with_handler(&verb, Handler::Static(value));
        } else {
            tracing::debug!(file = %source.display(), key = %key, "Ignoring unknown template key");
        }
    }

    Ok(unit)
}
