use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::{TemplateSet, TemplateUnit};

/// Live map of resource path to compiled template.
///
/// Readers take a snapshot and keep it for the whole request; a reload
/// publishes a complete new map in one swap, so no reader ever sees a mix of
/// old and new templates.
pub struct TemplateStore {
    snapshot: ArcSwap<TemplateSet>,
    reloads: AtomicU64,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::with_templates(TemplateSet::new())
    }

    pub fn with_templates(templates: TemplateSet) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(templates),
            reloads: AtomicU64::new(0),
        }
    }

    /// The current set of templates.
    pub fn snapshot(&self) -> Arc<TemplateSet> {
        self.snapshot.load_full()
    }

    pub fn get(&self, resource_path: &str) -> Option<Arc<TemplateUnit>> {
        self.snapshot.load().get(resource_path).cloned()
    }

    /// Publishes `templates` atomically and bumps the reload counter.
    pub fn replace(&self, templates: TemplateSet) {
        let count = templates.len();
        self.snapshot.store(Arc::new(templates));
        let reloads = self.reloads.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(templates = count, reloads, "Published template snapshot");
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful replacements since startup.
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}
