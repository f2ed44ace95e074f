//! Name-keyed module factory registry with plugin discovery.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use super::Module;

/// Factory producing a fresh [`Module`] instance per graph node.
pub type ModuleFactory = Arc<dyn Fn() -> Module + Send + Sync>;

/// Failure reported by a plugin while enumerating its modules.
#[derive(Debug, Error, Diagnostic)]
#[error("plugin {plugin} failed to load: {reason}")]
#[diagnostic(
    code(visionflow::registry::plugin),
    help("The plugin is skipped; remaining plugins still load.")
)]
pub struct PluginError {
    pub plugin: String,
    pub reason: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

/// Extension point exposing additional module factories.
///
/// A plugin that errors is skipped with a logged reason; it never aborts the
/// discovery pass.
pub trait ModulePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Enumerate `(display name, factory)` pairs this plugin contributes.
    fn modules(&self) -> Result<Vec<(String, ModuleFactory)>, PluginError>;
}

/// Central display-name → factory lookup used by graph builders to
/// instantiate modules from persisted type tags.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    entries: FxHashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a display name. Last registration wins; an
    /// overwrite is logged but never an error.
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory) {
        let name = name.into();
        if self.entries.insert(name.clone(), factory).is_some() {
            tracing::warn!(name = %name, "module registration overwritten");
        }
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ModuleFactory> {
        self.entries.get(name).cloned()
    }

    /// Build a fresh module for the given display name.
    #[must_use]
    pub fn instantiate(&self, name: &str) -> Option<Module> {
        self.resolve(name).map(|factory| factory())
    }

    /// Registered display names, sorted for stable listings.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discover and register modules from external plugins.
    ///
    /// Each factory is smoke-checked by constructing one instance and
    /// confirming it declares a usable port surface; factories that fail the
    /// check are skipped with a logged reason. Returns the display names that
    /// were actually registered.
    pub fn load_plugins(&mut self, plugins: &[Box<dyn ModulePlugin>]) -> Vec<String> {
        let mut loaded = Vec::new();
        for plugin in plugins {
            let modules = match plugin.modules() {
                Ok(modules) => modules,
                Err(err) => {
                    tracing::error!(plugin = %plugin.name(), error = %err, "plugin skipped");
                    continue;
                }
            };
            for (name, factory) in modules {
                let probe = factory();
                if probe.ports().inputs.is_empty() && probe.ports().outputs.is_empty() {
                    tracing::error!(
                        plugin = %plugin.name(),
                        module = %name,
                        "plugin module declares no ports; skipped"
                    );
                    continue;
                }
                if self.entries.contains_key(&name) {
                    tracing::warn!(
                        plugin = %plugin.name(),
                        module = %name,
                        "plugin module name already registered; skipped"
                    );
                    continue;
                }
                self.register(name.clone(), factory);
                loaded.push(name);
            }
        }
        if !loaded.is_empty() {
            tracing::info!(count = loaded.len(), "plugin modules registered");
        }
        loaded
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("entries", &self.names())
            .finish()
    }
}
