use std::collections::HashMap;
use std::sync::Arc;

use super::InterpreterPlugin;
use crate::types::Language;

/// Plugins keyed by the language they implement.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<Language, Arc<dyn InterpreterPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, replacing any earlier one for the same language.
    pub fn register(&mut self, plugin: Arc<dyn InterpreterPlugin>) -> &mut Self {
        self.plugins.insert(plugin.language(), plugin);
        self
    }

    pub fn with(mut self, plugin: Arc<dyn InterpreterPlugin>) -> Self {
        self.register(plugin);
        self
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn InterpreterPlugin>> {
        self.plugins.get(&language).cloned()
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<_> = self.plugins.keys().copied().collect();
        languages.sort_by_key(|l| l.as_str());
        languages
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}
