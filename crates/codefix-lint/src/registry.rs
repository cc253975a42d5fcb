//! Lookup from [`Language`] to its adapter.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapter::LinterAdapter;
use crate::adapters::{
    CssAdapter, GoAdapter, HtmlAdapter, JavaAdapter, JavaScriptAdapter, PythonAdapter, RustAdapter,
    YamlAdapter,
};
use crate::language::Language;

/// Fixed set of adapters, selected by language.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Language, Arc<dyn LinterAdapter>>,
}

impl AdapterRegistry {
    /// Registry with no adapters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in adapter for every supported language.
    pub fn builtin() -> Self {
        Self::empty()
            .with_adapter(Arc::new(PythonAdapter))
            .with_adapter(Arc::new(JavaScriptAdapter))
            .with_adapter(Arc::new(GoAdapter))
            .with_adapter(Arc::new(RustAdapter))
            .with_adapter(Arc::new(YamlAdapter))
            .with_adapter(Arc::new(HtmlAdapter))
            .with_adapter(Arc::new(CssAdapter))
            .with_adapter(Arc::new(JavaAdapter))
    }

    /// Register `adapter`, replacing any adapter for the same language.
    pub fn with_adapter(mut self, adapter: Arc<dyn LinterAdapter>) -> Self {
        self.adapters.insert(adapter.language(), adapter);
        self
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn LinterAdapter>> {
        self.adapters.get(&language).cloned()
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.adapters.keys().copied()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("languages", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
