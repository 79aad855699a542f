use crate::Result;
use crate::tpl::ast::TemplateDefinition;
use crate::tpl::lexer::Delimiters;
use crate::tpl::parser;
use dashmap::DashMap;
use std::sync::Arc;

struct CachedTemplate {
    source: String,
    delimiters: Delimiters,
    definition: Arc<TemplateDefinition>,
}

/// Compiled templates by name. An entry is reused only while the source
/// and delimiters it was compiled from are unchanged.
#[derive(Default)]
pub struct TemplateCache {
    entries: DashMap<String, CachedTemplate>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        name: &str,
        source: &str,
        delimiters: Delimiters,
    ) -> Result<Arc<TemplateDefinition>> {
        if let Some(cached) = self.entries.get(name)
            && cached.source == source
            && cached.delimiters == delimiters
        {
            log::debug!("Template cache hit: '{}'", name);
            return Ok(cached.definition.clone());
        }

        let definition = Arc::new(parser::compile_with(name, source, delimiters)?);
        self.entries.insert(
            name.to_string(),
            CachedTemplate {
                source: source.to_string(),
                delimiters,
                definition: definition.clone(),
            },
        );
        Ok(definition)
    }

    pub fn remove(&self, name: &str) {
        self.entries.remove(name);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_until_source_changes() {
        let cache = TemplateCache::new();
        let a = cache.get_or_compile("t", "a$x$", Delimiters::DOLLAR).unwrap();
        let b = cache.get_or_compile("t", "a$x$", Delimiters::DOLLAR).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = cache.get_or_compile("t", "b$x$", Delimiters::DOLLAR).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_compile_errors_are_not_cached() {
        let cache = TemplateCache::new();
        assert!(cache.get_or_compile("bad", "$x", Delimiters::DOLLAR).is_err());
        assert!(cache.is_empty());
    }
}
