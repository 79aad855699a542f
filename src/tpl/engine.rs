use crate::Result;
use crate::error::TemplateError;
use crate::format::FormatterRegistry;
use crate::group::{NoTemplates, TemplateRegistry};
use crate::tpl::activation::{ActivationId, Activations};
use crate::tpl::ast::TemplateDefinition;
use crate::tpl::cache::TemplateCache;
use crate::tpl::lexer::Delimiters;
use crate::tpl::render::Evaluator;
use crate::tpl::render_context::{RenderContext, RenderOptions};
use crate::tpl::writer::TemplateWriter;
use std::sync::Arc;

/// Outcome of a render that did not fail fatally.
#[derive(Debug)]
pub struct Rendered {
    /// Characters written, indentation included.
    pub chars: usize,
    /// Recoverable errors met along the way, in order.
    pub diagnostics: Vec<TemplateError>,
}

impl Rendered {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Treats the first diagnostic, if any, as a failure.
    pub fn into_result(mut self) -> Result<usize> {
        if self.diagnostics.is_empty() {
            Ok(self.chars)
        } else {
            Err(self.diagnostics.remove(0))
        }
    }
}

/// Compiles and renders templates.
///
/// The engine holds the collaborators a render needs: the template
/// registry used for inclusion, the formatters, and the render options.
/// It is `Send + Sync`; each render brings its own [`Activations`] arena.
pub struct Engine {
    registry: Arc<dyn TemplateRegistry>,
    formatters: FormatterRegistry,
    options: RenderOptions,
    delimiters: Delimiters,
    cache: TemplateCache,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with no registered templates, the default formatters and
    /// default options.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn registry(&self) -> &dyn TemplateRegistry {
        self.registry.as_ref()
    }

    /// Compiles `source`, reusing the cached definition while the source is
    /// unchanged.
    pub fn compile(&self, name: &str, source: &str) -> Result<Arc<TemplateDefinition>> {
        self.cache.get_or_compile(name, source, self.delimiters)
    }

    /// Instantiates the registry's template `name` as a top-level
    /// activation.
    pub fn instance_of(&self, acts: &mut Activations, name: &str) -> Result<ActivationId> {
        let definition = self
            .registry
            .lookup(name)
            .ok_or_else(|| TemplateError::TemplateNotFound(name.to_string()))?;
        Ok(acts.instantiate(definition))
    }

    /// Renders `root` into `out`.
    ///
    /// # Errors
    /// Only fatal errors fail the render: a write failure, or (in strict
    /// mode) a template that encloses itself. Everything else is returned
    /// in [`Rendered::diagnostics`].
    pub fn render(
        &self,
        acts: &mut Activations,
        root: ActivationId,
        out: &mut dyn TemplateWriter,
    ) -> Result<Rendered> {
        let name = acts.get(root).name().to_string();
        let ctx = RenderContext::new(self.registry.as_ref(), &self.formatters, &self.options);
        let mut evaluator = Evaluator::new(acts, ctx);
        match evaluator.render_activation(root, out) {
            Ok(chars) => {
                let diagnostics = evaluator.finish().into_vec();
                log::debug!(
                    "Rendered '{}': {} chars, {} diagnostic(s)",
                    name,
                    chars,
                    diagnostics.len()
                );
                Ok(Rendered { chars, diagnostics })
            }
            Err(e) => {
                log::error!("Render of '{}' aborted: {}", name, e);
                Err(e)
            }
        }
    }

    /// Renders `root` with the configured writer strategy into a string.
    pub fn render_to_string(
        &self,
        acts: &mut Activations,
        root: ActivationId,
    ) -> Result<(String, Rendered)> {
        let mut buf = Vec::new();
        let rendered = {
            let mut writer = self.options.writer_strategy().writer(&mut buf);
            self.render(acts, root, writer.as_mut())?
        };
        Ok((String::from_utf8_lossy(&buf).into_owned(), rendered))
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    registry: Arc<dyn TemplateRegistry>,
    formatters: FormatterRegistry,
    options: RenderOptions,
    delimiters: Delimiters,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            registry: Arc::new(NoTemplates),
            formatters: FormatterRegistry::with_defaults(),
            options: RenderOptions::default(),
            delimiters: Delimiters::default(),
        }
    }
}

impl EngineBuilder {
    pub fn registry(mut self, registry: impl TemplateRegistry + 'static) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn formatters(mut self, formatters: FormatterRegistry) -> Self {
        self.formatters = formatters;
        self
    }

    pub fn options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Delimiters used by [`Engine::compile`].
    pub fn delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            registry: self.registry,
            formatters: self.formatters,
            options: self.options,
            delimiters: self.delimiters,
            cache: TemplateCache::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::TemplateGroup;
    use crate::tpl::writer::WriterStrategy;

    fn render(engine: &Engine, source: &str, attrs: &[(&str, crate::Value)]) -> (String, Rendered) {
        let def = engine.compile("main", source).unwrap();
        let mut acts = Activations::new();
        let root = acts.instantiate(def);
        for (name, value) in attrs {
            acts.set_attribute(root, *name, value.clone());
        }
        engine.render_to_string(&mut acts, root).unwrap()
    }

    #[test]
    fn test_render_reports_missing_attribute() {
        let engine = Engine::new();
        let (text, rendered) = render(&engine, "Hello, $name$!", &[]);
        assert_eq!(text, "Hello, !");
        assert_eq!(rendered.chars, 8);
        assert!(matches!(
            rendered.diagnostics[0],
            TemplateError::MissingAttribute { .. }
        ));
        assert!(rendered.into_result().is_err());
    }

    #[test]
    fn test_instance_of_registry_template() {
        let group = Arc::new(TemplateGroup::new("g"));
        group.define("hello", ["name"], "hi $name$").unwrap();
        let engine = Engine::builder().registry(group).build();

        let mut acts = Activations::new();
        let root = engine.instance_of(&mut acts, "hello").unwrap();
        acts.set_attribute(root, "name", "bob");
        let (text, rendered) = engine.render_to_string(&mut acts, root).unwrap();
        assert_eq!(text, "hi bob");
        assert!(rendered.is_clean());
        assert!(engine.instance_of(&mut acts, "nope").is_err());
    }

    #[test]
    fn test_line_separator_and_writer_options() {
        let engine = Engine::builder()
            .options(
                RenderOptions::new()
                    .line_separator("\r\n")
                    .writer(WriterStrategy::NoIndent),
            )
            .build();
        let (text, _) = render(
            &engine,
            "a\n  $body$",
            &[("body", crate::Value::Str("x\ny".to_string()))],
        );
        assert_eq!(text, "a\r\nx\ny");
    }
}
