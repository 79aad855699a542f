use crate::error::TemplateError;
use crate::format::FormatterRegistry;
use crate::group::TemplateRegistry;
use crate::tpl::writer::WriterStrategy;

/// Settings threaded through one render call.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    strict: bool,
    line_separator: Option<String>,
    writer: WriterStrategy,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every nested template written for a self-enclosing chain and
    /// fails with [`TemplateError::InfiniteRecursion`] when one is found.
    ///
    /// Without it a template that ends up enclosing itself recurses until
    /// the thread's stack is exhausted.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Replaces every template newline with `separator`. By default the
    /// newline found in the template source is kept.
    pub fn line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = Some(separator.into());
        self
    }

    pub fn writer(mut self, strategy: WriterStrategy) -> Self {
        self.writer = strategy;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn newline<'a>(&'a self, source: &'a str) -> &'a str {
        self.line_separator.as_deref().unwrap_or(source)
    }

    pub fn writer_strategy(&self) -> WriterStrategy {
        self.writer
    }
}

/// Recoverable render errors, in the order they happened.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<TemplateError>,
}

impl Diagnostics {
    pub fn report(&mut self, error: TemplateError) {
        log::warn!("{}", error);
        self.errors.push(error);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_vec(self) -> Vec<TemplateError> {
        self.errors
    }
}

/// Collaborators and state shared by every step of one render.
pub(crate) struct RenderContext<'a> {
    pub registry: &'a dyn TemplateRegistry,
    pub formatters: &'a FormatterRegistry,
    pub options: &'a RenderOptions,
    pub diagnostics: Diagnostics,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        registry: &'a dyn TemplateRegistry,
        formatters: &'a FormatterRegistry,
        options: &'a RenderOptions,
    ) -> Self {
        Self {
            registry,
            formatters,
            options,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn report(&mut self, error: TemplateError) {
        self.diagnostics.report(error);
    }
}
