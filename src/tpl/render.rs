use crate::Result;
use crate::error::TemplateError;
use crate::model::{DEFAULT_MAP_KEY, Value};
use crate::tpl::activation::{ActivationId, Activations, ScopeKind};
use crate::tpl::ast::{
    Arguments, Chunk, Expr, ExprOptions, PropertyName, TemplateDefinition, TemplateTarget,
};
use crate::tpl::render_context::{Diagnostics, RenderContext};
use crate::tpl::writer::TemplateWriter;
use std::sync::Arc;

/// Truthiness used by `if`: null and `false` are false, collections are
/// true when non-empty, anything else present is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::List(items) => !items.is_empty(),
        Value::Map(map) | Value::Aggregate(map) => !map.is_empty(),
        _ => true,
    }
}

/// Options of one expression chunk with `null` and `format` already
/// evaluated. The separator stays an expression; it is evaluated per
/// element boundary.
#[derive(Default)]
pub(crate) struct WriteOptions<'e> {
    pub separator: Option<&'e Expr>,
    pub null: Option<String>,
    pub format: Option<String>,
}

/// Tree-walking evaluator over one render's activation arena.
///
/// Recoverable errors go to the diagnostics and evaluate to null; only
/// fatal errors (recursion, write failures) come back as `Err`.
pub(crate) struct Evaluator<'r, 'a> {
    pub(crate) acts: &'r mut Activations,
    pub(crate) ctx: RenderContext<'a>,
}

impl<'r, 'a> Evaluator<'r, 'a> {
    pub fn new(acts: &'r mut Activations, ctx: RenderContext<'a>) -> Self {
        Self { acts, ctx }
    }

    pub fn finish(self) -> Diagnostics {
        self.ctx.diagnostics
    }

    pub fn render_activation(
        &mut self,
        id: ActivationId,
        out: &mut dyn TemplateWriter,
    ) -> Result<usize> {
        let definition = self.acts.get(id).definition.clone();
        self.render_chunks(id, &definition.chunks, out)
    }

    fn render_chunks(
        &mut self,
        id: ActivationId,
        chunks: &[Chunk],
        out: &mut dyn TemplateWriter,
    ) -> Result<usize> {
        let mut n = 0;
        for chunk in chunks {
            n += self.render_chunk(id, chunk, out)?;
        }
        Ok(n)
    }

    fn render_chunk(
        &mut self,
        id: ActivationId,
        chunk: &Chunk,
        out: &mut dyn TemplateWriter,
    ) -> Result<usize> {
        match chunk {
            Chunk::Literal(text) => Ok(out.write(text)?),
            Chunk::Newline(nl) => {
                let nl = self.ctx.options.newline(nl);
                Ok(out.write(nl)?)
            }
            Chunk::Expression {
                expr,
                options,
                indent,
            } => {
                let value = self.eval(id, expr)?;
                let options = self.write_options(id, options)?;
                if let Some(indent) = indent {
                    out.push_indentation(indent);
                }
                let written = self.write_value(id, &value, &options, out);
                if indent.is_some() {
                    out.pop_indentation();
                }
                written
            }
            Chunk::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let test = self.eval(id, condition)?;
                if truthy(&test) {
                    self.render_chunks(id, &then.chunks, out)
                } else if let Some(otherwise) = otherwise {
                    self.render_chunks(id, &otherwise.chunks, out)
                } else {
                    Ok(0)
                }
            }
        }
    }

    fn write_options<'e>(
        &mut self,
        id: ActivationId,
        options: &'e ExprOptions,
    ) -> Result<WriteOptions<'e>> {
        let mut resolved = WriteOptions {
            separator: options.separator.as_ref(),
            ..Default::default()
        };
        if let Some(null) = &options.null {
            resolved.null = Some(self.eval_text(id, null)?);
        }
        if let Some(format) = &options.format {
            resolved.format = Some(self.eval_text(id, format)?);
        }
        Ok(resolved)
    }

    pub fn eval(&mut self, id: ActivationId, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Attribute(name) => Ok(self.resolve_attribute(id, name)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Concat(a, b) => {
                let a = self.eval(id, a)?;
                let b = self.eval(id, b)?;
                self.concat(id, a, b)
            }
            Expr::Property { target, property } => {
                let target = self.eval(id, target)?;
                let name = match property {
                    PropertyName::Named(name) => name.clone(),
                    PropertyName::Indirect(expr) => self.eval_text(id, expr)?,
                };
                Ok(self.resolve_property(&target, &name))
            }
            Expr::Include { target, args } => self.include(id, target, args),
            Expr::Apply { source, templates } => self.apply_rotating(id, source, templates),
            Expr::ApplyAligned { sources, template } => {
                self.apply_aligned(id, sources, template)
            }
            Expr::Value(inner) => {
                let value = self.eval(id, inner)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Str(self.text(id, &value)?))
            }
            Expr::Not(inner) => {
                let value = self.eval(id, inner)?;
                Ok(Value::Bool(!truthy(&value)))
            }
            Expr::Function(builtin, inner) => {
                let value = self.eval(id, inner)?;
                Ok(super::apply::call_builtin(*builtin, value))
            }
            Expr::List(items) => {
                let mut list = Vec::new();
                for item in items {
                    match self.eval(id, item)? {
                        Value::List(inner) => list.extend(inner),
                        Value::Map(map) => list.extend(map.into_values()),
                        other => list.push(other),
                    }
                }
                Ok(Value::List(list))
            }
        }
    }

    /// Evaluates `expr` and renders the result to text.
    fn eval_text(&mut self, id: ActivationId, expr: &Expr) -> Result<String> {
        let value = self.eval(id, expr)?;
        self.text(id, &value)
    }

    /// Null is the identity of concatenation.
    pub fn concat(&mut self, id: ActivationId, a: Value, b: Value) -> Result<Value> {
        match (a, b) {
            (Value::Null, b) => Ok(b),
            (a, Value::Null) => Ok(a),
            (a, b) => {
                let mut text = self.text(id, &a)?;
                text.push_str(&self.text(id, &b)?);
                Ok(Value::Str(text))
            }
        }
    }

    /// Argument context, then attribute table. Only a transient argument
    /// scope continues in its caller; templates, anonymous ones included,
    /// never inherit attributes.
    pub fn resolve_attribute(&mut self, id: ActivationId, name: &str) -> Value {
        let mut scope = id;
        let mut declared = false;
        let mut owner: Option<ActivationId> = None;
        for _ in 0..=self.acts.len() {
            let activation = self.acts.get(scope);
            if let Some(value) = activation.lookup(name) {
                return value.clone();
            }
            declared |= activation.definition.has_formal_arg(name);
            let transparent = activation.kind == ScopeKind::Arguments;
            if activation.kind == ScopeKind::Template && owner.is_none() {
                owner = Some(scope);
            }
            match activation.enclosing {
                Some(enclosing) if transparent => scope = enclosing,
                _ => break,
            }
        }

        if !declared {
            let template = self.acts.get(owner.unwrap_or(scope)).name().to_string();
            self.ctx.report(TemplateError::MissingAttribute {
                template,
                name: name.to_string(),
            });
        }
        Value::Null
    }

    pub fn resolve_property(&mut self, target: &Value, name: &str) -> Value {
        let found = match target {
            Value::Null => return Value::Null,
            Value::Aggregate(fields) => fields.get(name).cloned(),
            Value::Template(tid) => self.acts.get(*tid).attributes.get(name).cloned().or_else(|| {
                self.acts.get(*tid).arguments.get(name).cloned()
            }),
            Value::Map(map) => map
                .get(name)
                .or_else(|| map.get(DEFAULT_MAP_KEY))
                .cloned()
                .or_else(|| match name {
                    "keys" => Some(map.keys().map(|k| Value::Str(k.clone())).collect()),
                    "values" => Some(map.values().cloned().collect()),
                    _ => None,
                }),
            Value::Object(object) => object.property(name),
            _ => None,
        };
        match found {
            Some(value) => value,
            None => {
                let target = match target {
                    Value::Template(tid) => format!("template '{}'", self.acts.get(*tid).name()),
                    other => other.kind().to_string(),
                };
                self.ctx.report(TemplateError::PropertyResolution {
                    target,
                    property: name.to_string(),
                });
                Value::Null
            }
        }
    }

    /// Looks a template up in the registry. A miss is reported and yields
    /// `None`.
    pub(crate) fn resolve_template(
        &mut self,
        id: ActivationId,
        target: &TemplateTarget,
    ) -> Result<Option<Arc<TemplateDefinition>>> {
        let (name, found) = match target {
            TemplateTarget::Name(name) => {
                // Names resolve in the caller's own group first.
                let qualified = self
                    .group_of(id)
                    .and_then(|group| self.ctx.registry.lookup(&format!("{}.{}", group, name)));
                (name.clone(), qualified.or_else(|| self.ctx.registry.lookup(name)))
            }
            TemplateTarget::Super(name) => {
                let found = match self.group_of(id) {
                    Some(group) => self.ctx.registry.lookup_super(&group, name),
                    None => None,
                };
                (format!("super.{}", name), found)
            }
            TemplateTarget::Indirect(expr) => {
                let name = self.eval_text(id, expr)?;
                let found = self.ctx.registry.lookup(&name);
                (name, found)
            }
        };
        if found.is_none() {
            self.ctx.report(TemplateError::TemplateNotFound(name));
        }
        Ok(found)
    }

    /// Group of the nearest enclosing template that was defined in one.
    fn group_of(&self, id: ActivationId) -> Option<String> {
        std::iter::once(id)
            .chain(self.acts.enclosing_chain(id))
            .find_map(|a| self.acts.get(a).definition.group.clone())
    }

    fn include(
        &mut self,
        id: ActivationId,
        target: &TemplateTarget,
        args: &Arguments,
    ) -> Result<Value> {
        let Some(definition) = self.resolve_template(id, target)? else {
            return Ok(Value::Null);
        };
        let callee = self.acts.embedded_instance_of(id, definition);
        self.evaluate_arguments(id, callee, args)?;
        Ok(Value::Template(callee))
    }

    /// Evaluates `args` in the caller's scope and binds the results in the
    /// callee's argument context. Null results are not bound.
    pub(crate) fn evaluate_arguments(
        &mut self,
        caller: ActivationId,
        callee: ActivationId,
        args: &Arguments,
    ) -> Result<()> {
        let definition = self.acts.get(callee).definition.clone();
        match args {
            Arguments::None => Ok(()),
            Arguments::Positional(expr) => {
                if definition.formal_args.len() != 1 {
                    self.ctx.report(TemplateError::ArityMismatch {
                        template: definition.name.clone(),
                        expected: definition.formal_args.len(),
                        actual: 1,
                    });
                    return Ok(());
                }
                let scope = self.arguments_scope(caller, callee);
                let value = self.eval(scope, expr)?;
                if !value.is_null() {
                    self.acts
                        .set_argument(callee, definition.formal_args[0].clone(), value);
                }
                Ok(())
            }
            Arguments::Assignments(assignments) => {
                let scope = self.arguments_scope(caller, callee);
                for (name, expr) in assignments {
                    if !definition.formal_args.is_empty() && !definition.has_formal_arg(name) {
                        self.ctx.report(TemplateError::UnknownParameter {
                            template: definition.name.clone(),
                            name: name.clone(),
                        });
                        continue;
                    }
                    let value = self.eval(scope, expr)?;
                    if !value.is_null() {
                        self.acts.set_argument(callee, name.clone(), value);
                    }
                }
                Ok(())
            }
        }
    }

    fn arguments_scope(&mut self, caller: ActivationId, callee: ActivationId) -> ActivationId {
        let seed = self.acts.get(callee).arguments.clone();
        self.acts.arguments_scope(caller, seed)
    }

    pub(crate) fn write_value(
        &mut self,
        id: ActivationId,
        value: &Value,
        options: &WriteOptions<'_>,
        out: &mut dyn TemplateWriter,
    ) -> Result<usize> {
        match value {
            Value::Null => match &options.null {
                Some(text) => Ok(out.write(text)?),
                None => Ok(0),
            },
            Value::Template(tid) => self.write_template(id, *tid, out),
            Value::List(items) => {
                let items: Vec<&Value> = items.iter().collect();
                self.write_elements(id, &items, options, out)
            }
            Value::Map(map) => {
                let items: Vec<&Value> = map.values().collect();
                self.write_elements(id, &items, options, out)
            }
            scalar => {
                let text = self.format(scalar, options.format.as_deref());
                Ok(out.write(&text)?)
            }
        }
    }

    /// Writes each element, with the separator between elements. Nulls are
    /// skipped unless a `null` option stands in for them; an empty
    /// pure-conditional template suppresses the separator after it.
    fn write_elements(
        &mut self,
        id: ActivationId,
        items: &[&Value],
        options: &WriteOptions<'_>,
        out: &mut dyn TemplateWriter,
    ) -> Result<usize> {
        let mut n = 0;
        let mut pending_separator = false;
        for item in items {
            if item.is_null() && options.null.is_none() {
                continue;
            }
            if pending_separator && let Some(separator) = options.separator {
                let text = self.eval_text(id, separator)?;
                n += out.write(&text)?;
            }
            let written = self.write_value(id, item, options, out)?;
            n += written;
            pending_separator = !(written == 0 && self.is_empty_conditional(item));
        }
        Ok(n)
    }

    fn is_empty_conditional(&self, value: &Value) -> bool {
        match value {
            Value::Template(tid) => self.acts.get(*tid).definition.is_pure_conditional(),
            _ => false,
        }
    }

    /// Rebinds the nested activation to the current caller before rendering
    /// it; in strict mode a self-enclosing chain is fatal.
    fn write_template(
        &mut self,
        caller: ActivationId,
        tid: ActivationId,
        out: &mut dyn TemplateWriter,
    ) -> Result<usize> {
        self.acts.set_enclosing(tid, Some(caller));
        if self.ctx.options.is_strict() && self.acts.is_self_enclosed(tid) {
            return Err(TemplateError::InfiniteRecursion {
                trace: self.acts.trace(tid),
            });
        }
        self.render_activation(tid, out)
    }

    fn format(&self, value: &Value, format: Option<&str>) -> String {
        match self.ctx.formatters.formatter_for(value) {
            Some(formatter) => formatter.format(value, format),
            None => value.scalar_text(),
        }
    }

    /// Renders `value` into a fresh writer of the configured strategy, with
    /// no inherited indentation.
    pub(crate) fn text(&mut self, id: ActivationId, value: &Value) -> Result<String> {
        if let Value::Str(s) = value {
            return Ok(s.clone());
        }
        let mut buf = Vec::new();
        {
            let mut writer = self.ctx.options.writer_strategy().writer(&mut buf);
            self.write_value(id, value, &WriteOptions::default(), writer.as_mut())?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
