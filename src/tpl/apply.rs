use crate::Result;
use crate::error::TemplateError;
use crate::model::Value;
use crate::tpl::activation::ActivationId;
use crate::tpl::ast::{Arguments, Builtin, Expr, TemplateDefinition, TemplateRef};
use crate::tpl::render::Evaluator;
use std::sync::Arc;

/// Element bound during rotating application.
pub const DEFAULT_ATTRIBUTE: &str = "it";
/// Older name for [`DEFAULT_ATTRIBUTE`], still bound for existing templates.
pub const LEGACY_ATTRIBUTE: &str = "attr";
/// 1-based position of the element.
pub const INDEX_ATTRIBUTE: &str = "i";

impl Evaluator<'_, '_> {
    fn template_of(
        &mut self,
        id: ActivationId,
        template: &TemplateRef,
    ) -> Result<Option<(Arc<TemplateDefinition>, Option<Arguments>)>> {
        match template {
            TemplateRef::Named { target, args } => Ok(self
                .resolve_template(id, target)?
                .map(|definition| (definition, Some(args.clone())))),
            TemplateRef::Anonymous(definition) => Ok(Some((definition.clone(), None))),
        }
    }

    /// `source : t1(), t2(), ...`. Element `i` (1-based, nulls skipped) goes
    /// to `templates[(i - 1) % k]`. A scalar source is applied once.
    pub(crate) fn apply_rotating(
        &mut self,
        id: ActivationId,
        source: &Expr,
        templates: &[TemplateRef],
    ) -> Result<Value> {
        let value = self.eval(id, source)?;
        if value.is_null() || templates.is_empty() {
            return Ok(Value::Null);
        }

        let mut results = Vec::new();
        let mut index = 0usize;
        for element in value.into_elements() {
            if element.is_null() {
                continue;
            }
            index += 1;
            let template = &templates[(index - 1) % templates.len()];
            let Some((definition, args)) = self.template_of(id, template)? else {
                continue;
            };
            let tid = self.acts.embedded_instance_of(id, definition.clone());
            let sole = if definition.anonymous || definition.formal_args.len() == 1 {
                definition.formal_args.first()
            } else {
                None
            };
            if let Some(formal) = sole {
                self.acts.set_argument(tid, formal.clone(), element.clone());
            }
            self.acts.set_argument(tid, DEFAULT_ATTRIBUTE, element.clone());
            self.acts.set_argument(tid, LEGACY_ATTRIBUTE, element);
            self.acts
                .set_argument(tid, INDEX_ATTRIBUTE, Value::Int(index as i64));
            if let Some(args) = args {
                self.evaluate_arguments(id, tid, &args)?;
            }
            results.push(Value::Template(tid));
        }
        Ok(Value::List(results))
    }

    /// `a, b, ... : t`. Walks every source in lockstep and binds one formal
    /// per source at each step.
    ///
    /// A formal count that differs from the number of sources, or sources
    /// of different lengths, is reported once and the walk is truncated to
    /// the shorter side.
    pub(crate) fn apply_aligned(
        &mut self,
        id: ActivationId,
        sources: &[Expr],
        template: &TemplateRef,
    ) -> Result<Value> {
        let mut lists = Vec::with_capacity(sources.len());
        for source in sources {
            let value = self.eval(id, source)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            lists.push(value.into_elements());
        }
        let Some((definition, args)) = self.template_of(id, template)? else {
            return Ok(Value::Null);
        };

        let formals = &definition.formal_args;
        if formals.len() != lists.len() {
            self.ctx.report(TemplateError::ArityMismatch {
                template: definition.name.clone(),
                expected: formals.len(),
                actual: lists.len(),
            });
            lists.truncate(formals.len());
        } else {
            let shortest = lists.iter().map(Vec::len).min().unwrap_or(0);
            let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
            if shortest != longest {
                self.ctx.report(TemplateError::ArityMismatch {
                    template: definition.name.clone(),
                    expected: shortest,
                    actual: longest,
                });
                for list in &mut lists {
                    list.truncate(shortest);
                }
            }
        }

        let mut cursors: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();
        let mut results = Vec::new();
        let mut step = 0i64;
        loop {
            let row: Vec<Option<Value>> = cursors.iter_mut().map(Iterator::next).collect();
            if row.iter().all(Option::is_none) {
                break;
            }
            step += 1;
            let tid = self.acts.embedded_instance_of(id, definition.clone());
            for (formal, value) in formals.iter().zip(row) {
                if let Some(value) = value
                    && !value.is_null()
                {
                    self.acts.set_argument(tid, formal.clone(), value);
                }
            }
            self.acts.set_argument(tid, INDEX_ATTRIBUTE, Value::Int(step));
            if let Some(args) = &args {
                self.evaluate_arguments(id, tid, args)?;
            }
            results.push(Value::Template(tid));
        }
        Ok(Value::List(results))
    }
}

/// List functions. A scalar behaves like a one-element list and null like
/// an empty one.
pub(crate) fn call_builtin(builtin: Builtin, value: Value) -> Value {
    let mut items = value.into_elements();
    let list_or_null = |items: Vec<Value>| {
        if items.is_empty() {
            Value::Null
        } else {
            Value::List(items)
        }
    };
    match builtin {
        Builtin::First => items.into_iter().next().unwrap_or(Value::Null),
        Builtin::Last => items.pop().unwrap_or(Value::Null),
        Builtin::Rest => list_or_null(items.into_iter().skip(1).collect()),
        Builtin::Trunc => {
            items.pop();
            list_or_null(items)
        }
        Builtin::Length => Value::Int(items.len() as i64),
        Builtin::Strip => list_or_null(items.into_iter().filter(|v| !v.is_null()).collect()),
    }
}
