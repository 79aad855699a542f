use crate::model::{ToValue, Value};
use crate::tpl::ast::TemplateDefinition;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handle to an [`Activation`] inside an [`Activations`] arena.
///
/// Handles are only meaningful for the arena that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationId(usize);

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A real template instance.
    Template,
    /// Transient scope used while evaluating a call's argument list. Lookups
    /// that miss here continue in the enclosing caller.
    Arguments,
}

/// One runtime instance of a [`TemplateDefinition`].
#[derive(Debug, Clone)]
pub struct Activation {
    pub definition: Arc<TemplateDefinition>,
    pub attributes: HashMap<String, Value>,
    pub arguments: HashMap<String, Value>,
    pub enclosing: Option<ActivationId>,
    pub kind: ScopeKind,
}

impl Activation {
    fn new(definition: Arc<TemplateDefinition>, kind: ScopeKind) -> Self {
        Self {
            definition,
            attributes: HashMap::new(),
            arguments: HashMap::new(),
            enclosing: None,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Argument context first, then the attribute table.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.arguments
            .get(name)
            .or_else(|| self.attributes.get(name))
    }
}

/// Arena owning every activation of one render.
///
/// Enclosing links are handles into the same arena, so walking them never
/// touches freed memory. Indexing with a handle from a different arena
/// panics.
#[derive(Debug, Default)]
pub struct Activations {
    slots: Vec<Activation>,
}

impl Activations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Creates a top-level activation with no enclosing link.
    pub fn instantiate(&mut self, definition: impl Into<Arc<TemplateDefinition>>) -> ActivationId {
        self.push(Activation::new(definition.into(), ScopeKind::Template))
    }

    /// Creates an activation whose enclosing link is `enclosing`.
    pub fn embedded_instance_of(
        &mut self,
        enclosing: ActivationId,
        definition: Arc<TemplateDefinition>,
    ) -> ActivationId {
        let mut activation = Activation::new(definition, ScopeKind::Template);
        activation.enclosing = Some(enclosing);
        self.push(activation)
    }

    /// Transient argument scope: sits on top of `caller` and starts with the
    /// callee's arguments so far.
    pub(crate) fn arguments_scope(
        &mut self,
        caller: ActivationId,
        seed: HashMap<String, Value>,
    ) -> ActivationId {
        let definition = self.get(caller).definition.clone();
        let mut activation = Activation::new(definition, ScopeKind::Arguments);
        activation.arguments = seed;
        activation.enclosing = Some(caller);
        self.push(activation)
    }

    fn push(&mut self, activation: Activation) -> ActivationId {
        self.slots.push(activation);
        ActivationId(self.slots.len() - 1)
    }

    pub fn get(&self, id: ActivationId) -> &Activation {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: ActivationId) -> &mut Activation {
        &mut self.slots[id.0]
    }

    /// Sets (or replaces) an attribute.
    pub fn set_attribute(&mut self, id: ActivationId, name: impl Into<String>, value: impl ToValue) {
        self.get_mut(id)
            .attributes
            .insert(name.into(), value.to_value());
    }

    /// Adds a value to an attribute, turning it into a list on the second
    /// call. Null values are ignored.
    pub fn add_attribute(&mut self, id: ActivationId, name: impl Into<String>, value: impl ToValue) {
        let value = value.to_value();
        if value.is_null() {
            return;
        }
        let name = name.into();
        let attributes = &mut self.get_mut(id).attributes;
        let merged = match attributes.remove(&name) {
            None => value,
            Some(Value::List(mut items)) => {
                items.push(value);
                Value::List(items)
            }
            Some(existing) => Value::List(vec![existing, value]),
        };
        attributes.insert(name, merged);
    }

    pub fn attribute(&self, id: ActivationId, name: &str) -> Option<&Value> {
        self.get(id).attributes.get(name)
    }

    pub(crate) fn set_argument(&mut self, id: ActivationId, name: impl Into<String>, value: Value) {
        self.get_mut(id).arguments.insert(name.into(), value);
    }

    pub(crate) fn set_enclosing(&mut self, id: ActivationId, enclosing: Option<ActivationId>) {
        self.get_mut(id).enclosing = enclosing;
    }

    /// Enclosing links starting at `id`'s parent. Bounded by the arena size,
    /// so a cyclic chain ends after one lap.
    pub fn enclosing_chain(&self, id: ActivationId) -> Vec<ActivationId> {
        let mut chain = Vec::new();
        let mut cursor = self.get(id).enclosing;
        while let Some(current) = cursor {
            if chain.len() >= self.slots.len() {
                break;
            }
            chain.push(current);
            cursor = self.get(current).enclosing;
        }
        chain
    }

    /// True when `id` is reachable from its own enclosing chain.
    pub fn is_self_enclosed(&self, id: ActivationId) -> bool {
        self.enclosing_chain(id).contains(&id)
    }

    /// `outer -> ... -> id` by template name, for recursion reports.
    pub fn trace(&self, id: ActivationId) -> String {
        let mut names: Vec<&str> = self
            .enclosing_chain(id)
            .iter()
            .take_while(|a| **a != id)
            .filter(|a| self.get(**a).kind == ScopeKind::Template)
            .map(|a| self.get(*a).name())
            .collect();
        names.reverse();
        names.insert(0, self.get(id).name());
        names.push(self.get(id).name());
        names.join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> Arc<TemplateDefinition> {
        Arc::new(TemplateDefinition::new(name, Vec::new()))
    }

    #[test]
    fn test_add_attribute_accumulates() {
        let mut acts = Activations::new();
        let id = acts.instantiate(def("t"));
        acts.add_attribute(id, "names", "a");
        acts.add_attribute(id, "names", Value::Null);
        acts.add_attribute(id, "names", "b");
        assert_eq!(
            acts.attribute(id, "names"),
            Some(&Value::List(vec![
                Value::Str("a".to_string()),
                Value::Str("b".to_string())
            ]))
        );
    }

    #[test]
    fn test_arguments_shadow_attributes() {
        let mut acts = Activations::new();
        let id = acts.instantiate(def("t"));
        acts.set_attribute(id, "x", 1);
        acts.set_argument(id, "x", Value::Int(2));
        assert_eq!(acts.get(id).lookup("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_detects_self_enclosing_chain() {
        let mut acts = Activations::new();
        let outer = acts.instantiate(def("outer"));
        let inner = acts.embedded_instance_of(outer, def("inner"));
        assert!(!acts.is_self_enclosed(inner));
        assert_eq!(acts.enclosing_chain(inner), vec![outer]);

        acts.set_enclosing(outer, Some(inner));
        assert!(acts.is_self_enclosed(inner));
        assert_eq!(acts.trace(inner), "inner -> outer -> inner");
    }
}
