use crate::model::value::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Capability interface for opaque host objects.
///
/// Templates never reflect over host types. Instead each type exposes its
/// properties through [`Model::property`], usually backed by an [`Accessors`]
/// table built once per type (see `#[derive(Model)]`).
pub trait Model: Any + fmt::Debug + Send + Sync {
    /// Resolves a named property, or `None` when no accessor matches.
    fn property(&self, name: &str) -> Option<Value>;

    /// The natural text form used when the object itself is written.
    fn text(&self) -> String {
        format!("{:?}", self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorKind {
    /// A computed getter, consulted first.
    Getter,
    /// A boolean `is_*` style predicate.
    Predicate,
    /// A plain field.
    Field,
}

impl AccessorKind {
    /// Lookup precedence for a property name.
    pub const SEARCH_ORDER: [AccessorKind; 3] = [
        AccessorKind::Getter,
        AccessorKind::Predicate,
        AccessorKind::Field,
    ];
}

pub type AccessorFn<T> = fn(&T) -> Value;

/// Registered accessor table for one concrete host type.
pub struct Accessors<T> {
    entries: HashMap<AccessorKind, HashMap<&'static str, AccessorFn<T>>>,
}

impl<T> Default for Accessors<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Accessors<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn getter(self, name: &'static str, f: AccessorFn<T>) -> Self {
        self.with(AccessorKind::Getter, name, f)
    }

    pub fn predicate(self, name: &'static str, f: AccessorFn<T>) -> Self {
        self.with(AccessorKind::Predicate, name, f)
    }

    pub fn field(self, name: &'static str, f: AccessorFn<T>) -> Self {
        self.with(AccessorKind::Field, name, f)
    }

    fn with(mut self, kind: AccessorKind, name: &'static str, f: AccessorFn<T>) -> Self {
        self.entries.entry(kind).or_default().insert(name, f);
        self
    }

    /// Searches getter, then predicate, then field; the first match wins.
    pub fn resolve(&self, target: &T, name: &str) -> Option<Value> {
        AccessorKind::SEARCH_ORDER.iter().find_map(|kind| {
            self.entries
                .get(kind)
                .and_then(|by_name| by_name.get(name))
                .map(|f| f(target))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.values().flat_map(|by_name| by_name.keys().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct User {
        name: String,
        admin: bool,
    }

    fn accessors() -> Accessors<User> {
        Accessors::new()
            .field("name", |u: &User| Value::Str(u.name.clone()))
            .getter("name", |u: &User| Value::Str(u.name.to_uppercase()))
            .predicate("admin", |u: &User| Value::Bool(u.admin))
            .field("admin", |_: &User| Value::Str("field".to_string()))
    }

    #[test]
    fn test_getter_wins_over_field() {
        let user = User {
            name: "ann".to_string(),
            admin: true,
        };
        let table = accessors();
        assert_eq!(
            table.resolve(&user, "name"),
            Some(Value::Str("ANN".to_string()))
        );
        assert_eq!(table.resolve(&user, "admin"), Some(Value::Bool(true)));
        assert_eq!(table.resolve(&user, "missing"), None);
    }

    #[test]
    fn test_resolve_with_borrowed_name() {
        let user = User {
            name: "bob".to_string(),
            admin: false,
        };
        let table = accessors();
        let name = String::from("admin");
        assert_eq!(table.resolve(&user, &name), Some(Value::Bool(false)));

        let mut names: Vec<_> = table.names().collect();
        names.sort();
        names.dedup();
        assert_eq!(names, ["admin", "name"]);
    }
}
