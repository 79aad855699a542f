use crate::model::accessor::Model;
use crate::tpl::activation::ActivationId;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Key consulted by property lookup on a [`Value::Map`] when the requested
/// key is missing.
pub const DEFAULT_MAP_KEY: &str = "_default_";

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Date without time zone
    Date(NaiveDate),
    /// Date and time without time zone
    DateTime(NaiveDateTime),
    /// Ordered sequence; host arrays and collections end up here.
    List(Vec<Value>),
    /// Keyed mapping. Property lookup falls back to [`DEFAULT_MAP_KEY`].
    Map(BTreeMap<String, Value>),
    /// Dynamic keyed aggregate (a struct-like bag of named values).
    Aggregate(BTreeMap<String, Value>),
    /// A nested template activation living in the render's arena.
    Template(ActivationId),
    /// Opaque host object exposing properties through its accessor table.
    Object(Arc<dyn Model>),
}

impl Value {
    pub fn object<M: Model>(model: M) -> Self {
        Value::Object(Arc::new(model))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Aggregate(_) => "aggregate",
            Value::Template(_) => "template",
            Value::Object(o) => o.type_name(),
        }
    }

    /// Runtime type used to pick a formatter.
    pub fn runtime_type(&self) -> Option<TypeId> {
        match self {
            Value::Bool(_) => Some(TypeId::of::<bool>()),
            Value::Int(_) => Some(TypeId::of::<i64>()),
            Value::Float(_) => Some(TypeId::of::<f64>()),
            Value::Str(_) => Some(TypeId::of::<String>()),
            Value::Date(_) => Some(TypeId::of::<NaiveDate>()),
            Value::DateTime(_) => Some(TypeId::of::<NaiveDateTime>()),
            Value::Object(o) => {
                let any: &dyn Any = o.as_ref();
                Some(any.type_id())
            }
            _ => None,
        }
    }

    /// True for the variants that render element by element.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Normalizes the value to an ordered traversal: lists yield their items,
    /// maps their values in key order, null nothing, anything else itself.
    pub fn into_elements(self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            Value::Map(map) => map.into_values().collect(),
            other => vec![other],
        }
    }

    /// Text of a scalar. Templates and collections need the evaluator, so
    /// they only get a placeholder here.
    pub fn scalar_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Date(d) => d.to_string(),
            Value::DateTime(dt) => dt.to_string(),
            Value::Aggregate(fields) => {
                let body: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v.scalar_text()))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Value::List(items) => items.iter().map(Value::scalar_text).collect(),
            Value::Map(map) => map.values().map(Value::scalar_text).collect(),
            Value::Template(id) => format!("{}", id),
            Value::Object(o) => o.text(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Aggregate(a), Value::Aggregate(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scalar_text())
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::List(iter.into_iter().collect())
    }
}

/// Anything that can be handed to a template as an attribute value.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

macro_rules! impl_to_value_int {
    ($($rust_type:ty),*) => {
        $(
            impl ToValue for $rust_type {
                fn to_value(&self) -> Value {
                    Value::Int(*self as i64)
                }
            }
        )*
    };
}

impl_to_value_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! impl_to_value_wide_int {
    ($($rust_type:ty),*) => {
        $(
            impl ToValue for $rust_type {
                fn to_value(&self) -> Value {
                    // Out of range for i64: keep the digits rather than wrap.
                    i64::try_from(*self)
                        .map(Value::Int)
                        .unwrap_or_else(|_| Value::Str(self.to_string()))
                }
            }
        )*
    };
}

impl_to_value_wide_int!(u64, usize, i128, u128, isize);

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(*self as f64)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl ToValue for char {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Date(*self)
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::DateTime(self.naive_utc())
    }
}

impl ToValue for ActivationId {
    fn to_value(&self) -> Value {
        Value::Template(*self)
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl<T> ToValue for &T
where
    T: ToValue + ?Sized,
{
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue, const N: usize> ToValue for [T; N] {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<T: ToValue> ToValue for HashMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

impl<T: ToValue + ?Sized> ToValue for Arc<T> {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}
