use crate::model::Value;
use chrono::{NaiveDate, NaiveDateTime};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

/// Turns a value into text. `format` is the text of the expression's
/// `format` option, if any.
pub trait Formatter: Send + Sync {
    fn format(&self, value: &Value, format: Option<&str>) -> String;
}

/// Formatters keyed by the runtime type of the value being written.
#[derive(Clone, Default)]
pub struct FormatterRegistry {
    formatters: HashMap<TypeId, Arc<dyn Formatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in [`DateFormatter`] for dates and
    /// date-times.
    pub fn with_defaults() -> Self {
        let date: Arc<dyn Formatter> = Arc::new(DateFormatter);
        let mut registry = Self::new();
        registry
            .formatters
            .insert(TypeId::of::<NaiveDate>(), date.clone());
        registry
            .formatters
            .insert(TypeId::of::<NaiveDateTime>(), date);
        registry
    }

    /// Registers `formatter` for values whose runtime type is `T`
    /// (`String` for strings, `i64` for integers, or a host [`Model`] type).
    ///
    /// [`Model`]: crate::model::Model
    pub fn register<T: 'static>(&mut self, formatter: impl Formatter + 'static) -> &mut Self {
        self.formatters
            .insert(TypeId::of::<T>(), Arc::new(formatter));
        self
    }

    pub fn formatter_for(&self, value: &Value) -> Option<&dyn Formatter> {
        let type_id = value.runtime_type()?;
        self.formatters.get(&type_id).map(|f| f.as_ref())
    }
}

impl std::fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatterRegistry")
            .field("formatters", &self.formatters.len())
            .finish()
    }
}

/// Formats dates with a `chrono` format string, e.g. `format="%d/%m/%Y"`.
/// Without one, dates use ISO 8601.
pub struct DateFormatter;

impl Formatter for DateFormatter {
    fn format(&self, value: &Value, format: Option<&str>) -> String {
        match (value, format) {
            (Value::Date(d), Some(f)) => render_or(d.format(f), || d.to_string()),
            (Value::DateTime(dt), Some(f)) => render_or(dt.format(f), || dt.to_string()),
            (Value::Date(d), None) => d.format("%Y-%m-%d").to_string(),
            (Value::DateTime(dt), None) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            (other, _) => other.scalar_text(),
        }
    }
}

/// chrono reports bad format strings as a `fmt::Error` at display time.
fn render_or(item: impl std::fmt::Display, fallback: impl FnOnce() -> String) -> String {
    let mut out = String::new();
    match write!(out, "{}", item) {
        Ok(()) => out,
        Err(_) => {
            log::warn!("Invalid date format, falling back to default text");
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Formatter for Upper {
        fn format(&self, value: &Value, format: Option<&str>) -> String {
            match format {
                Some("upper") => value.scalar_text().to_uppercase(),
                _ => value.scalar_text(),
            }
        }
    }

    #[test]
    fn test_lookup_by_runtime_type() {
        let mut registry = FormatterRegistry::new();
        registry.register::<String>(Upper);
        let value = Value::Str("abc".to_string());
        let formatter = registry.formatter_for(&value).expect("string formatter");
        assert_eq!(formatter.format(&value, Some("upper")), "ABC");
        assert!(registry.formatter_for(&Value::Int(1)).is_none());
    }

    #[test]
    fn test_date_formatter() {
        let registry = FormatterRegistry::with_defaults();
        let value = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        let formatter = registry.formatter_for(&value).expect("date formatter");
        assert_eq!(formatter.format(&value, None), "2024-03-09");
        assert_eq!(formatter.format(&value, Some("%d/%m/%Y")), "09/03/2024");
    }
}
