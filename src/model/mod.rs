//! The attribute value model: the dynamically typed values templates are
//! rendered against, and the capability interface host objects implement.

pub mod accessor;
pub mod serializer;
pub mod value;

pub use accessor::{AccessorKind, Accessors, Model};
pub use serializer::to_value;
pub use value::{DEFAULT_MAP_KEY, ToValue, Value};
