pub mod error;
pub mod format;
pub mod group;
pub mod group_loader;
pub mod model;
pub mod tpl;

#[doc(hidden)]
pub use ctor;
pub use ustl_macros::Model;
pub use ustl_macros::template_assets;

pub use error::TemplateError;
pub use format::{DateFormatter, Formatter, FormatterRegistry};
pub use group::{G, GroupManager, TemplateGroup, TemplateRegistry};
pub use model::{Model, ToValue, Value};
pub use tpl::activation::{ActivationId, Activations};
pub use tpl::ast::TemplateDefinition;
pub use tpl::engine::{Engine, EngineBuilder, Rendered};
pub use tpl::render_context::RenderOptions;
pub use tpl::writer::{AutoIndentWriter, NoIndentWriter, TemplateWriter, WriterStrategy};
pub use tpl::{Delimiters, compile, compile_with};

pub type Result<T> = std::result::Result<T, TemplateError>;
