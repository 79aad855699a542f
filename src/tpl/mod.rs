pub mod activation;
mod apply;
pub mod ast;
mod cache;
pub mod engine;
mod expr_parser;
pub mod lexer;
mod parser;
mod render;
pub mod render_context;
pub mod writer;

pub use apply::{DEFAULT_ATTRIBUTE, INDEX_ATTRIBUTE, LEGACY_ATTRIBUTE};
pub use cache::TemplateCache;
pub use lexer::Delimiters;
pub use parser::{compile, compile_lenient, compile_with};
pub use render::truthy;
