use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Syntax Error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("No such attribute: '{name}' in template '{template}'")]
    MissingAttribute { template: String, name: String },
    #[error("Can't resolve property '{property}' on {target}")]
    PropertyResolution { target: String, property: String },
    #[error("Arity mismatch applying '{template}': expected {expected}, got {actual}")]
    ArityMismatch {
        template: String,
        expected: usize,
        actual: usize,
    },
    #[error("Template not found: '{0}'")]
    TemplateNotFound(String),
    #[error("Template '{template}' has no formal parameter '{name}'")]
    UnknownParameter { template: String, name: String },
    #[error("Infinite recursion detected: {trace}")]
    InfiniteRecursion { trace: String },
    #[error("Write Error: {0}")]
    Write(#[from] std::io::Error),
    #[error("Serialization Error: {0}")]
    Serialization(String),
    #[error("Group Load Error: {0}")]
    GroupLoad(String),
}

impl TemplateError {
    pub(crate) fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        TemplateError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    /// Fatal errors abort the current render; everything else is recovered
    /// locally and collected as a diagnostic.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TemplateError::InfiniteRecursion { .. } | TemplateError::Write(_)
        )
    }
}

impl serde::ser::Error for TemplateError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        TemplateError::Serialization(msg.to_string())
    }
}
