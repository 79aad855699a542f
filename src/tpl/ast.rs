use std::sync::Arc;

/// Built-in list functions usable in expressions, e.g. `first(names)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    First,
    Rest,
    Last,
    Length,
    Strip,
    Trunc,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "first" => Some(Builtin::First),
            "rest" => Some(Builtin::Rest),
            "last" => Some(Builtin::Last),
            "length" => Some(Builtin::Length),
            "strip" => Some(Builtin::Strip),
            "trunc" => Some(Builtin::Trunc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyName {
    /// `obj.name`
    Named(String),
    /// `obj.(expr)`: the property name is computed at render time.
    Indirect(Box<Expr>),
}

/// How a template is named at a call site.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateTarget {
    Name(String),
    /// `super.name(...)`: looked up in the parent of the defining group.
    Super(String),
    /// `(expr)(...)`: the expression evaluates to a template name.
    Indirect(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arguments {
    None,
    /// `t(a=x, b=y)`; names are unique per list.
    Assignments(Vec<(String, Expr)>),
    /// `t(x)`: binds the callee's sole formal parameter.
    Positional(Box<Expr>),
}

impl Arguments {
    pub fn is_empty(&self) -> bool {
        matches!(self, Arguments::None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateRef {
    Named {
        target: TemplateTarget,
        args: Arguments,
    },
    Anonymous(Arc<TemplateDefinition>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Concat(Box<Expr>, Box<Expr>),
    Attribute(String),
    Int(i64),
    Str(String),
    Property {
        target: Box<Expr>,
        property: PropertyName,
    },
    Include {
        target: TemplateTarget,
        args: Arguments,
    },
    /// `source : t1(), t2(), ...` (rotating when more than one template).
    Apply {
        source: Box<Expr>,
        templates: Vec<TemplateRef>,
    },
    /// `a, b, ... : t` (lockstep over all sources).
    ApplyAligned {
        sources: Vec<Expr>,
        template: TemplateRef,
    },
    /// `(expr)`: rendered to a string eagerly.
    Value(Box<Expr>),
    Not(Box<Expr>),
    Function(Builtin, Box<Expr>),
    List(Vec<Expr>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprOptions {
    pub separator: Option<Expr>,
    /// Text written in place of null values.
    pub null: Option<Expr>,
    /// Format name handed to the value's formatter.
    pub format: Option<Expr>,
}

impl ExprOptions {
    pub fn is_empty(&self) -> bool {
        self.separator.is_none() && self.null.is_none() && self.format.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Literal(String),
    Newline(String),
    Expression {
        expr: Expr,
        options: ExprOptions,
        indent: Option<String>,
    },
    Conditional {
        condition: Expr,
        then: Arc<TemplateDefinition>,
        otherwise: Option<Arc<TemplateDefinition>>,
    },
}

/// The compiled, immutable form of a template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateDefinition {
    pub name: String,
    pub formal_args: Vec<String>,
    pub chunks: Vec<Chunk>,
    /// Anonymous `{...}` templates defined inline in an expression.
    pub anonymous: bool,
    /// Name of the group that registered this template, if any.
    pub group: Option<String>,
}

impl TemplateDefinition {
    pub fn new(name: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        Self {
            name: name.into(),
            chunks,
            ..Default::default()
        }
    }

    pub fn with_formal_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formal_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn has_formal_arg(&self, name: &str) -> bool {
        self.formal_args.iter().any(|a| a == name)
    }

    /// A body whose first chunk is an `if` lacking an `else`. When such a
    /// template renders nothing, the separator after it is dropped.
    pub fn is_pure_conditional(&self) -> bool {
        matches!(
            self.chunks.as_slice(),
            [
                Chunk::Conditional {
                    otherwise: None,
                    ..
                },
                ..
            ]
        )
    }
}
