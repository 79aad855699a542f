use crate::error::TemplateError;
use crate::tpl::ast::{Chunk, Expr, TemplateDefinition};
use crate::tpl::expr_parser::{parse_action, parse_condition};
use crate::tpl::lexer::{Delimiters, Token, TokenKind, tokenize};
use std::sync::Arc;

/// An open `if` block. `arms` holds each `if`/`elseif` condition with the
/// chunks of its branch; `otherwise` is set once `else` is seen.
struct IfFrame {
    arms: Vec<(Expr, Vec<Chunk>)>,
    otherwise: Option<Vec<Chunk>>,
    line: usize,
    column: usize,
}

/// Assembles chunk tokens into a [`TemplateDefinition`].
///
/// Conditionals are tracked with a stack of open frames; the chunks of
/// whichever branch is currently open are collected in `nodes_stack`.
struct Parser<'a> {
    name: &'a str,
    delimiters: Delimiters,
    /// Root chunks first, then one entry per open branch.
    nodes_stack: Vec<Vec<Chunk>>,
    tag_stack: Vec<IfFrame>,
    errors: Vec<TemplateError>,
}

impl<'a> Parser<'a> {
    fn new(name: &'a str, delimiters: Delimiters) -> Self {
        Self {
            name,
            delimiters,
            nodes_stack: vec![Vec::new()],
            tag_stack: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn parse(mut self, tokens: Vec<Token>) -> (Vec<Chunk>, Vec<TemplateError>) {
        for token in tokens {
            self.token(token);
        }
        self.close_remaining_tags();
        let chunks = self.nodes_stack.pop().unwrap_or_default();
        (chunks, self.errors)
    }

    fn token(&mut self, token: Token) {
        let Token { kind, line, column } = token;
        match kind {
            TokenKind::Text(text) => self.append_text(&text),
            TokenKind::Newline(nl) => self.append_node(Chunk::Newline(nl)),
            TokenKind::Expr { source, indent } => {
                let parsed = parse_action(&source, line, column, self.delimiters, self.name);
                self.errors.extend(parsed.errors);
                self.append_node(Chunk::Expression {
                    expr: parsed.expr,
                    options: parsed.options,
                    indent,
                });
            }
            TokenKind::If { condition, offset } => {
                let condition = self.condition(&condition, line, column + offset);
                self.tag_stack.push(IfFrame {
                    arms: vec![(condition, Vec::new())],
                    otherwise: None,
                    line,
                    column,
                });
                self.nodes_stack.push(Vec::new());
            }
            TokenKind::ElseIf { condition, offset } => {
                let condition = self.condition(&condition, line, column + offset);
                if let Some(body) = self.take_branch(line, column, "elseif")
                    && let Some(frame) = self.tag_stack.last_mut()
                {
                    store_branch(frame, body);
                    frame.arms.push((condition, Vec::new()));
                }
            }
            TokenKind::Else => {
                if let Some(body) = self.take_branch(line, column, "else")
                    && let Some(frame) = self.tag_stack.last_mut()
                {
                    store_branch(frame, body);
                    frame.otherwise = Some(Vec::new());
                }
            }
            TokenKind::EndIf => {
                if self.tag_stack.is_empty() {
                    self.error(line, column, "endif without matching if");
                    return;
                }
                self.close_tag();
            }
        }
    }

    /// `column` points at the first character inside the marker's parentheses.
    fn condition(&mut self, source: &str, line: usize, column: usize) -> Expr {
        let (expr, errors) = parse_condition(source, line, column, self.delimiters, self.name);
        self.errors.extend(errors);
        expr
    }

    /// Pops the chunks of the branch that just ended. Reports (and returns
    /// nothing for) `elseif`/`else` outside an `if`, or after an `else`.
    fn take_branch(&mut self, line: usize, column: usize, marker: &str) -> Option<Vec<Chunk>> {
        match self.tag_stack.last() {
            None => {
                self.error(line, column, format!("{} without matching if", marker));
                None
            }
            Some(frame) if frame.otherwise.is_some() => {
                self.error(line, column, format!("{} after else", marker));
                None
            }
            Some(_) => {
                let body = self.nodes_stack.pop().unwrap_or_default();
                self.nodes_stack.push(Vec::new());
                Some(body)
            }
        }
    }

    fn close_tag(&mut self) {
        let Some(mut frame) = self.tag_stack.pop() else {
            return;
        };
        let body = self.nodes_stack.pop().unwrap_or_default();
        store_branch(&mut frame, body);
        let node = self.build_conditional(frame);
        self.append_node(node);
    }

    /// `if a ... elseif b ... else ...` becomes
    /// `if a ... else (if b ... else ...)`.
    fn build_conditional(&self, frame: IfFrame) -> Chunk {
        let IfFrame {
            arms, otherwise, ..
        } = frame;
        let mut otherwise = otherwise.map(|chunks| self.branch(chunks));
        let mut arms = arms.into_iter().rev().peekable();
        loop {
            let Some((condition, chunks)) = arms.next() else {
                // `arms` is never empty; an `if` frame always holds one arm.
                return Chunk::Literal(String::new());
            };
            let chunk = Chunk::Conditional {
                condition,
                then: self.branch(chunks),
                otherwise,
            };
            if arms.peek().is_none() {
                return chunk;
            }
            otherwise = Some(self.branch(vec![chunk]));
        }
    }

    fn branch(&self, chunks: Vec<Chunk>) -> Arc<TemplateDefinition> {
        Arc::new(TemplateDefinition::new(self.name, chunks))
    }

    /// Auto-closes `if` blocks left open at the end of the template.
    fn close_remaining_tags(&mut self) {
        while let Some(frame) = self.tag_stack.last() {
            let (line, column) = (frame.line, frame.column);
            self.error(line, column, "missing endif");
            self.close_tag();
        }
    }

    fn error(&mut self, line: usize, column: usize, message: impl Into<String>) {
        self.errors.push(TemplateError::syntax(line, column, message));
    }

    fn append_node(&mut self, chunk: Chunk) {
        if let Some(nodes) = self.nodes_stack.last_mut() {
            nodes.push(chunk);
        }
    }

    /// Merges with the previous literal when possible.
    fn append_text(&mut self, text: &str) {
        if let Some(nodes) = self.nodes_stack.last_mut() {
            if let Some(Chunk::Literal(last)) = nodes.last_mut() {
                last.push_str(text);
            } else {
                nodes.push(Chunk::Literal(text.to_string()));
            }
        }
    }
}

/// The body of the branch that just ended goes to the last open arm, or to
/// `otherwise` once `else` has been seen.
fn store_branch(frame: &mut IfFrame, body: Vec<Chunk>) {
    if let Some(otherwise) = frame.otherwise.as_mut() {
        *otherwise = body;
    } else if let Some((_, chunks)) = frame.arms.last_mut() {
        *chunks = body;
    }
}

/// Compiles template source using `$...$` delimiters.
pub fn compile(name: &str, source: &str) -> crate::Result<TemplateDefinition> {
    compile_with(name, source, Delimiters::DOLLAR)
}

/// Compiles template source, failing with the first syntax error.
pub fn compile_with(
    name: &str,
    source: &str,
    delimiters: Delimiters,
) -> crate::Result<TemplateDefinition> {
    let (definition, mut errors) = compile_lenient(name, source, delimiters);
    if errors.is_empty() {
        log::debug!("Compiled template '{}' ({} chunks)", name, definition.chunks.len());
        Ok(definition)
    } else {
        Err(errors.remove(0))
    }
}

/// Compiles as much as possible: returns a best-effort definition together
/// with every syntax error found.
pub fn compile_lenient(
    name: &str,
    source: &str,
    delimiters: Delimiters,
) -> (TemplateDefinition, Vec<TemplateError>) {
    let (definition, errors) = compile_fragment(name, source, delimiters);
    for error in &errors {
        log::debug!("Template '{}': {}", name, error);
    }
    (definition, errors)
}

pub(crate) fn compile_fragment(
    name: &str,
    source: &str,
    delimiters: Delimiters,
) -> (TemplateDefinition, Vec<TemplateError>) {
    match tokenize(source, delimiters) {
        Ok(tokens) => {
            let (chunks, errors) = Parser::new(name, delimiters).parse(tokens);
            (TemplateDefinition::new(name, chunks), errors)
        }
        Err(e) => (TemplateDefinition::new(name, Vec::new()), vec![e]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tpl::ast::{Arguments, TemplateTarget};

    #[test]
    fn test_parse_simple_text() {
        let def = compile("t", "hello world").unwrap();
        assert_eq!(def.chunks, vec![Chunk::Literal("hello world".to_string())]);
    }

    #[test]
    fn test_parse_expression() {
        let def = compile("t", "hello $name$!").unwrap();
        assert_eq!(def.chunks.len(), 3);
        match &def.chunks[1] {
            Chunk::Expression { expr, indent, .. } => {
                assert_eq!(*expr, Expr::Attribute("name".to_string()));
                assert!(indent.is_none());
            }
            other => panic!("Expected Expression, got {:?}", other),
        }
    }

    #[test]
    fn test_condition_error_column_skips_marker_whitespace() {
        let (_, errors) = compile_lenient("t", "$if (@)$x$endif$", Delimiters::DOLLAR);
        assert!(matches!(
            errors.first(),
            Some(TemplateError::Syntax {
                line: 1,
                column: 6,
                ..
            })
        ));

        let (_, errors) = compile_lenient("t", "$if(a)$x$ elseif ( @)$y$endif$", Delimiters::DOLLAR);
        assert!(matches!(
            errors.first(),
            Some(TemplateError::Syntax {
                line: 1,
                column: 20,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_if_else() {
        let def = compile("t", "$if(a)$yes$else$no$endif$").unwrap();
        assert_eq!(def.chunks.len(), 1);
        match &def.chunks[0] {
            Chunk::Conditional {
                condition,
                then,
                otherwise,
            } => {
                assert_eq!(*condition, Expr::Attribute("a".to_string()));
                assert_eq!(then.chunks, vec![Chunk::Literal("yes".to_string())]);
                let otherwise = otherwise.as_ref().expect("else branch");
                assert_eq!(otherwise.chunks, vec![Chunk::Literal("no".to_string())]);
            }
            other => panic!("Expected Conditional, got {:?}", other),
        }
        assert!(!def.is_pure_conditional());
    }

    #[test]
    fn test_elseif_nests_in_otherwise() {
        let def = compile("t", "$if(a)$A$elseif(b)$B$else$C$endif$").unwrap();
        let Chunk::Conditional { otherwise, .. } = &def.chunks[0] else {
            panic!("Expected Conditional");
        };
        let otherwise = otherwise.as_ref().expect("elseif branch");
        match &otherwise.chunks[0] {
            Chunk::Conditional {
                condition,
                then,
                otherwise,
            } => {
                assert_eq!(*condition, Expr::Attribute("b".to_string()));
                assert_eq!(then.chunks, vec![Chunk::Literal("B".to_string())]);
                assert!(otherwise.is_some());
            }
            other => panic!("Expected nested Conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_pure_conditional() {
        let def = compile("t", "$if(x)$[$x$]$endif$").unwrap();
        assert!(def.is_pure_conditional());
        let def = compile("t", "$if(x)$[$x$]$endif$$y$").unwrap();
        assert!(def.is_pure_conditional());
        let def = compile("t", "$y$$if(x)$[$x$]$endif$").unwrap();
        assert!(!def.is_pure_conditional());
    }

    #[test]
    fn test_nested_if() {
        let def = compile("t", "$if(a)$$if(b)$ab$endif$$endif$").unwrap();
        let Chunk::Conditional { then, .. } = &def.chunks[0] else {
            panic!("Expected Conditional");
        };
        assert!(matches!(then.chunks[0], Chunk::Conditional { .. }));
    }

    #[test]
    fn test_auto_close_reports_missing_endif() {
        let (def, errors) = compile_lenient("t", "$if(x)$content", Delimiters::DOLLAR);
        assert_eq!(def.chunks.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("missing endif"));
        assert!(compile("t", "$if(x)$content").is_err());
    }

    #[test]
    fn test_stray_markers() {
        let (_, errors) = compile_lenient("t", "a$endif$b$else$", Delimiters::DOLLAR);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_lenient_keeps_going_after_bad_expression() {
        let (def, errors) = compile_lenient("t", "$a.$ and $b$", Delimiters::DOLLAR);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &def.chunks[2],
            Chunk::Expression { expr: Expr::Attribute(b), .. } if b == "b"
        ));
    }

    #[test]
    fn test_syntax_error_position() {
        let err = compile("t", "ok\n  x $foo(a=)$").unwrap_err();
        match err {
            TemplateError::Syntax { line, column, .. } => assert_eq!((line, column), (2, 12)),
            other => panic!("Expected Syntax, got {:?}", other),
        }
    }

    #[test]
    fn test_indented_include() {
        let def = compile("t", "{\n    $body()$\n}").unwrap();
        match &def.chunks[2] {
            Chunk::Expression { expr, indent, .. } => {
                assert_eq!(indent.as_deref(), Some("    "));
                assert_eq!(
                    *expr,
                    Expr::Include {
                        target: TemplateTarget::Name("body".to_string()),
                        args: Arguments::None,
                    }
                );
            }
            other => panic!("Expected Expression, got {:?}", other),
        }
    }
}
