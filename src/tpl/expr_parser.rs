use crate::error::TemplateError;
use crate::tpl::ast::{
    Arguments, Builtin, Expr, ExprOptions, PropertyName, TemplateDefinition, TemplateRef,
    TemplateTarget,
};
use crate::tpl::lexer::Delimiters;
use crate::tpl::parser;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    /// `{...}` with the raw body between the braces.
    Anonymous(String),
    LParen,
    RParen,
    LBrack,
    RBrack,
    Comma,
    Colon,
    Semi,
    Dot,
    Plus,
    Bang,
    Assign,
    Eof,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("'{}'", s),
            Tok::Str(s) => format!("\"{}\"", s),
            Tok::Int(n) => n.to_string(),
            Tok::Anonymous(_) => "anonymous template".to_string(),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::LBrack => "'['".to_string(),
            Tok::RBrack => "']'".to_string(),
            Tok::Comma => "','".to_string(),
            Tok::Colon => "':'".to_string(),
            Tok::Semi => "';'".to_string(),
            Tok::Dot => "'.'".to_string(),
            Tok::Plus => "'+'".to_string(),
            Tok::Bang => "'!'".to_string(),
            Tok::Assign => "'='".to_string(),
            Tok::Eof => "end of expression".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    line: usize,
    column: usize,
}

/// Splits an expression chunk into tokens. `line`/`column` are the
/// template position of the first character of `src`.
fn scan(src: &str, line: usize, column: usize) -> Result<Vec<Spanned>, TemplateError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    let (mut line, mut column) = (line, column);

    let advance = |i: &mut usize, line: &mut usize, column: &mut usize, c: char| {
        *i += 1;
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let (tok_line, tok_column) = (line, column);
        if c.is_whitespace() {
            advance(&mut i, &mut line, &mut column, c);
            continue;
        }

        let simple = match c {
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            '[' => Some(Tok::LBrack),
            ']' => Some(Tok::RBrack),
            ',' => Some(Tok::Comma),
            ':' => Some(Tok::Colon),
            ';' => Some(Tok::Semi),
            '.' => Some(Tok::Dot),
            '+' => Some(Tok::Plus),
            '!' => Some(Tok::Bang),
            '=' => Some(Tok::Assign),
            _ => None,
        };
        if let Some(tok) = simple {
            advance(&mut i, &mut line, &mut column, c);
            out.push(Spanned {
                tok,
                line: tok_line,
                column: tok_column,
            });
            continue;
        }

        let tok = if c == '"' {
            advance(&mut i, &mut line, &mut column, c);
            let mut s = String::new();
            loop {
                let Some(&c) = chars.get(i) else {
                    return Err(TemplateError::syntax(
                        tok_line,
                        tok_column,
                        "unterminated string literal",
                    ));
                };
                advance(&mut i, &mut line, &mut column, c);
                match c {
                    '"' => break,
                    '\\' => {
                        let Some(&e) = chars.get(i) else { continue };
                        advance(&mut i, &mut line, &mut column, e);
                        s.push(match e {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    }
                    _ => s.push(c),
                }
            }
            Tok::Str(s)
        } else if c == '{' {
            advance(&mut i, &mut line, &mut column, c);
            let mut depth = 0usize;
            let mut body = String::new();
            loop {
                let Some(&c) = chars.get(i) else {
                    return Err(TemplateError::syntax(
                        tok_line,
                        tok_column,
                        "unterminated anonymous template: missing '}'",
                    ));
                };
                advance(&mut i, &mut line, &mut column, c);
                match c {
                    '\\' => {
                        body.push(c);
                        if let Some(&e) = chars.get(i) {
                            advance(&mut i, &mut line, &mut column, e);
                            body.push(e);
                        }
                    }
                    '{' => {
                        depth += 1;
                        body.push(c);
                    }
                    '}' if depth == 0 => break,
                    '}' => {
                        depth -= 1;
                        body.push(c);
                    }
                    _ => body.push(c),
                }
            }
            Tok::Anonymous(body)
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                let ch = chars[i];
                advance(&mut i, &mut line, &mut column, ch);
            }
            let digits: String = chars[start..i].iter().collect();
            let n = digits.parse::<i64>().map_err(|_| {
                TemplateError::syntax(tok_line, tok_column, format!("integer out of range: {}", digits))
            })?;
            Tok::Int(n)
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                let ch = chars[i];
                advance(&mut i, &mut line, &mut column, ch);
            }
            Tok::Ident(chars[start..i].iter().collect())
        } else {
            return Err(TemplateError::syntax(
                tok_line,
                tok_column,
                format!("unexpected character '{}'", c),
            ));
        };
        out.push(Spanned {
            tok,
            line: tok_line,
            column: tok_column,
        });
    }
    out.push(Spanned {
        tok: Tok::Eof,
        line,
        column,
    });
    Ok(out)
}

/// Marker error: the diagnostic is already recorded, unwind to the nearest
/// synchronizing point.
struct Recover;

type PResult<T> = Result<T, Recover>;

struct ExprParser<'a> {
    toks: Vec<Spanned>,
    idx: usize,
    errors: Vec<TemplateError>,
    delimiters: Delimiters,
    /// Name of the enclosing template, used to name anonymous templates.
    owner: &'a str,
    anonymous_count: usize,
}

impl<'a> ExprParser<'a> {
    fn new(toks: Vec<Spanned>, delimiters: Delimiters, owner: &'a str) -> Self {
        Self {
            toks,
            idx: 0,
            errors: Vec::new(),
            delimiters,
            owner,
            anonymous_count: 0,
        }
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.idx.min(self.toks.len() - 1)].tok
    }

    fn peek_at(&self, n: usize) -> &Tok {
        &self.toks[(self.idx + n).min(self.toks.len() - 1)].tok
    }

    fn position(&self) -> (usize, usize) {
        let t = &self.toks[self.idx.min(self.toks.len() - 1)];
        (t.line, t.column)
    }

    fn next(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.idx < self.toks.len() - 1 {
            self.idx += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.next();
            true
        } else {
            false
        }
    }

    fn fail<T>(&mut self, message: impl Into<String>) -> PResult<T> {
        let (line, column) = self.position();
        self.errors.push(TemplateError::syntax(line, column, message));
        Err(Recover)
    }

    fn expect(&mut self, tok: Tok) -> PResult<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            let found = self.peek().describe();
            self.fail(format!("expected {} but found {}", tok.describe(), found))
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.next();
                Ok(name)
            }
            other => self.fail(format!("expected a name but found {}", other.describe())),
        }
    }

    /// Skips ahead to one of `stops` (or the end) without consuming it.
    fn synchronize(&mut self, stops: &[Tok]) {
        let mut depth = 0usize;
        loop {
            let tok = self.peek();
            if *tok == Tok::Eof {
                return;
            }
            if depth == 0 && stops.contains(tok) {
                return;
            }
            match tok {
                Tok::LParen | Tok::LBrack => depth += 1,
                Tok::RParen | Tok::RBrack => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.next();
        }
    }

    fn action(&mut self) -> (Expr, ExprOptions) {
        let expr = match self.templates_expr(true) {
            Ok(e) => e,
            Err(Recover) => {
                self.synchronize(&[Tok::Semi]);
                Expr::Str(String::new())
            }
        };

        let mut options = ExprOptions::default();
        if self.eat(&Tok::Semi) {
            loop {
                if self.option(&mut options).is_err() {
                    self.synchronize(&[Tok::Comma]);
                }
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect_end();
        (expr, options)
    }

    fn expect_end(&mut self) {
        if *self.peek() != Tok::Eof {
            let found = self.peek().describe();
            let _ = self.fail::<()>(format!("unexpected {}", found));
        }
    }

    fn option(&mut self, options: &mut ExprOptions) -> PResult<()> {
        let name = self.expect_ident()?;
        let value = if self.eat(&Tok::Assign) {
            self.expr()?
        } else {
            Expr::Str(String::new())
        };
        match name.as_str() {
            "separator" => options.separator = Some(value),
            "null" => options.null = Some(value),
            "format" => options.format = Some(value),
            other => return self.fail(format!("unknown option '{}'", other)),
        }
        Ok(())
    }

    fn condition(&mut self) -> Expr {
        let negated = self.eat(&Tok::Bang);
        let expr = match self.templates_expr(true) {
            Ok(e) => e,
            Err(Recover) => Expr::Str(String::new()),
        };
        self.expect_end();
        if negated {
            Expr::Not(Box::new(expr))
        } else {
            expr
        }
    }

    /// `top` enables aligned application and comma-separated (rotating)
    /// template lists, which are ambiguous inside argument lists.
    fn templates_expr(&mut self, top: bool) -> PResult<Expr> {
        let first = self.expr()?;
        let mut result = if top && *self.peek() == Tok::Comma {
            let mut sources = vec![first];
            while self.eat(&Tok::Comma) {
                sources.push(self.expr()?);
            }
            self.expect(Tok::Colon)?;
            let template = self.template_ref()?;
            Expr::ApplyAligned { sources, template }
        } else {
            first
        };

        while self.eat(&Tok::Colon) {
            let mut templates = vec![self.template_ref()?];
            if top {
                while self.eat(&Tok::Comma) {
                    templates.push(self.template_ref()?);
                }
            }
            result = Expr::Apply {
                source: Box::new(result),
                templates,
            };
        }
        Ok(result)
    }

    fn expr(&mut self) -> PResult<Expr> {
        let mut left = self.primary()?;
        while self.eat(&Tok::Plus) {
            let right = self.primary()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let mut expr = self.atom()?;
        while self.eat(&Tok::Dot) {
            let property = match self.peek().clone() {
                Tok::Ident(name) => {
                    self.next();
                    PropertyName::Named(name)
                }
                Tok::LParen => {
                    self.next();
                    let inner = self.templates_expr(true)?;
                    self.expect(Tok::RParen)?;
                    PropertyName::Indirect(Box::new(inner))
                }
                other => {
                    return self.fail(format!(
                        "expected a property name after '.' but found {}",
                        other.describe()
                    ));
                }
            };
            expr = Expr::Property {
                target: Box::new(expr),
                property,
            };
        }
        Ok(expr)
    }

    fn atom(&mut self) -> PResult<Expr> {
        match self.next() {
            Tok::Ident(name) => {
                if name == "super" && *self.peek() == Tok::Dot {
                    self.next();
                    let target = self.expect_ident()?;
                    let args = self.arg_list()?;
                    return Ok(Expr::Include {
                        target: TemplateTarget::Super(target),
                        args,
                    });
                }
                if *self.peek() == Tok::LParen {
                    if let Some(builtin) = Builtin::from_name(&name) {
                        self.next();
                        let inner = self.templates_expr(true)?;
                        self.expect(Tok::RParen)?;
                        return Ok(Expr::Function(builtin, Box::new(inner)));
                    }
                    let args = self.arg_list()?;
                    return Ok(Expr::Include {
                        target: TemplateTarget::Name(name),
                        args,
                    });
                }
                Ok(Expr::Attribute(name))
            }
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::Int(n) => Ok(Expr::Int(n)),
            Tok::LBrack => {
                let mut items = Vec::new();
                if !self.eat(&Tok::RBrack) {
                    loop {
                        items.push(self.expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                    self.expect(Tok::RBrack)?;
                }
                Ok(Expr::List(items))
            }
            Tok::LParen => {
                let inner = self.templates_expr(true)?;
                self.expect(Tok::RParen)?;
                // `(e)(...)` names a template indirectly; `(e)` alone is a value.
                if *self.peek() == Tok::LParen {
                    let args = self.arg_list()?;
                    Ok(Expr::Include {
                        target: TemplateTarget::Indirect(Box::new(inner)),
                        args,
                    })
                } else {
                    Ok(Expr::Value(Box::new(inner)))
                }
            }
            Tok::Anonymous(_) => {
                self.idx -= 1;
                self.fail("anonymous template must follow ':'")
            }
            other => {
                if self.idx > 0 && other != Tok::Eof {
                    self.idx -= 1;
                }
                self.fail(format!("unexpected {}", other.describe()))
            }
        }
    }

    fn template_ref(&mut self) -> PResult<TemplateRef> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.next();
                let target = if name == "super" && self.eat(&Tok::Dot) {
                    TemplateTarget::Super(self.expect_ident()?)
                } else {
                    TemplateTarget::Name(name)
                };
                let args = self.arg_list()?;
                Ok(TemplateRef::Named { target, args })
            }
            Tok::LParen => {
                self.next();
                let inner = self.templates_expr(true)?;
                self.expect(Tok::RParen)?;
                let args = self.arg_list()?;
                Ok(TemplateRef::Named {
                    target: TemplateTarget::Indirect(Box::new(inner)),
                    args,
                })
            }
            Tok::Anonymous(body) => {
                let (line, column) = self.position();
                self.next();
                Ok(TemplateRef::Anonymous(Arc::new(
                    self.anonymous(&body, line, column),
                )))
            }
            other => self.fail(format!("expected a template but found {}", other.describe())),
        }
    }

    fn arg_list(&mut self) -> PResult<Arguments> {
        self.expect(Tok::LParen)?;
        if self.eat(&Tok::RParen) {
            return Ok(Arguments::None);
        }

        let named = matches!(self.peek(), Tok::Ident(_)) && *self.peek_at(1) == Tok::Assign;
        if !named {
            let value = self.templates_expr(false)?;
            self.expect(Tok::RParen)?;
            return Ok(Arguments::Positional(Box::new(value)));
        }

        let mut assignments: Vec<(String, Expr)> = Vec::new();
        loop {
            match self.assignment() {
                Ok((name, value)) => {
                    if assignments.iter().any(|(n, _)| *n == name) {
                        let _ = self.fail::<()>(format!("argument '{}' assigned twice", name));
                    } else {
                        assignments.push((name, value));
                    }
                }
                Err(Recover) => self.synchronize(&[Tok::Comma]),
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen)?;
        Ok(Arguments::Assignments(assignments))
    }

    fn assignment(&mut self) -> PResult<(String, Expr)> {
        let name = self.expect_ident()?;
        self.expect(Tok::Assign)?;
        let value = self.templates_expr(false)?;
        Ok((name, value))
    }

    /// Compiles `{a, b | body}`. Nested errors are reported at template
    /// positions relative to the opening brace.
    fn anonymous(&mut self, raw: &str, line: usize, column: usize) -> TemplateDefinition {
        self.anonymous_count += 1;
        let name = format!("{}_anon{}", self.owner, self.anonymous_count);
        let (formal_args, body, offset) = split_formal_args(raw);
        let body = unescape_braces(body);
        let (mut def, errors) = parser::compile_fragment(&name, &body, self.delimiters);
        for error in errors {
            self.errors.push(shift_position(error, line, column + 1 + offset));
        }
        def.formal_args = formal_args;
        def.anonymous = true;
        def
    }
}

/// `a, b | body` -> (["a", "b"], "body", chars before body)
fn split_formal_args(raw: &str) -> (Vec<String>, &str, usize) {
    let Some(bar) = raw.find('|') else {
        return (Vec::new(), raw, 0);
    };
    let header = &raw[..bar];
    let names: Vec<&str> = header.split(',').map(str::trim).collect();
    let valid = names.iter().all(|n| {
        let mut chars = n.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_')
    });
    if !valid {
        return (Vec::new(), raw, 0);
    }
    let after = &raw[bar + 1..];
    let body = after.trim_start();
    let offset = raw[..bar + 1].chars().count() + (after.len() - body.len());
    (names.into_iter().map(str::to_string).collect(), body, offset)
}

fn unescape_braces(body: &str) -> String {
    body.replace("\\{", "{").replace("\\}", "}")
}

fn shift_position(error: TemplateError, line: usize, column: usize) -> TemplateError {
    match error {
        TemplateError::Syntax {
            line: l,
            column: c,
            message,
        } => {
            if l == 1 {
                TemplateError::syntax(line, column + c - 1, message)
            } else {
                TemplateError::syntax(line + l - 1, c, message)
            }
        }
        other => other,
    }
}

/// Result of parsing one expression chunk.
pub(crate) struct ParsedAction {
    pub expr: Expr,
    pub options: ExprOptions,
    pub errors: Vec<TemplateError>,
}

pub(crate) fn parse_action(
    src: &str,
    line: usize,
    column: usize,
    delimiters: Delimiters,
    owner: &str,
) -> ParsedAction {
    match scan(src, line, column) {
        Ok(toks) => {
            let mut parser = ExprParser::new(toks, delimiters, owner);
            let (expr, options) = parser.action();
            ParsedAction {
                expr,
                options,
                errors: parser.errors,
            }
        }
        Err(e) => ParsedAction {
            expr: Expr::Str(String::new()),
            options: ExprOptions::default(),
            errors: vec![e],
        },
    }
}

pub(crate) fn parse_condition(
    src: &str,
    line: usize,
    column: usize,
    delimiters: Delimiters,
    owner: &str,
) -> (Expr, Vec<TemplateError>) {
    match scan(src, line, column) {
        Ok(toks) => {
            let mut parser = ExprParser::new(toks, delimiters, owner);
            let expr = parser.condition();
            (expr, parser.errors)
        }
        Err(e) => (Expr::Str(String::new()), vec![e]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tpl::ast::Chunk;

    fn parse(src: &str) -> (Expr, ExprOptions) {
        let parsed = parse_action(src, 1, 1, Delimiters::DOLLAR, "t");
        assert!(parsed.errors.is_empty(), "errors: {:?}", parsed.errors);
        (parsed.expr, parsed.options)
    }

    fn attr(name: &str) -> Expr {
        Expr::Attribute(name.to_string())
    }

    #[test]
    fn test_attribute_and_property_chain() {
        let (expr, _) = parse("user.address.city");
        assert_eq!(
            expr,
            Expr::Property {
                target: Box::new(Expr::Property {
                    target: Box::new(attr("user")),
                    property: PropertyName::Named("address".to_string()),
                }),
                property: PropertyName::Named("city".to_string()),
            }
        );
    }

    #[test]
    fn test_indirect_property() {
        let (expr, _) = parse("user.(field)");
        assert_eq!(
            expr,
            Expr::Property {
                target: Box::new(attr("user")),
                property: PropertyName::Indirect(Box::new(attr("field"))),
            }
        );
    }

    #[test]
    fn test_concatenation_is_left_associative() {
        let (expr, _) = parse("a + \"-\" + b");
        assert_eq!(
            expr,
            Expr::Concat(
                Box::new(Expr::Concat(
                    Box::new(attr("a")),
                    Box::new(Expr::Str("-".to_string()))
                )),
                Box::new(attr("b"))
            )
        );
    }

    #[test]
    fn test_include_with_assignments() {
        let (expr, _) = parse("bold(item=item, size=3)");
        assert_eq!(
            expr,
            Expr::Include {
                target: TemplateTarget::Name("bold".to_string()),
                args: Arguments::Assignments(vec![
                    ("item".to_string(), attr("item")),
                    ("size".to_string(), Expr::Int(3)),
                ]),
            }
        );
    }

    #[test]
    fn test_include_with_positional_argument() {
        let (expr, _) = parse("bold(name)");
        assert_eq!(
            expr,
            Expr::Include {
                target: TemplateTarget::Name("bold".to_string()),
                args: Arguments::Positional(Box::new(attr("name"))),
            }
        );
    }

    #[test]
    fn test_indirect_include_versus_value() {
        let (expr, _) = parse("(which)()");
        assert_eq!(
            expr,
            Expr::Include {
                target: TemplateTarget::Indirect(Box::new(attr("which"))),
                args: Arguments::None,
            }
        );

        let (expr, _) = parse("(which)");
        assert_eq!(expr, Expr::Value(Box::new(attr("which"))));
    }

    #[test]
    fn test_super_include() {
        let (expr, _) = parse("super.header()");
        assert_eq!(
            expr,
            Expr::Include {
                target: TemplateTarget::Super("header".to_string()),
                args: Arguments::None,
            }
        );
    }

    #[test]
    fn test_rotating_application_with_separator() {
        let (expr, options) = parse("rows:even(),odd(); separator=\"\\n\"");
        match expr {
            Expr::Apply { source, templates } => {
                assert_eq!(*source, attr("rows"));
                assert_eq!(templates.len(), 2);
            }
            other => panic!("Expected Apply, got {:?}", other),
        }
        assert_eq!(options.separator, Some(Expr::Str("\n".to_string())));
    }

    #[test]
    fn test_chained_application() {
        let (expr, _) = parse("names:bold():italic()");
        match expr {
            Expr::Apply { source, templates } => {
                assert_eq!(templates.len(), 1);
                assert!(matches!(*source, Expr::Apply { .. }));
            }
            other => panic!("Expected Apply, got {:?}", other),
        }
    }

    #[test]
    fn test_aligned_application_with_anonymous_template() {
        let (expr, _) = parse("names, phones:{n, p | $n$: $p$}");
        match expr {
            Expr::ApplyAligned { sources, template } => {
                assert_eq!(sources, vec![attr("names"), attr("phones")]);
                let TemplateRef::Anonymous(def) = template else {
                    panic!("Expected anonymous template");
                };
                assert_eq!(def.formal_args, vec!["n", "p"]);
                assert!(def.anonymous);
                assert_eq!(def.chunks.len(), 3);
                assert!(matches!(&def.chunks[1], Chunk::Literal(s) if s == ": "));
            }
            other => panic!("Expected ApplyAligned, got {:?}", other),
        }
    }

    #[test]
    fn test_builtins_and_list_literals() {
        let (expr, _) = parse("first([a, b])");
        assert_eq!(
            expr,
            Expr::Function(Builtin::First, Box::new(Expr::List(vec![attr("a"), attr("b")])))
        );
    }

    #[test]
    fn test_negated_condition() {
        let (expr, errors) = parse_condition("!user.admin", 1, 1, Delimiters::DOLLAR, "t");
        assert!(errors.is_empty());
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn test_recovers_after_bad_argument() {
        let parsed = parse_action("t(a=, b=x); separator=\",\"", 3, 10, Delimiters::DOLLAR, "t");
        assert_eq!(parsed.errors.len(), 1);
        match &parsed.errors[0] {
            TemplateError::Syntax { line, column, .. } => assert_eq!((*line, *column), (3, 14)),
            other => panic!("Expected Syntax, got {:?}", other),
        }
        match parsed.expr {
            Expr::Include {
                args: Arguments::Assignments(args),
                ..
            } => {
                assert_eq!(args, vec![("b".to_string(), attr("x"))]);
            }
            other => panic!("Expected Include, got {:?}", other),
        }
        assert!(parsed.options.separator.is_some());
    }

    #[test]
    fn test_duplicate_argument_is_an_error() {
        let parsed = parse_action("t(a=x, a=y)", 1, 1, Delimiters::DOLLAR, "t");
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].to_string().contains("assigned twice"));
    }

    #[test]
    fn test_unknown_option_is_reported() {
        let parsed = parse_action("x; wrap", 1, 1, Delimiters::DOLLAR, "t");
        assert_eq!(parsed.errors.len(), 1);
    }
}
