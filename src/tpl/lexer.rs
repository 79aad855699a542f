use crate::error::TemplateError;

/// Characters that open and close an expression chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Delimiters {
    pub start: char,
    pub stop: char,
}

impl Delimiters {
    /// `$name$`
    pub const DOLLAR: Delimiters = Delimiters {
        start: '$',
        stop: '$',
    };
    /// `<name>`
    pub const ANGLE: Delimiters = Delimiters {
        start: '<',
        stop: '>',
    };

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "$" | "dollar" => Some(Self::DOLLAR),
            "<" | "<>" | "angle" => Some(Self::ANGLE),
            _ => None,
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::DOLLAR
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Text(String),
    Newline(String),
    Expr {
        source: String,
        indent: Option<String>,
    },
    /// `offset` counts characters from the token column to the condition.
    If { condition: String, offset: usize },
    ElseIf { condition: String, offset: usize },
    Else,
    EndIf,
}

/// A chunk token. `line`/`column` point at the first character of the
/// token's payload (for expressions, just past the start delimiter).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    delimiters: Delimiters,
    tokens: Vec<Token>,
    /// Literal text waiting to be flushed, with the position it started at.
    text: String,
    text_start: (usize, usize),
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, delimiters: Delimiters) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            delimiters,
            tokens: Vec::new(),
            text: String::new(),
            text_start: (1, 1),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::syntax(line, column, message)
    }

    fn newline_len(&self) -> Option<usize> {
        let rest = self.rest();
        if rest.starts_with("\r\n") {
            Some(2)
        } else if rest.starts_with('\n') {
            Some(1)
        } else {
            None
        }
    }

    fn push_text(&mut self, s: &str) {
        if self.text.is_empty() {
            self.text_start = (self.line, self.column);
        }
        self.text.push_str(s);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.tokens.push(Token {
                kind: TokenKind::Text(text),
                line: self.text_start.0,
                column: self.text_start.1,
            });
        }
    }

    fn push_token(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.flush_text();
        self.tokens.push(Token { kind, line, column });
    }

    fn tokenize(mut self) -> Result<Vec<Token>, TemplateError> {
        while self.pos < self.src.len() {
            if let Some(len) = self.newline_len() {
                let (line, column) = (self.line, self.column);
                let nl = self.rest()[..len].to_string();
                for _ in 0..len {
                    self.bump();
                }
                self.push_token(TokenKind::Newline(nl), line, column);
                continue;
            }

            if self.column == 1 && self.try_indented_chunk()? {
                continue;
            }

            let c = self.peek().unwrap_or_default();
            if c == '\\' && self.try_escape() {
                continue;
            }
            if c == self.delimiters.start {
                self.chunk(None)?;
                continue;
            }
            self.bump();
            let mut buf = [0u8; 4];
            self.push_text(c.encode_utf8(&mut buf));
        }
        self.flush_text();
        Ok(self.tokens)
    }

    /// At the start of a line: leading whitespace directly followed by a
    /// chunk opener becomes that chunk's indentation.
    fn try_indented_chunk(&mut self) -> Result<bool, TemplateError> {
        let ws_len = self
            .rest()
            .find(|c: char| c != ' ' && c != '\t')
            .unwrap_or(self.rest().len());
        if ws_len == 0 {
            return Ok(false);
        }
        let after = &self.rest()[ws_len..];
        if !after.starts_with(self.delimiters.start) || self.opens_comment(&after[1..]) {
            return Ok(false);
        }
        let indent = self.rest()[..ws_len].to_string();
        for _ in 0..ws_len {
            self.bump();
        }
        self.chunk(Some(indent))?;
        Ok(true)
    }

    fn opens_comment(&self, after_start: &str) -> bool {
        after_start.starts_with('!')
    }

    /// `\$`, `\` + stop delimiter and `\\` + start delimiter in literal
    /// text.
    fn try_escape(&mut self) -> bool {
        match self.peek_at(1) {
            // `\\$x$`: a literal backslash, then a regular chunk.
            Some('\\') if self.peek_at(2) == Some(self.delimiters.start) => {
                self.bump();
                self.bump();
                self.push_text("\\");
                true
            }
            Some(next) if next == self.delimiters.start || next == self.delimiters.stop => {
                self.bump();
                self.bump();
                let mut buf = [0u8; 4];
                self.push_text(next.encode_utf8(&mut buf));
                true
            }
            _ => false,
        }
    }

    /// Lexes one chunk starting at the start delimiter.
    fn chunk(&mut self, indent: Option<String>) -> Result<(), TemplateError> {
        let (open_line, open_column) = (self.line, self.column);
        let starts_line = open_column == 1 || indent.is_some();
        self.bump();

        if self.peek() == Some('!') {
            return self.comment(open_line, open_column, indent);
        }

        let (line, column) = (self.line, self.column);
        let source = self.expression_source(open_line, open_column)?;
        let trimmed = source.trim();
        let lead = source.chars().count() - source.trim_start().chars().count();

        if let Some(marker) = classify_marker(trimmed, lead) {
            let alone = starts_line && (self.newline_len().is_some() || self.pos >= self.src.len());
            if alone {
                if let Some(len) = self.newline_len() {
                    for _ in 0..len {
                        self.bump();
                    }
                }
            } else if let Some(ws) = indent {
                self.push_text(&ws);
            }
            self.push_token(marker, line, column);
            return Ok(());
        }

        if let Some(text) = unescape_chunk(source.trim_start()).or_else(|| unescape_chunk(trimmed)) {
            if let Some(ws) = indent {
                self.push_text(&ws);
            }
            self.push_text(&text);
            return Ok(());
        }

        self.push_token(TokenKind::Expr { source, indent }, line, column);
        Ok(())
    }

    fn comment(
        &mut self,
        line: usize,
        column: usize,
        indent: Option<String>,
    ) -> Result<(), TemplateError> {
        let terminator: String = ['!', self.delimiters.stop].iter().collect();
        match self.rest().find(&terminator) {
            Some(end) => {
                let consumed = self.rest()[..end + terminator.len()].chars().count();
                for _ in 0..consumed {
                    self.bump();
                }
                if let Some(ws) = indent {
                    self.push_text(&ws);
                }
                Ok(())
            }
            None => Err(self.error(line, column, "unterminated comment")),
        }
    }

    /// Reads up to the matching stop delimiter, skipping over `{...}`
    /// anonymous template bodies and top-level string literals.
    fn expression_source(&mut self, line: usize, column: usize) -> Result<String, TemplateError> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut in_string = false;
        loop {
            let Some(c) = self.peek() else {
                let message = if depth > 0 {
                    "unterminated anonymous template: missing '}'"
                } else if in_string {
                    "unterminated string literal"
                } else {
                    "unterminated expression"
                };
                return Err(self.error(line, column, message));
            };

            if in_string {
                self.bump();
                if c == '\\' {
                    self.bump();
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }

            match c {
                '"' if depth == 0 => in_string = true,
                '\\' if depth > 0 => {
                    self.bump();
                }
                '{' => depth += 1,
                '}' if depth > 0 => depth -= 1,
                c if c == self.delimiters.stop && depth == 0 => {
                    let source = self.src[start..self.pos].to_string();
                    self.bump();
                    return Ok(source);
                }
                _ => {}
            }
            self.bump();
        }
    }
}

/// `lead` is the whitespace skipped before `content` in the chunk.
fn classify_marker(content: &str, lead: usize) -> Option<TokenKind> {
    match content {
        "else" => return Some(TokenKind::Else),
        "endif" => return Some(TokenKind::EndIf),
        _ => {}
    }
    if let Some((condition, offset)) = condition_of(content, "elseif") {
        return Some(TokenKind::ElseIf {
            condition,
            offset: lead + offset,
        });
    }
    condition_of(content, "if").map(|(condition, offset)| TokenKind::If {
        condition,
        offset: lead + offset,
    })
}

/// `if (cond)` -> `cond` and its character offset within `content`.
fn condition_of(content: &str, keyword: &str) -> Option<(String, usize)> {
    let rest = content.strip_prefix(keyword)?.trim_start();
    let opened = rest.strip_prefix('(')?;
    let inner = opened.strip_suffix(')')?;
    let offset = content[..content.len() - opened.len()].chars().count();
    Some((inner.to_string(), offset))
}

/// `$\n$`, `$\t$`, `$\ $`, `$é$`, or a run of them.
fn unescape_chunk(content: &str) -> Option<String> {
    if !content.starts_with('\\') {
        return None;
    }
    let mut out = String::new();
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            return None;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            ' ' => out.push(' '),
            'u' => {
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

pub(crate) fn tokenize(src: &str, delimiters: Delimiters) -> Result<Vec<Token>, TemplateError> {
    Lexer::new(src, delimiters).tokenize()
}
