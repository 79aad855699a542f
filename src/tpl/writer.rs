use std::io;

/// Which writer implementation a render (and its isolated sub-renders) uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterStrategy {
    /// Re-applies the indentation stack after every newline.
    #[default]
    AutoIndent,
    /// Writes text exactly as produced.
    NoIndent,
}

impl WriterStrategy {
    /// A fresh writer of this strategy over `out`, with an empty
    /// indentation stack.
    pub fn writer<'a, W: io::Write + 'a>(self, out: W) -> Box<dyn TemplateWriter + 'a> {
        match self {
            WriterStrategy::AutoIndent => Box::new(AutoIndentWriter::new(out)),
            WriterStrategy::NoIndent => Box::new(NoIndentWriter::new(out)),
        }
    }
}

/// Character sink for rendered output.
///
/// `write` returns the number of characters written, including any
/// indentation the writer inserted.
pub trait TemplateWriter {
    fn push_indentation(&mut self, indent: &str);

    fn pop_indentation(&mut self);

    fn write(&mut self, text: &str) -> io::Result<usize>;

    fn strategy(&self) -> WriterStrategy;
}

/// Indentation-aware writer: text written at the start of a line is
/// prefixed with the concatenated indentation stack.
pub struct AutoIndentWriter<W: io::Write> {
    out: W,
    indents: Vec<String>,
    at_start_of_line: bool,
}

impl<W: io::Write> AutoIndentWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            indents: Vec::new(),
            at_start_of_line: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn indent(&mut self) -> io::Result<usize> {
        let mut n = 0;
        for indent in &self.indents {
            self.out.write_all(indent.as_bytes())?;
            n += indent.chars().count();
        }
        Ok(n)
    }
}

impl<W: io::Write> TemplateWriter for AutoIndentWriter<W> {
    fn push_indentation(&mut self, indent: &str) {
        self.indents.push(indent.to_string());
    }

    fn pop_indentation(&mut self) {
        self.indents.pop();
    }

    fn write(&mut self, text: &str) -> io::Result<usize> {
        let mut n = 0;
        let mut buf = [0u8; 4];
        for c in text.chars() {
            match c {
                '\n' => self.at_start_of_line = true,
                '\r' => {}
                _ if self.at_start_of_line => {
                    n += self.indent()?;
                    self.at_start_of_line = false;
                }
                _ => {}
            }
            self.out.write_all(c.encode_utf8(&mut buf).as_bytes())?;
            n += 1;
        }
        Ok(n)
    }

    fn strategy(&self) -> WriterStrategy {
        WriterStrategy::AutoIndent
    }
}

/// Writes text verbatim; indentation requests are ignored.
pub struct NoIndentWriter<W: io::Write> {
    out: W,
}

impl<W: io::Write> NoIndentWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: io::Write> TemplateWriter for NoIndentWriter<W> {
    fn push_indentation(&mut self, _indent: &str) {}

    fn pop_indentation(&mut self) {}

    fn write(&mut self, text: &str) -> io::Result<usize> {
        self.out.write_all(text.as_bytes())?;
        Ok(text.chars().count())
    }

    fn strategy(&self) -> WriterStrategy {
        WriterStrategy::NoIndent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indents_every_line_start() {
        let mut buf = Vec::new();
        let mut w = AutoIndentWriter::new(&mut buf);
        w.push_indentation("  ");
        let n = w.write("a\nb\n").unwrap();
        w.pop_indentation();
        w.write("c").unwrap();
        assert_eq!(n, 8);
        assert_eq!(String::from_utf8(buf).unwrap(), "  a\n  b\nc");
    }

    #[test]
    fn test_nested_indentation_concatenates() {
        let mut buf = Vec::new();
        let mut w = AutoIndentWriter::new(&mut buf);
        w.push_indentation("  ");
        w.push_indentation("\t");
        w.write("x\r\ny").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "  \tx\r\n  \ty");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let mut buf = Vec::new();
        let mut w = NoIndentWriter::new(&mut buf);
        w.push_indentation("    ");
        assert_eq!(w.write("héllo\n").unwrap(), 6);
        assert_eq!(String::from_utf8(buf).unwrap(), "héllo\n");
    }

    #[test]
    fn test_strategy_builds_matching_writer() {
        let mut buf = Vec::new();
        {
            let mut w = WriterStrategy::NoIndent.writer(&mut buf);
            assert_eq!(w.strategy(), WriterStrategy::NoIndent);
            w.write("sep").unwrap();
        }
        assert_eq!(buf, b"sep");
    }
}
