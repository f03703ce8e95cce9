use serde::{Deserialize, Serialize};

/// Source code span with byte offsets and 1-indexed line/column positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    pub end_column: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        end_line: usize,
        start_column: usize,
        end_column: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            end_line,
            start_column,
            end_column,
        }
    }

    /// Zero-width span at the start of a buffer.
    pub fn point() -> Self {
        Self::new(0, 0, 1, 1, 1, 1)
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: &Span) -> Span {
        let (start, start_line, start_column) = if self.start <= other.start {
            (self.start, self.start_line, self.start_column)
        } else {
            (other.start, other.start_line, other.start_column)
        };
        let (end, end_line, end_column) = if self.end >= other.end {
            (self.end, self.end_line, self.end_column)
        } else {
            (other.end, other.end_line, other.end_column)
        };
        Span::new(start, end, start_line, end_line, start_column, end_column)
    }
}

/// Append-only buffer for synthesized source text.
///
/// Host values quoted into the typed tree have no original source, so the
/// synthesizer renders a readable fragment here and every synthesized node
/// gets a span into this buffer. Diagnostics can then display context for
/// code the author never wrote.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceBuffer {
    pub name: String,
    text: String,
    line: usize,
    column: usize,
}

impl SourceBuffer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: String::new(),
            line: 1,
            column: 1,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Append a fragment and return the span covering it.
    pub fn push(&mut self, fragment: &str) -> Span {
        let start = self.text.len();
        let start_line = self.line;
        let start_column = self.column;
        for ch in fragment.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.text.push_str(fragment);
        Span::new(
            start,
            self.text.len(),
            start_line,
            self.line,
            start_column,
            self.column,
        )
    }
}
