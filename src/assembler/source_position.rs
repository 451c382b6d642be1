use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn increment_column(&mut self) {
        self.column += 1;
    }

    pub fn increment_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    /// Position reached after walking over `text` starting at `self`.
    pub fn advanced_by(mut self, text: &str) -> Self {
        for ch in text.chars() {
            if ch == '\n' {
                self.increment_line();
            } else {
                self.increment_column();
            }
        }
        self
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
pub struct SourcePositionSpan {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourcePositionSpan {
    pub fn new(start: SourcePosition, end: SourcePosition) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn unite(&self, other: &SourcePositionSpan) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for SourcePositionSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// An owned piece of source text together with the span it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct PositionedString {
    pub text: String,
    pub span: SourcePositionSpan,
}

impl PositionedString {
    pub fn new(text: &str, span: SourcePositionSpan) -> Self {
        Self {
            text: text.to_owned(),
            span,
        }
    }

    /// A positioned string that starts at `start` and whose end is derived from its text.
    pub fn at(text: &str, start: SourcePosition) -> Self {
        Self::new(text, SourcePositionSpan::new(start, start.advanced_by(text)))
    }

    /// Text without a meaningful position, e.g. generated values.
    pub fn unpositioned(text: &str) -> Self {
        Self::new(text, SourcePositionSpan::default())
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Sub-string of `len` bytes starting at byte `offset`, positioned inside this string.
    ///
    /// Offsets past the end are clamped.
    pub fn slice(&self, offset: usize, len: usize) -> PositionedString {
        let begin = offset.min(self.text.len());
        let end = (begin + len).min(self.text.len());
        let start = self.span.start.advanced_by(&self.text[..begin]);
        PositionedString::at(&self.text[begin..end], start)
    }
}

impl fmt::Display for PositionedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_slice_keeps_position() {
        let text = PositionedString::at("foo + bar", SourcePosition::new(3, 5));
        let bar = text.slice(6, 3);
        assert_eq!(bar.text, "bar");
        assert_eq!(bar.span.start, SourcePosition::new(3, 11));
        assert_eq!(bar.span.end, SourcePosition::new(3, 14));
    }

    #[test]
    fn test_slice_is_clamped() {
        let text = PositionedString::at("ab", SourcePosition::default());
        assert_eq!(text.slice(1, 10).text, "b");
        assert_eq!(text.slice(5, 1).text, "");
    }

    #[test]
    fn test_unite() {
        let a = SourcePositionSpan::new(SourcePosition::new(1, 4), SourcePosition::new(1, 8));
        let b = SourcePositionSpan::new(SourcePosition::new(1, 2), SourcePosition::new(1, 6));
        let united = a.unite(&b);
        assert_eq!(united.start, SourcePosition::new(1, 2));
        assert_eq!(united.end, SourcePosition::new(1, 8));
    }
}
