use std::fmt;

use thiserror::Error;

use super::{
    allocator::LayoutError, expression::ExpressionError, macros::MacroError, parser::ParseError,
    source_position::SourcePositionSpan, symbols::SymbolError,
};
use crate::ast::DirectiveError;

/// How bad a recorded diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum_macros::Display)]
pub enum Severity {
    #[strum(serialize = "information")]
    Information,
    #[strum(serialize = "warning")]
    Warning,
    #[strum(serialize = "error")]
    Error,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error(transparent)]
    Macro(#[from] MacroError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Directive(#[from] DirectiveError),
}

/// A single diagnostic, positioned in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: SourcePositionSpan,
    pub severity: Severity,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span.start, self.severity, self.kind)
    }
}

/// Append-only collection of diagnostics shared by every pass of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileErrorList {
    errors: Vec<CompileError>,
}

impl CompileErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        span: SourcePositionSpan,
        severity: Severity,
        kind: impl Into<CompileErrorKind>,
    ) {
        let error = CompileError {
            kind: kind.into(),
            span,
            severity,
        };
        tracing::debug!(%error, "recorded diagnostic");
        self.errors.push(error);
    }

    pub fn push_error(&mut self, span: SourcePositionSpan, kind: impl Into<CompileErrorKind>) {
        self.push(span, Severity::Error, kind);
    }

    pub fn push_warning(&mut self, span: SourcePositionSpan, kind: impl Into<CompileErrorKind>) {
        self.push(span, Severity::Warning, kind);
    }

    pub fn push_information(
        &mut self,
        span: SourcePositionSpan,
        kind: impl Into<CompileErrorKind>,
    ) {
        self.push(span, Severity::Information, kind);
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.errors.iter()
    }
}

impl<'a> IntoIterator for &'a CompileErrorList {
    type Item = &'a CompileError;
    type IntoIter = std::slice::Iter<'a, CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl fmt::Display for CompileErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}
