//! Intermediate operations.
//!
//! Every line of the program that does something is turned into an [`Operation`]: the parsed
//! [`SourceLine`] together with the [`OperationKind`] that decides how the line takes part in the
//! compilation passes.

use std::fmt;

use thiserror::Error;

use crate::assembler::{
    macros::{MacroDirective, MacroInstance},
    source_position::{PositionedString, SourcePositionSpan},
};

pub mod directive;
pub mod instruction;

pub use directive::{DirectiveKind, MemoryDefinition, MemoryReservation};
pub use instruction::{Instruction, Operand};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("Constant name is missing")]
    MissingConstantName,
    #[error("Constant '{0}' is missing a value")]
    MissingConstantValue(String),
    #[error("Too many operands for '{0}'")]
    TooManyOperands(String),
    #[error("Instruction '{0}' must be placed in the text section")]
    InstructionOutsideText(String),
    #[error("Unknown instruction: '{0}'")]
    UnknownInstruction(String),
    #[error("Memory reservation in the text section")]
    ReservationInText,
    #[error("Memory definition in the text section")]
    DefinitionInText,
    #[error("Memory reservation without sizes")]
    EmptyReservation,
    #[error("Reserving zero bytes")]
    ZeroReservation,
    #[error("Invalid reservation size: {0}")]
    InvalidReservationSize(i64),
    #[error("Memory definition without values")]
    EmptyDefinition,
}

/// A single line of the program as it was written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLine {
    /// Span of the whole line
    pub span: SourcePositionSpan,
    /// Labels in front of the operation, e.g. `loop:`
    pub labels: Vec<PositionedString>,
    /// Mnemonic or directive name
    pub mnemonic: PositionedString,
    /// Comma separated operands
    pub arguments: Vec<PositionedString>,
}

impl SourceLine {
    pub fn new(
        span: SourcePositionSpan,
        labels: Vec<PositionedString>,
        mnemonic: PositionedString,
        arguments: Vec<PositionedString>,
    ) -> Self {
        Self {
            span,
            labels,
            mnemonic,
            arguments,
        }
    }

    /// Replaces every `\name` that is not followed by a word character with `value`.
    pub fn substitute(&mut self, name: &str, value: &str) {
        let search = format!("\\{}", name);
        for argument in self.arguments.iter_mut() {
            let mut text = argument.text.clone();
            let mut position = 0;
            while let Some(found) = text[position..].find(&search) {
                let start = position + found;
                let end = start + search.len();
                let followed_by_word = text[end..]
                    .chars()
                    .next()
                    .map_or(false, |c| c.is_alphanumeric() || c == '_');
                if followed_by_word {
                    position = end;
                    continue;
                }
                text.replace_range(start..end, value);
                position = start + value.len();
            }
            argument.text = text;
        }
    }
}

impl fmt::Display for SourceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{}: ", label)?;
        }
        write!(f, "{}", self.mnemonic)?;
        for (i, argument) in self.arguments.iter().enumerate() {
            let separator = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", separator, argument.as_str().trim())?;
        }
        Ok(())
    }
}

/// The role an operation plays in the compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Instruction(Instruction),
    Constant,
    Section,
    /// Definition of a macro, holding the operations of its body
    Macro(MacroDirective),
    MacroEnd,
    MemoryReservation(MemoryReservation),
    MemoryDefinition(MemoryDefinition),
    /// Expanded call of a macro
    MacroInstance(MacroInstance),
}

impl OperationKind {
    pub fn from_directive(kind: DirectiveKind, line: &SourceLine) -> Self {
        match kind {
            DirectiveKind::Constant => OperationKind::Constant,
            DirectiveKind::Section => OperationKind::Section,
            DirectiveKind::Macro => OperationKind::Macro(MacroDirective::from_line(line)),
            DirectiveKind::MacroEnd => OperationKind::MacroEnd,
            DirectiveKind::ReserveBytes
            | DirectiveKind::ReserveHalfs
            | DirectiveKind::ReserveWords
            | DirectiveKind::ReserveDoubles => OperationKind::MemoryReservation(
                MemoryReservation::new(kind.cell_size().unwrap_or(1)),
            ),
            DirectiveKind::Byte | DirectiveKind::Half | DirectiveKind::Word | DirectiveKind::Double => {
                OperationKind::MemoryDefinition(MemoryDefinition::new(kind.cell_size().unwrap_or(1)))
            }
        }
    }
}

/// One operation of the intermediate representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub line: SourceLine,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(line: SourceLine, kind: OperationKind) -> Self {
        Self { line, kind }
    }

    pub fn instruction(line: SourceLine) -> Self {
        Self::new(line, OperationKind::Instruction(Instruction::new()))
    }

    pub fn name(&self) -> &PositionedString {
        &self.line.mnemonic
    }

    pub fn span(&self) -> SourcePositionSpan {
        self.line.span
    }

    pub fn is_instruction(&self) -> bool {
        matches!(self.kind, OperationKind::Instruction(_))
    }

    /// Whether the operation can be part of a macro body.
    pub fn is_expandable(&self) -> bool {
        matches!(
            self.kind,
            OperationKind::Instruction(_)
                | OperationKind::MemoryReservation(_)
                | OperationKind::MemoryDefinition(_)
        )
    }

    /// Span covering all labels, or the line if there are none.
    pub fn label_span(&self) -> SourcePositionSpan {
        let mut labels = self.line.labels.iter();
        match labels.next() {
            Some(first) => labels.fold(first.span, |span, label| span.unite(&label.span)),
            None => self.line.span,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::MacroInstance(instance) => write!(f, "{}", instance),
            _ => writeln!(f, "{}", self.line),
        }
    }
}

/// All operations of a program in source order.
pub type Program = Vec<Operation>;
