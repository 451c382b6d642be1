use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use strum::VariantNames;
use thiserror::Error;

use super::{
    error::CompileErrorList,
    source_position::{PositionedString, SourcePosition},
};
use crate::ast::{DirectiveKind, Operation, OperationKind, Program, SourceLine};

lazy_static! {
    static ref LABEL: Regex = Regex::new(r#"^\s*([^\s:;,'"()]+)\s*:"#).unwrap();
}

const COMMENT: char = ';';
const ARGUMENT_SEPARATOR: char = ',';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown directive '{name}', expected one of: {expected}")]
    UnknownDirective { name: String, expected: String },
    #[error("Unterminated quote")]
    UnterminatedQuote,
    #[error("Label '{0}' does not point to anything")]
    DanglingLabel(String),
}

/// Reads the program line by line.
///
/// A line consists of any number of `label:` prefixes, followed by a mnemonic or directive and its
/// comma separated operands. Everything after a `;` is a comment.
pub struct Parser<'a> {
    input: &'a str,
    /// Labels waiting for an operation to attach to
    pending_labels: Vec<PositionedString>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pending_labels: Vec::new(),
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn parse_program(&mut self, errors: &mut CompileErrorList) -> Program {
        let mut program = Program::new();

        for (index, text) in self.input.lines().enumerate() {
            let line = PositionedString::at(text, SourcePosition::new(index + 1, 1));
            if let Some(operation) = self.parse_line(&line, errors) {
                program.push(operation);
            }
        }

        for label in self.pending_labels.drain(..) {
            errors.push_error(label.span, ParseError::DanglingLabel(label.text.clone()));
        }

        tracing::debug!(operations = program.len(), "parsed program");
        program
    }

    fn parse_line(
        &mut self,
        line: &PositionedString,
        errors: &mut CompileErrorList,
    ) -> Option<Operation> {
        let code_length = match strip_comment(line.as_str()) {
            Ok(length) => length,
            Err(error) => {
                errors.push_error(line.span, error);
                line.text.len()
            }
        };
        let code = line.slice(0, code_length);

        let mut offset = self.parse_labels(&code);

        let rest = &code.as_str()[offset..];
        let leading = rest.len() - rest.trim_start().len();
        offset += leading;
        let rest = rest.trim();
        if rest.is_empty() {
            return None;
        }

        let mnemonic_length = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let mnemonic = code.slice(offset, mnemonic_length);
        offset += mnemonic_length;
        let arguments = split_arguments(&code, offset);

        let kind = if mnemonic.as_str().starts_with('.') {
            match DirectiveKind::from_str(mnemonic.as_str()) {
                Ok(kind) => Some(kind),
                Err(_) => {
                    errors.push_error(
                        mnemonic.span,
                        ParseError::UnknownDirective {
                            name: mnemonic.text.clone(),
                            expected: DirectiveKind::VARIANTS.join(", "),
                        },
                    );
                    return None;
                }
            }
        } else {
            None
        };

        // Directives without memory hand their labels on to the next operation
        let keeps_labels = !matches!(
            kind,
            Some(
                DirectiveKind::Constant
                    | DirectiveKind::Section
                    | DirectiveKind::Macro
                    | DirectiveKind::MacroEnd
            )
        );
        let labels = if keeps_labels {
            std::mem::take(&mut self.pending_labels)
        } else {
            Vec::new()
        };

        let source_line = SourceLine::new(code.span, labels, mnemonic, arguments);
        Some(match kind {
            Some(kind) => {
                let operation_kind = OperationKind::from_directive(kind, &source_line);
                Operation::new(source_line, operation_kind)
            }
            None => Operation::instruction(source_line),
        })
    }

    /// Collects `label:` prefixes and returns the offset behind them.
    fn parse_labels(&mut self, code: &PositionedString) -> usize {
        let mut offset = 0;
        while let Some(captures) = LABEL.captures(&code.as_str()[offset..]) {
            if let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) {
                self.pending_labels
                    .push(code.slice(offset + name.start(), name.len()));
                offset += whole.end();
            } else {
                break;
            }
        }
        offset
    }
}

/// Length of the line without its comment.
fn strip_comment(line: &str) -> Result<usize, ParseError> {
    let mut quote = None;
    let mut escaped = false;
    for (index, ch) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if ch == '\\' => escaped = true,
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch == COMMENT => return Ok(index),
            None => {}
        }
    }
    match quote {
        Some(_) => Err(ParseError::UnterminatedQuote),
        None => Ok(line.len()),
    }
}

/// Splits the operands starting at `offset` on commas outside of brackets and quotes.
fn split_arguments(code: &PositionedString, offset: usize) -> Vec<PositionedString> {
    let text = &code.as_str()[offset..];
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut arguments = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    let mut start = 0;

    let mut push = |start: usize, end: usize| {
        let raw = &text[start..end];
        let leading = raw.len() - raw.trim_start().len();
        arguments.push(code.slice(offset + start + leading, raw.trim().len()));
    };

    for (index, ch) in text.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if ch == '\\' => escaped = true,
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ARGUMENT_SEPARATOR if depth == 0 => {
                    push(start, index);
                    start = index + 1;
                }
                _ => {}
            },
        }
    }
    push(start, text.len());
    arguments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::error::CompileErrorKind;

    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> (Program, CompileErrorList) {
        let mut errors = CompileErrorList::new();
        let program = Parser::new(input).parse_program(&mut errors);
        (program, errors)
    }

    fn texts(strings: &[PositionedString]) -> Vec<&str> {
        strings.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn test_parse_instruction() {
        let (program, errors) = parse("start: loop:  addi x1, x1, max(1, 2) ; increment\n");
        assert!(errors.is_empty());
        assert_eq!(program.len(), 1);

        let line = &program[0].line;
        assert_eq!(texts(&line.labels), vec!["start", "loop"]);
        assert_eq!(line.mnemonic.as_str(), "addi");
        assert_eq!(texts(&line.arguments), vec!["x1", "x1", "max(1, 2)"]);
        assert_eq!(line.arguments[2].span.start, SourcePosition::new(1, 28));
        assert!(program[0].is_instruction());
    }

    #[test]
    fn test_parse_directives() {
        let (program, errors) = parse(
            "
            .equ SIZE, 4
            .section data
            table: .word 1, ',', SIZE
            .resb 16
            ",
        );
        assert!(errors.is_empty());
        assert_eq!(program.len(), 4);
        assert_eq!(program[0].kind, OperationKind::Constant);
        assert_eq!(program[1].kind, OperationKind::Section);
        assert!(matches!(
            program[2].kind,
            OperationKind::MemoryDefinition(ref d) if d.width == 4
        ));
        assert_eq!(texts(&program[2].line.arguments), vec!["1", "','", "SIZE"]);
        assert!(matches!(
            program[3].kind,
            OperationKind::MemoryReservation(ref r) if r.cell_size == 1
        ));
    }

    #[test]
    fn test_labels_move_past_directives() {
        let (program, errors) = parse("value:\n.section data\n.byte 1\n");
        assert!(errors.is_empty());
        assert!(program[0].line.labels.is_empty());
        assert_eq!(texts(&program[1].line.labels), vec!["value"]);
    }

    #[test]
    fn test_ternary_is_not_a_label() {
        let (program, _) = parse("li x1, 1 ? 2 : 3");
        assert!(program[0].line.labels.is_empty());
        assert_eq!(texts(&program[0].line.arguments), vec!["x1", "1 ? 2 : 3"]);
    }

    #[test]
    fn test_errors() {
        let (program, errors) = parse(".org 0x100\nli x1, ';\nend:\n");
        assert_eq!(program.len(), 1);
        let kinds: Vec<&CompileErrorKind> = errors.iter().map(|e| &e.kind).collect();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(
            kinds[0],
            CompileErrorKind::Parse(ParseError::UnknownDirective { name, .. }) if name == ".org"
        ));
        assert_eq!(
            kinds[1],
            &CompileErrorKind::Parse(ParseError::UnterminatedQuote)
        );
        assert_eq!(
            kinds[2],
            &CompileErrorKind::Parse(ParseError::DanglingLabel("end".to_string()))
        );
    }
}
