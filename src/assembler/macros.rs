//! Macros.
//!
//! A macro is defined between `.macro name, param, param=default` and `.endm`. Calls look like
//! instructions whose mnemonic is the macro name. A macro is identified by its name together
//! with the number of arguments, so a macro with default values is registered once for every
//! argument count it accepts.

use std::{collections::HashMap, fmt};

use thiserror::Error;

use super::{
    allocator::MemoryAllocator,
    error::CompileErrorList,
    source_position::{PositionedString, SourcePositionSpan},
};
use crate::ast::{Operation, OperationKind, SourceLine};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacroError {
    #[error("Macro name is missing")]
    MissingName,
    #[error("Malformed macro argument list")]
    MalformedParameterList,
    #[error("Default macro argument values have to be placed last")]
    DefaultNotLast,
    #[error("Macro already exists: '{0}'")]
    AlreadyExists(String),
    #[error("Cyclic macro call detected: '{0}'")]
    Cyclic(String),
    #[error("Macro definitions cannot be nested")]
    NestedDefinition,
    #[error("Macro start directive missing")]
    MissingStart,
    #[error("Macro '{0}' is not closed")]
    NotClosed(String),
    #[error("Labels cannot point to macros without instructions")]
    LabelsWithoutInstructions,
    #[error("Macro contains unsupported operation '{0}'")]
    UnsupportedOperation(String),
}

/// A macro parameter and its optional default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroParameter {
    pub name: PositionedString,
    pub default: Option<PositionedString>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroParameters {
    parameters: Vec<MacroParameter>,
    min_parameters: usize,
}

impl MacroParameters {
    /// Splits each argument on the first `=` into name and default value.
    pub fn new(arguments: &[PositionedString]) -> Self {
        let mut parameters = Vec::with_capacity(arguments.len());
        let mut min_parameters = 0;
        for argument in arguments {
            let text = argument.as_str();
            let parameter = match text.find('=') {
                Some(equals) => MacroParameter {
                    name: PositionedString::new(text[..equals].trim(), argument.span),
                    default: Some(PositionedString::new(
                        text[equals + 1..].trim(),
                        argument.span,
                    )),
                },
                None => {
                    min_parameters += 1;
                    MacroParameter {
                        name: PositionedString::new(text.trim(), argument.span),
                        default: None,
                    }
                }
            };
            parameters.push(parameter);
        }
        Self {
            parameters,
            min_parameters,
        }
    }

    /// Smallest and largest admissible argument count.
    pub fn count(&self) -> (usize, usize) {
        (self.min_parameters, self.parameters.len())
    }

    /// Records the first problem of the parameter list, returns whether it is well-formed.
    pub fn validate(&self, errors: &mut CompileErrorList) -> bool {
        let mut contained_default = false;
        let mut last_span = SourcePositionSpan::default();
        for parameter in &self.parameters {
            let empty_default = parameter.default.as_ref().map_or(false, |d| d.is_empty());
            if parameter.name.is_empty() || empty_default {
                errors.push_error(parameter.name.span, MacroError::MalformedParameterList);
                return false;
            }
            if parameter.default.is_some() {
                contained_default = true;
            } else if contained_default {
                errors.push_error(last_span, MacroError::DefaultNotLast);
                return false;
            }
            last_span = parameter.name.span;
        }
        true
    }

    /// Pairs every parameter with the supplied argument or its default value.
    ///
    /// The argument count has been validated by the table lookup.
    pub fn bind<'a>(&'a self, arguments: &'a [PositionedString]) -> Vec<(&'a str, &'a str)> {
        self.parameters
            .iter()
            .enumerate()
            .filter_map(|(i, parameter)| {
                let value = match arguments.get(i) {
                    Some(argument) => argument.as_str().trim(),
                    None => parameter.default.as_ref()?.as_str(),
                };
                Some((parameter.name.as_str(), value))
            })
            .collect()
    }
}

/// A macro definition and its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDirective {
    pub name: PositionedString,
    pub parameters: MacroParameters,
    pub operations: Vec<Operation>,
    pub span: SourcePositionSpan,
}

impl MacroDirective {
    /// Reads the name and parameters from `.macro name, param, param=default`.
    pub fn from_line(line: &SourceLine) -> Self {
        let name = line
            .arguments
            .first()
            .map(|name| PositionedString::new(name.as_str().trim(), name.span))
            .unwrap_or_else(|| PositionedString::new("", line.mnemonic.span));
        let parameters = MacroParameters::new(line.arguments.get(1..).unwrap_or_default());
        Self {
            name,
            parameters,
            operations: Vec::new(),
            span: line.span,
        }
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Validates the definition and registers it in the table.
    #[tracing::instrument(skip_all, fields(name = %self.name))]
    pub fn precompile(&self, table: &mut MacroTable, errors: &mut CompileErrorList) {
        if self.name.is_empty() {
            errors.push_error(self.span, MacroError::MissingName);
            return;
        }
        if !self.parameters.validate(errors) {
            return;
        }
        if let Err(error) = table.insert(self.clone()) {
            errors.push_error(self.name.span, error);
        }
    }

    /// Copies the body for a call, with the parameters replaced by the call's arguments.
    pub fn instantiate(&self, call: &SourceLine, errors: &mut CompileErrorList) -> MacroInstance {
        let bindings = self.parameters.bind(&call.arguments);
        let mut operations = Vec::with_capacity(self.operations.len());

        for operation in &self.operations {
            if !operation.is_expandable() {
                errors.push_error(
                    operation.name().span,
                    MacroError::UnsupportedOperation(operation.name().text.clone()),
                );
                continue;
            }
            let mut operation = operation.clone();
            for (name, value) in &bindings {
                operation.line.substitute(name, value);
            }
            operations.push(operation);
        }

        MacroInstance {
            name: call.mnemonic.clone(),
            call: call.clone(),
            first_instruction: operations.iter().position(Operation::is_instruction),
            operations,
        }
    }
}

type MacroKey = (String, usize);

/// All macros of a compilation, keyed by name and argument count.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: HashMap<MacroKey, MacroDirective>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the macro for every argument count it accepts.
    ///
    /// Fails without modifying the table if any of those counts is taken.
    pub fn insert(&mut self, directive: MacroDirective) -> Result<(), MacroError> {
        let name = directive.name.text.clone();
        let (min, max) = directive.parameters.count();
        if (min..=max).any(|count| self.macros.contains_key(&(name.clone(), count))) {
            return Err(MacroError::AlreadyExists(name));
        }
        for count in min..=max {
            self.macros.insert((name.clone(), count), directive.clone());
        }
        tracing::debug!(%name, min, max, "registered macro");
        Ok(())
    }

    pub fn find(&self, name: &str, argument_count: usize) -> Option<&MacroDirective> {
        self.macros.get(&(name.to_owned(), argument_count))
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// An expanded macro call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroInstance {
    pub name: PositionedString,
    /// The line containing the call
    pub call: SourceLine,
    pub operations: Vec<Operation>,
    pub first_instruction: Option<usize>,
}

impl MacroInstance {
    /// An instance that expands to nothing, used when the call cannot be expanded.
    pub fn empty(call: &SourceLine) -> Self {
        Self {
            name: call.mnemonic.clone(),
            call: call.clone(),
            operations: Vec::new(),
            first_instruction: None,
        }
    }

    /// Address of the first instruction of the expansion, once memory has been laid out.
    pub fn first_address(&self, allocator: &MemoryAllocator) -> Option<usize> {
        let operation = self.operations.get(self.first_instruction?)?;
        match &operation.kind {
            OperationKind::Instruction(instruction) => {
                allocator.absolute_address(instruction.position.as_ref()?)
            }
            OperationKind::MacroInstance(instance) => instance.first_address(allocator),
            _ => None,
        }
    }
}

impl fmt::Display for MacroInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for operation in &self.operations {
            write!(f, "{}", operation)?;
        }
        Ok(())
    }
}

/// Replaces every call of a known macro by its expansion.
///
/// Expansions are expanded again. `stack` holds the macros currently being expanded; calling one
/// of them again is reported as a cycle.
#[tracing::instrument(skip_all)]
pub fn expand_macros(
    operations: &mut [Operation],
    table: &MacroTable,
    stack: &mut Vec<MacroKey>,
    errors: &mut CompileErrorList,
) {
    for operation in operations.iter_mut() {
        if !operation.is_instruction() {
            continue;
        }
        let key = (
            operation.line.mnemonic.text.clone(),
            operation.line.arguments.len(),
        );
        let directive = match table.find(&key.0, key.1) {
            Some(directive) => directive,
            None => continue,
        };

        if stack.contains(&key) {
            errors.push_error(
                operation.line.mnemonic.span,
                MacroError::Cyclic(key.0.clone()),
            );
            operation.kind = OperationKind::MacroInstance(MacroInstance::empty(&operation.line));
            continue;
        }

        let mut instance = directive.instantiate(&operation.line, errors);
        stack.push(key);
        expand_macros(&mut instance.operations, table, stack, errors);
        stack.pop();

        tracing::trace!(name = %instance.name, operations = instance.operations.len(), "expanded macro");
        operation.kind = OperationKind::MacroInstance(instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::error::CompileErrorKind;

    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<PositionedString> {
        items
            .iter()
            .map(|item| PositionedString::unpositioned(item))
            .collect()
    }

    fn line(mnemonic: &str, arguments: &[&str]) -> SourceLine {
        SourceLine::new(
            SourcePositionSpan::default(),
            vec![],
            PositionedString::unpositioned(mnemonic),
            strings(arguments),
        )
    }

    fn definition(arguments: &[&str], body: &[(&str, &[&str])]) -> MacroDirective {
        let mut directive = MacroDirective::from_line(&line(".macro", arguments));
        for (mnemonic, arguments) in body {
            directive.push(Operation::instruction(line(mnemonic, arguments)));
        }
        directive
    }

    fn macro_errors(errors: &CompileErrorList) -> Vec<MacroError> {
        errors
            .iter()
            .filter_map(|e| match &e.kind {
                CompileErrorKind::Macro(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_parameters() {
        let parameters = MacroParameters::new(&strings(&["a", "b = 4", "c=x1"]));
        assert_eq!(parameters.count(), (1, 3));

        let arguments = strings(&["1", " 2"]);
        assert_eq!(
            parameters.bind(&arguments),
            vec![("a", "1"), ("b", "2"), ("c", "x1")]
        );
    }

    #[test]
    fn test_malformed_parameters() {
        let mut errors = CompileErrorList::new();
        assert!(!MacroParameters::new(&strings(&["a=1", "b"])).validate(&mut errors));
        assert!(!MacroParameters::new(&strings(&["a", "=1"])).validate(&mut errors));
        assert!(!MacroParameters::new(&strings(&["a", "b="])).validate(&mut errors));
        assert!(MacroParameters::new(&strings(&["a", "b=1"])).validate(&mut errors));
        assert_eq!(
            macro_errors(&errors),
            vec![
                MacroError::DefaultNotLast,
                MacroError::MalformedParameterList,
                MacroError::MalformedParameterList,
            ]
        );
    }

    #[test]
    fn test_table_collision() {
        let mut table = MacroTable::new();
        assert_eq!(table.insert(definition(&["foo", "a", "b=1"], &[])), Ok(()));
        assert!(table.find("foo", 1).is_some());
        assert!(table.find("foo", 2).is_some());
        assert!(table.find("foo", 0).is_none());

        assert_eq!(
            table.insert(definition(&["foo", "a"], &[])),
            Err(MacroError::AlreadyExists("foo".to_string()))
        );
        assert_eq!(table.insert(definition(&["foo"], &[])), Ok(()));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_missing_name() {
        let mut table = MacroTable::new();
        let mut errors = CompileErrorList::new();
        definition(&[], &[]).precompile(&mut table, &mut errors);
        assert_eq!(macro_errors(&errors), vec![MacroError::MissingName]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_instantiate_is_independent() {
        let directive = definition(&["inc", "r", "n=1"], &[("addi", &["\\r", "\\r", "\\n"])]);
        let mut errors = CompileErrorList::new();

        let mut first = directive.instantiate(&line("inc", &["x1"]), &mut errors);
        let second = directive.instantiate(&line("inc", &["x2", "8"]), &mut errors);
        first.operations[0].line.arguments.clear();

        assert!(errors.is_empty());
        assert_eq!(second.first_instruction, Some(0));
        let arguments: Vec<&str> = second.operations[0]
            .line
            .arguments
            .iter()
            .map(|a| a.as_str())
            .collect();
        assert_eq!(arguments, vec!["x2", "x2", "8"]);
        assert_eq!(directive.operations[0].line.arguments[0].as_str(), "\\r");
    }

    #[test]
    fn test_nested_expansion() {
        let mut table = MacroTable::new();
        let mut errors = CompileErrorList::new();
        definition(&["inner", "a"], &[("nop", &[]), ("li", &["x1", "\\a"])])
            .precompile(&mut table, &mut errors);
        definition(&["outer"], &[("inner", &["7"]), ("ret", &[])])
            .precompile(&mut table, &mut errors);

        let mut program = vec![Operation::instruction(line("outer", &[]))];
        expand_macros(&mut program, &table, &mut Vec::new(), &mut errors);
        assert!(errors.is_empty());

        let outer = match &program[0].kind {
            OperationKind::MacroInstance(instance) => instance,
            other => panic!("expected macro instance, got {:?}", other),
        };
        assert_eq!(outer.to_string(), "nop\nli x1, 7\nret\n");
    }

    #[test]
    fn test_cyclic_expansion() {
        let mut table = MacroTable::new();
        let mut errors = CompileErrorList::new();
        definition(&["ping"], &[("pong", &[])]).precompile(&mut table, &mut errors);
        definition(&["pong"], &[("ping", &[])]).precompile(&mut table, &mut errors);

        let mut program = vec![Operation::instruction(line("ping", &[]))];
        expand_macros(&mut program, &table, &mut Vec::new(), &mut errors);
        assert_eq!(
            macro_errors(&errors),
            vec![MacroError::Cyclic("ping".to_string())]
        );
    }
}
