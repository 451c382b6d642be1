//! Final emission.
//!
//! Once the layout is fixed and every symbol has a value, each operation resolves its operands
//! and appends commands or memory contents to the [`FinalRepresentation`].

use std::fmt;

use super::{
    allocator::{MemoryAllocator, RelativeMemoryPosition},
    arch::Architecture,
    error::CompileErrorList,
    expression::clike,
    source_position::SourcePositionSpan,
    symbols::SymbolTable,
};
use crate::ast::{DirectiveError, Operand, Operation, OperationKind};

/// A fully resolved operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOperand {
    Register(String),
    Immediate(clike::Value),
}

impl fmt::Display for ResolvedOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedOperand::Register(name) => write!(f, "{}", name),
            ResolvedOperand::Immediate(value) => write!(f, "{}", value),
        }
    }
}

/// An instruction bound to its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalCommand {
    pub mnemonic: String,
    pub operands: Vec<ResolvedOperand>,
    pub address: usize,
    pub span: SourcePositionSpan,
}

impl fmt::Display for FinalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}  {}", self.address, self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let separator = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", separator, operand)?;
        }
        Ok(())
    }
}

/// Content of an initialized memory block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryContent {
    /// Values written by a memory definition
    Bytes(Vec<u8>),
    /// A reserved block of the given length, filled with zeros
    Zeroed(usize),
}

impl MemoryContent {
    pub fn len(&self) -> usize {
        match self {
            MemoryContent::Bytes(bytes) => bytes.len(),
            MemoryContent::Zeroed(len) => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Initial memory content placed by a memory directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryInitialization {
    pub address: usize,
    pub content: MemoryContent,
}

impl fmt::Display for MemoryInitialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}  ", self.address)?;
        match &self.content {
            MemoryContent::Bytes(bytes) => {
                write!(f, ".data")?;
                for byte in bytes {
                    write!(f, " {:02x}", byte)?;
                }
                Ok(())
            }
            MemoryContent::Zeroed(len) => write!(f, ".zero {}", len),
        }
    }
}

/// Where a macro has been expanded and to what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroInformation {
    pub name: String,
    pub span: SourcePositionSpan,
    pub address: Option<usize>,
    pub expansion: String,
}

impl MacroInformation {
    /// Collects every expanded macro call, nested expansions before the call containing them.
    pub fn collect(
        operations: &[Operation],
        allocator: &MemoryAllocator,
        macros: &mut Vec<MacroInformation>,
    ) {
        for operation in operations {
            if let OperationKind::MacroInstance(instance) = &operation.kind {
                Self::collect(&instance.operations, allocator, macros);
                macros.push(MacroInformation {
                    name: instance.name.text.clone(),
                    span: instance.call.span,
                    address: instance.first_address(allocator),
                    expansion: instance.to_string(),
                });
            }
        }
    }
}

/// Result of a compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalRepresentation {
    pub commands: Vec<FinalCommand>,
    pub memory: Vec<MemoryInitialization>,
    pub macros: Vec<MacroInformation>,
    pub errors: CompileErrorList,
}

impl FinalRepresentation {
    pub fn new(errors: CompileErrorList) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }

    /// A representation of a compilation that stopped before emission.
    pub fn without_commands(errors: CompileErrorList, macros: Vec<MacroInformation>) -> Self {
        Self {
            macros,
            ..Self::new(errors)
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    pub fn command_at(&self, address: usize) -> Option<&FinalCommand> {
        self.commands.iter().find(|c| c.address == address)
    }
}

impl fmt::Display for FinalRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for command in &self.commands {
            writeln!(f, "{}", command)?;
        }
        for initialization in &self.memory {
            writeln!(f, "{}", initialization)?;
        }
        for information in &self.macros {
            writeln!(f, "; {} expanded at {}:", information.name, information.span.start)?;
            for line in information.expansion.lines() {
                writeln!(f, ";   {}", line)?;
            }
        }
        Ok(())
    }
}

/// Read-only state of the emission pass.
pub struct Emitter<'a> {
    pub architecture: &'a Architecture,
    pub allocator: &'a MemoryAllocator,
    pub symbols: &'a SymbolTable,
}

impl<'a> Emitter<'a> {
    fn address(&self, position: Option<&RelativeMemoryPosition>) -> usize {
        position
            .and_then(|p| self.allocator.absolute_address(p))
            .unwrap_or_default()
    }

    #[tracing::instrument(skip_all, fields(operations = operations.len()))]
    pub fn emit_all(
        &self,
        operations: &[Operation],
        output: &mut FinalRepresentation,
        errors: &mut CompileErrorList,
    ) {
        for operation in operations {
            self.emit(operation, output, errors);
        }
    }

    fn emit(
        &self,
        operation: &Operation,
        output: &mut FinalRepresentation,
        errors: &mut CompileErrorList,
    ) {
        let line = &operation.line;
        match &operation.kind {
            OperationKind::Instruction(instruction) => {
                let operands = line
                    .arguments
                    .iter()
                    .map(|argument| {
                        match Operand::classify(argument, |name| self.architecture.is_register(name))
                        {
                            Operand::Register(name) => ResolvedOperand::Register(name.to_owned()),
                            Operand::Expression(expression) => ResolvedOperand::Immediate(
                                clike::compile(expression, self.symbols, errors),
                            ),
                        }
                    })
                    .collect();
                output.commands.push(FinalCommand {
                    mnemonic: line.mnemonic.text.to_lowercase(),
                    operands,
                    address: self.address(instruction.position.as_ref()),
                    span: line.span,
                });
            }
            OperationKind::MemoryReservation(reservation) => {
                if reservation.size > 0 {
                    output.memory.push(MemoryInitialization {
                        address: self.address(reservation.position.as_ref()),
                        content: MemoryContent::Zeroed(reservation.size),
                    });
                }
            }
            OperationKind::MemoryDefinition(definition) => {
                if line.arguments.is_empty() {
                    errors.push_error(line.span, DirectiveError::EmptyDefinition);
                    return;
                }
                let mut bytes = Vec::with_capacity(line.arguments.len() * definition.width);
                for argument in &line.arguments {
                    let value = clike::compile(argument, self.symbols, errors);
                    let width = definition.width.min(std::mem::size_of::<clike::Value>());
                    bytes.extend_from_slice(&value.to_le_bytes()[..width]);
                }
                output.memory.push(MemoryInitialization {
                    address: self.address(definition.position.as_ref()),
                    content: MemoryContent::Bytes(bytes),
                });
            }
            OperationKind::MacroInstance(instance) => {
                self.emit_all(&instance.operations, output, errors);
            }
            OperationKind::Constant
            | OperationKind::Section
            | OperationKind::Macro(_)
            | OperationKind::MacroEnd => {}
        }
    }
}
