//! The intermediate operation graph and the passes transforming it.
//!
//! Operations are inserted in source order. [`IntermediateRepresentation::transform`] then walks
//! them in three passes:
//!
//! 1. **Precompile**: macros are registered and expanded, constants become symbols.
//! 2. **Allocation**: every operation occupying memory reserves it in its section. After the
//!    layout has been finalized, labels become symbols holding their absolute address.
//! 3. **Emission**: if all symbols could be resolved, operands are compiled and the
//!    [`FinalRepresentation`] is built.
//!
//! Errors do not stop a pass, but an invalid symbol graph or exceeded memory skips emission.

use super::{
    allocator::{
        LayoutError, MemoryAllocator, RelativeMemoryPosition, SectionTracker, INITIAL_SECTION,
    },
    arch::Architecture,
    codegen::{Emitter, FinalRepresentation, MacroInformation},
    error::CompileErrorList,
    expression::{clike, NoSymbols},
    macros::{expand_macros, MacroError, MacroTable},
    source_position::{PositionedString, SourcePositionSpan},
    symbols::{Symbol, SymbolBehavior, SymbolGraph, SymbolTable},
};
use crate::ast::{DirectiveError, DirectiveKind, Operation, OperationKind, Program};

/// State threaded through the allocation pass.
struct Allocation<'a> {
    architecture: &'a Architecture,
    allocator: MemoryAllocator,
    tracker: SectionTracker,
}

#[derive(Debug, Default)]
pub struct IntermediateRepresentation {
    operations: Program,
    /// Macro definition receiving operations until its end directive
    open_macro: Option<Operation>,
}

impl IntermediateRepresentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Adds an operation, routing it into the body of an open macro definition.
    pub fn insert(&mut self, operation: Operation, errors: &mut CompileErrorList) {
        match &operation.kind {
            OperationKind::Macro(_) => {
                if self.open_macro.is_some() {
                    errors.push_error(operation.span(), MacroError::NestedDefinition);
                } else {
                    self.open_macro = Some(operation);
                }
            }
            OperationKind::MacroEnd => match self.open_macro.take() {
                Some(definition) => self.operations.push(definition),
                None => errors.push_error(operation.span(), MacroError::MissingStart),
            },
            _ => match &mut self.open_macro {
                Some(Operation {
                    kind: OperationKind::Macro(directive),
                    ..
                }) => directive.push(operation),
                _ => self.operations.push(operation),
            },
        }
    }

    /// Runs all passes and produces the final representation.
    #[tracing::instrument(skip_all, fields(architecture = architecture.name()))]
    pub fn transform(
        mut self,
        architecture: &Architecture,
        mut errors: CompileErrorList,
    ) -> FinalRepresentation {
        if let Some(definition) = self.open_macro.take() {
            let name = match &definition.kind {
                OperationKind::Macro(directive) => directive.name.text.clone(),
                _ => String::new(),
            };
            errors.push_error(definition.span(), MacroError::NotClosed(name));
            self.operations.push(definition);
        }

        let allocator = match architecture.allocator() {
            Ok(allocator) => allocator,
            Err(error) => {
                errors.push_error(SourcePositionSpan::default(), error);
                return FinalRepresentation::new(errors);
            }
        };

        // Pass 1
        let mut graph = SymbolGraph::new();
        let mut macros = MacroTable::new();
        for operation in &self.operations {
            precompile(operation, &mut graph, &mut macros, &mut errors);
        }
        expand_macros(&mut self.operations, &macros, &mut Vec::new(), &mut errors);

        // Pass 2
        let mut allocation = Allocation {
            architecture,
            allocator,
            tracker: SectionTracker::new(),
        };
        let mut first_exceeding: Option<SourcePositionSpan> = None;
        for operation in self.operations.iter_mut() {
            allocation.allocate(operation, &mut errors);
            if let Some(maximum) = architecture.memory_size() {
                if first_exceeding.is_none() && allocation.allocator.estimate_size() > maximum {
                    first_exceeding = Some(operation.span());
                }
            }
        }
        let positions = allocation.allocator.calculate_positions();
        let allocator = allocation.allocator;
        let mut macros = Vec::new();
        MacroInformation::collect(&self.operations, &allocator, &mut macros);

        let total_size = match positions {
            Ok(total_size) => total_size,
            Err(error) => {
                errors.push_error(first_exceeding.unwrap_or_default(), error);
                return FinalRepresentation::without_commands(errors, macros);
            }
        };
        tracing::debug!(total_size, "finished allocation");

        for operation in &self.operations {
            enhance_symbol_graph(operation, &allocator, &mut graph, &mut errors);
        }

        let evaluation = graph.evaluate();
        if !evaluation.valid() {
            evaluation.report(&mut errors);
            return FinalRepresentation::without_commands(errors, macros);
        }

        if let Some(maximum) = architecture.memory_size() {
            if total_size > maximum {
                errors.push_error(
                    first_exceeding.unwrap_or_default(),
                    LayoutError::MemoryExceeded {
                        requested: total_size,
                        maximum,
                    },
                );
                return FinalRepresentation::without_commands(errors, macros);
            }
        }

        // Pass 3
        let symbols = SymbolTable::resolve(&evaluation, &mut errors);
        let emitter = Emitter {
            architecture,
            allocator: &allocator,
            symbols: &symbols,
        };
        let mut output = FinalRepresentation::default();
        emitter.emit_all(&self.operations, &mut output, &mut errors);
        output.macros = macros;
        output.errors = errors;

        tracing::debug!(
            commands = output.commands.len(),
            memory = output.memory.len(),
            errors = output.errors.len(),
            "transformed intermediate representation"
        );
        output
    }
}

/// Registers macros and turns constants into symbols.
fn precompile(
    operation: &Operation,
    graph: &mut SymbolGraph,
    macros: &mut MacroTable,
    errors: &mut CompileErrorList,
) {
    match &operation.kind {
        OperationKind::Macro(directive) => directive.precompile(macros, errors),
        OperationKind::Constant => {
            let arguments = &operation.line.arguments;
            match arguments.as_slice() {
                [] => errors.push_error(operation.span(), DirectiveError::MissingConstantName),
                [name] => errors.push_error(
                    name.span,
                    DirectiveError::MissingConstantValue(name.text.clone()),
                ),
                [name, value] => {
                    let value = PositionedString::new(&format!("({})", value.as_str()), value.span);
                    graph.insert(Symbol::new(name.clone(), value, SymbolBehavior::Static));
                }
                _ => errors.push_error(
                    operation.span(),
                    DirectiveError::TooManyOperands(DirectiveKind::Constant.to_string()),
                ),
            }
        }
        _ => {}
    }
}

impl Allocation<'_> {
    fn current_section(&self) -> &str {
        self.tracker.current_section()
    }

    fn reserve(
        &mut self,
        size: usize,
        span: SourcePositionSpan,
        errors: &mut CompileErrorList,
    ) -> Option<RelativeMemoryPosition> {
        let section = self.tracker.current_section().to_owned();
        match self.allocator.allocate_relative(&section, size) {
            Ok(position) => Some(position),
            Err(error) => {
                errors.push_error(span, error);
                None
            }
        }
    }

    fn allocate(&mut self, operation: &mut Operation, errors: &mut CompileErrorList) {
        let line = &operation.line;
        let span = line.span;
        match &mut operation.kind {
            OperationKind::Section => match line.arguments.as_slice() {
                [] => errors.push_error(span, LayoutError::MissingSectionName),
                [name, rest @ ..] => {
                    if !rest.is_empty() {
                        errors.push_warning(
                            span,
                            DirectiveError::TooManyOperands(DirectiveKind::Section.to_string()),
                        );
                    }
                    if self.allocator.has_section(name.as_str()) {
                        self.tracker.switch_section(name.as_str());
                    } else {
                        errors.push_error(
                            name.span,
                            LayoutError::UnknownSection(name.text.clone()),
                        );
                    }
                }
            },
            OperationKind::Instruction(instruction) => {
                let mnemonic = line.mnemonic.as_str();
                if self.current_section() != INITIAL_SECTION {
                    errors.push_error(
                        span,
                        DirectiveError::InstructionOutsideText(mnemonic.to_owned()),
                    );
                }
                // Unknown instructions still get a position so their labels resolve
                instruction.size = match self.architecture.instruction_size(mnemonic) {
                    Some(size) => size,
                    None => {
                        errors.push_error(
                            line.mnemonic.span,
                            DirectiveError::UnknownInstruction(mnemonic.to_owned()),
                        );
                        0
                    }
                };
                instruction.position = self.reserve(instruction.size, span, errors);
            }
            OperationKind::MemoryReservation(reservation) => {
                if self.current_section() == INITIAL_SECTION {
                    errors.push_warning(span, DirectiveError::ReservationInText);
                }
                if line.arguments.is_empty() {
                    errors.push_warning(span, DirectiveError::EmptyReservation);
                }
                let mut cells = Some(0usize);
                for argument in &line.arguments {
                    let count = match clike::try_compile(argument, &NoSymbols, errors) {
                        Some(count) => count,
                        None => continue,
                    };
                    match usize::try_from(count) {
                        Ok(0) => errors.push_warning(argument.span, DirectiveError::ZeroReservation),
                        Ok(count) => cells = cells.and_then(|cells| cells.checked_add(count)),
                        Err(_) => errors.push_error(
                            argument.span,
                            DirectiveError::InvalidReservationSize(count),
                        ),
                    }
                }
                match cells.and_then(|cells| cells.checked_mul(reservation.cell_size)) {
                    Some(size) => {
                        reservation.size = size;
                        reservation.position = self.reserve(size, span, errors);
                    }
                    None => {
                        let section = self.current_section().to_owned();
                        errors.push_error(span, LayoutError::SizeOverflow(section));
                    }
                }
            }
            OperationKind::MemoryDefinition(definition) => {
                if self.current_section() == INITIAL_SECTION {
                    errors.push_warning(span, DirectiveError::DefinitionInText);
                }
                if line.arguments.is_empty() {
                    errors.push_warning(span, DirectiveError::EmptyDefinition);
                }
                let size = line.arguments.len() * definition.width;
                definition.position = self.reserve(size, span, errors);
            }
            OperationKind::MacroInstance(instance) => {
                for operation in instance.operations.iter_mut() {
                    self.allocate(operation, errors);
                }
            }
            OperationKind::Constant | OperationKind::Macro(_) | OperationKind::MacroEnd => {}
        }
    }
}

/// Adds a symbol holding the absolute address for every label.
fn enhance_symbol_graph(
    operation: &Operation,
    allocator: &MemoryAllocator,
    graph: &mut SymbolGraph,
    errors: &mut CompileErrorList,
) {
    let address = match &operation.kind {
        OperationKind::Instruction(instruction) => instruction.position.as_ref(),
        OperationKind::MemoryReservation(reservation) => reservation.position.as_ref(),
        OperationKind::MemoryDefinition(definition) => definition.position.as_ref(),
        OperationKind::MacroInstance(instance) => {
            for inner in &instance.operations {
                enhance_symbol_graph(inner, allocator, graph, errors);
            }
            match instance.first_address(allocator) {
                Some(address) => {
                    add_labels(operation, address, graph);
                }
                None if !operation.line.labels.is_empty() => {
                    errors.push_error(operation.label_span(), MacroError::LabelsWithoutInstructions);
                }
                None => {}
            }
            return;
        }
        _ => None,
    }
    .and_then(|position| allocator.absolute_address(position));

    if let Some(address) = address {
        add_labels(operation, address, graph);
    }
}

fn add_labels(operation: &Operation, address: usize, graph: &mut SymbolGraph) {
    for label in &operation.line.labels {
        graph.insert(Symbol::new(
            label.clone(),
            PositionedString::new(&address.to_string(), label.span),
            SymbolBehavior::Dynamic,
        ));
    }
}
