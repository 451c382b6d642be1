/// Transforms assembly code into an address-bound command listing.
///
/// The steps are:
/// 1. **Parsing** - splitting lines into labels, mnemonics and operands
/// 2. **Building** - collecting operations into the intermediate representation
/// 3. **Transforming** - resolving the representation in multiple passes
///     - Pass 1: Precompilation - registering macros and constants, expanding macros
///     - Pass 2: Allocation - laying out memory and binding labels
///     - Pass 3: Emission - resolving operands into the final representation
pub mod assembler;

/// Operations of the intermediate representation.
pub mod ast;

/// Chrome tracing support
pub mod instrumentation;
