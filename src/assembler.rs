use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use self::{
    allocator::SectionDefinition,
    arch::{Architecture, DEFAULT_ARCHITECTURE},
    codegen::FinalRepresentation,
    error::CompileErrorList,
    parser::Parser,
    representation::IntermediateRepresentation,
};

/// Sections and the two phase memory layout.
pub mod allocator;

/// Target description consumed by the passes.
pub mod arch;

/// Emission of the final representation.
pub mod codegen;

/// Diagnostics shared by all passes.
pub mod error;

/// Tokenizing and compiling of operand expressions.
pub mod expression;

/// Macro definitions, the macro table and expansion.
pub mod macros;

/// Splits source lines into labels, mnemonic and operands.
pub mod parser;

/// The intermediate operation graph and its passes.
pub mod representation;

pub mod source_position;

/// Symbol dependency graph and resolved symbol values.
pub mod symbols;

#[derive(Debug, thiserror::Error)]
pub enum AssemblerError {
    #[error("Compilation failed with {count} error(s):\n{errors}")]
    Compile {
        count: usize,
        errors: CompileErrorList,
    },
}

/// Runs the whole pipeline on `input`.
///
/// Never fails, all problems are recorded in [`FinalRepresentation::errors`].
#[tracing::instrument(skip_all)]
pub fn assemble(input: &str, architecture: &Architecture) -> FinalRepresentation {
    let mut errors = CompileErrorList::new();
    let mut representation = IntermediateRepresentation::new();
    for operation in Parser::new(input).parse_program(&mut errors) {
        representation.insert(operation, &mut errors);
    }
    representation.transform(architecture, errors)
}

/// Utility function for compiling a program, failing on the first error-level diagnostic.
#[tracing::instrument(skip_all)]
pub fn compile_code(
    input: &str,
    architecture: &Architecture,
) -> Result<FinalRepresentation, AssemblerError> {
    let representation = assemble(input, architecture);
    if representation.has_errors() {
        return Err(AssemblerError::Compile {
            count: representation.errors.error_count(),
            errors: representation.errors,
        });
    }
    Ok(representation)
}

#[derive(clap::Args, Debug)]
pub struct AssemblyArgs {
    #[clap(help = "Assembly source file")]
    pub input: PathBuf,
    #[clap(short, long)]
    #[clap(help = "Write the listing to a file instead of stdout")]
    pub output: Option<PathBuf>,
    #[clap(long = "section", value_name = "NAME:ALIGN[:DATA_ALIGN]")]
    #[clap(help = "Add a section or replace the alignment of an existing one")]
    pub sections: Vec<SectionDefinition>,
    #[clap(long)]
    #[clap(help = "Maximum size of the program in bytes")]
    pub memory_size: Option<usize>,
}

impl AssemblyArgs {
    fn architecture(&self) -> Architecture {
        let mut architecture = DEFAULT_ARCHITECTURE.clone();
        for section in &self.sections {
            architecture = architecture.with_section(section.clone());
        }
        let memory_size = self.memory_size.or(architecture.memory_size());
        architecture.with_memory_size(memory_size)
    }
}

/// Assembles the input file and writes the listing.
pub fn assemble_file(args: &AssemblyArgs) -> Result<()> {
    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Unable to read file '{}'", args.input.display()))?;

    let representation = assemble(&input, &args.architecture());
    for diagnostic in &representation.errors {
        eprintln!("{}:{}", args.input.display(), diagnostic);
    }
    if representation.has_errors() {
        bail!(
            "Compilation failed with {} error(s)",
            representation.errors.error_count()
        );
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, representation.to_string())
                .with_context(|| format!("Unable to write file '{}'", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{}", representation),
    }
    Ok(())
}
