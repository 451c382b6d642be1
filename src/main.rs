use anyhow::Result;
use clap::{Parser, Subcommand};

use regasm::{
    assembler::{assemble_file, AssemblyArgs},
    instrumentation::trace,
};

#[derive(Parser)]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[clap(long)]
    #[clap(help = "Enable chrome tracing")]
    #[clap(long_help = "Enable chrome tracing which on program exit will generate
a json file to be opened with a chrome tracing compatible
viewer.")]
    trace: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[clap(about = "Assemble a program into a listing")]
    #[clap(aliases = &["a", "asm"])]
    Assemble(AssemblyArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _trace_guard = if cli.trace { Some(trace()) } else { None };

    match &cli.command {
        Command::Assemble(args) => assemble_file(args),
    }
}
