use std::fs;
use std::path::PathBuf;

use clap::Parser;
use fx16_asm::Assembler;
use miette::IntoDiagnostic;
use tracing::{info, Level};

/// Assemble FX16 source into a 64K memory image
#[derive(Parser, Debug)]
#[command(name = "fx16-asm", version, about)]
struct Args {
    /// Source file to assemble
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Where to write the memory image
    #[arg(short, long, value_name = "FILE", default_value = "memory.bin")]
    output: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    init_tracing(if args.verbose { Level::DEBUG } else { Level::INFO });

    let mut asm = Assembler::new();
    asm.assemble_file(&args.input).into_diagnostic()?;
    let labels = asm.labels().len();
    let memory = asm.finalize().into_diagnostic()?;
    fs::write(&args.output, memory.as_bytes()).into_diagnostic()?;

    info!(
        "wrote {} ({} labels)",
        args.output.display(),
        labels
    );
    Ok(())
}

fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(level)
        .try_init();
}
