use std::path::PathBuf;

use clap::Parser;
use fx16_core::globals::DEFAULT_CYCLES_PER_FRAME;
use miette::IntoDiagnostic;
use tracing::{info, Level};

mod machine;
mod screen;

use machine::{load_image, Machine};

/// FX16 fantasy console
#[derive(Parser, Debug)]
#[command(name = "fx16", version, about)]
struct Args {
    /// 64K memory image to boot
    #[arg(value_name = "FILE", default_value = "memory.bin")]
    image: PathBuf,

    /// Instructions executed per frame
    #[arg(long, default_value_t = DEFAULT_CYCLES_PER_FRAME)]
    cycles: usize,

    /// Run this many frames without opening a window, then exit
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Write the memory image here on exit
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    init_tracing(if args.verbose { Level::DEBUG } else { Level::INFO });

    let memory = load_image(&args.image).into_diagnostic()?;
    let mut machine = Machine::new(memory, args.cycles);

    let result = match args.frames {
        Some(frames) => {
            info!("running {frames} frames headless");
            (0..frames).try_for_each(|_| machine.frame()).into_diagnostic()
        }
        None => screen::run(&mut machine).into_diagnostic(),
    };

    // dump even after a fault so the halted state can be inspected
    if let Some(path) = &args.dump {
        machine.dump(path).into_diagnostic()?;
        info!("wrote {}", path.display());
    }
    result
}

fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(level)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let args = Args::parse_from(["fx16"]);
        assert!(args.image == PathBuf::from("memory.bin"));
        assert!(args.cycles == 0x10000);
        assert!(args.frames.is_none());
        assert!(args.dump.is_none());
    }

    #[test]
    fn parse_headless() {
        let args = Args::parse_from([
            "fx16", "game.bin", "--cycles", "100", "--frames", "3", "--dump", "out.bin",
        ]);
        assert!(args.image == PathBuf::from("game.bin"));
        assert!(args.cycles == 100);
        assert!(args.frames == Some(3));
        assert!(args.dump == Some(PathBuf::from("out.bin")));
    }
}
