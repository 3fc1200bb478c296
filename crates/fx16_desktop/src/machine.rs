use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fx16_core::{globals::FRAME_COUNTER_ADDR, Cpu, CpuError, ImageError, Memory, Registers};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Image(#[from] ImageError),
}

pub fn load_image(path: impl AsRef<Path>) -> Result<Memory, LoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let memory = Memory::from_image(&bytes)?;
    let regs = Registers::load(&memory);
    info!(
        "loaded {} (pc={:#06x} sp={:#06x} rp={:#06x})",
        path.display(),
        regs.pc,
        regs.sp,
        regs.rp
    );
    Ok(memory)
}

/// Drives the CPU one frame at a time and keeps the guest's frame counter.
pub struct Machine {
    memory: Memory,
    cpu: Cpu,
    frame: u16,
    cycles_per_frame: usize,
}
impl Machine {
    pub fn new(memory: Memory, cycles_per_frame: usize) -> Self {
        let frame = memory.read_word(FRAME_COUNTER_ADDR);
        Machine {
            memory,
            cpu: Cpu::new(),
            frame,
            cycles_per_frame,
        }
    }
    pub fn memory(&self) -> &Memory {
        &self.memory
    }
    /// Publishes the frame counter, bumps it and runs one batch of cycles.
    pub fn frame(&mut self) -> Result<(), CpuError> {
        self.memory.write_word(FRAME_COUNTER_ADDR, self.frame);
        self.frame = self.frame.wrapping_add(1);
        self.cpu.run(&mut self.memory, self.cycles_per_frame)?;
        debug!("frame {:#06x} pc={:#06x}", self.frame.wrapping_sub(1), self.cpu.registers().pc);
        Ok(())
    }
    pub fn dump(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.memory.as_bytes())
    }
}
