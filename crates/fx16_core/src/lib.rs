#![no_std]
pub mod cpu;
mod errors;
pub mod globals;
mod memory;
mod utils;
pub mod video;

pub use cpu::{run, Cpu, Instruction, Op, Registers};
pub use errors::{CpuError, ImageError};
pub use memory::Memory;
