use thiserror::Error;

use crate::{cpu::Op, globals::MEMORY_SIZE};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    #[error("{op:?} by zero at {pc:#06x}")]
    DivisionByZero { op: Op, pc: u16 },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("memory image must be exactly {expected} bytes, got {actual}", expected = MEMORY_SIZE)]
    WrongSize { actual: usize },
}
