use core::fmt;

use crate::{
    errors::ImageError,
    globals::{MEMORY_SIZE, PC_ADDR, RP_ADDR, SP_ADDR},
    utils::{split_u16, u16_from_two},
};

/// Flat 64K address space. Every access wraps at the 16-bit boundary, so none of
/// these calls can fail.
#[derive(Clone)]
pub struct Memory {
    bytes: [u8; MEMORY_SIZE],
}
impl Memory {
    pub fn new() -> Self {
        Memory {
            bytes: [0; MEMORY_SIZE],
        }
    }
    /// Builds memory from a complete image. Anything but exactly 64K is rejected.
    pub fn from_image(image: &[u8]) -> Result<Self, ImageError> {
        if image.len() != MEMORY_SIZE {
            return Err(ImageError::WrongSize {
                actual: image.len(),
            });
        }
        let mut memory = Memory::new();
        memory.bytes.copy_from_slice(image);
        Ok(memory)
    }
    pub fn read_byte(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }
    pub fn write_byte(&mut self, addr: u16, val: u8) {
        self.bytes[addr as usize] = val;
    }
    /// Big-endian, no alignment; the low byte comes from `addr + 1` wrapped.
    pub fn read_word(&self, addr: u16) -> u16 {
        u16_from_two(self.read_byte(addr), self.read_byte(addr.wrapping_add(1)))
    }
    pub fn write_word(&mut self, addr: u16, val: u16) {
        let (hi, lo) = split_u16(val);
        self.write_byte(addr, hi);
        self.write_byte(addr.wrapping_add(1), lo);
    }
    /// Copies `data` in starting at `addr`, wrapping past 0xFFFF.
    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let mut ptr = addr;
        for byte in data {
            self.write_byte(ptr, *byte);
            ptr = ptr.wrapping_add(1);
        }
    }
    /// Contiguous read-only window. Panics if the window runs past the top of memory.
    pub fn slice(&self, addr: u16, len: usize) -> &[u8] {
        let start = addr as usize;
        &self.bytes[start..start + len]
    }
    pub fn as_bytes(&self) -> &[u8; MEMORY_SIZE] {
        &self.bytes
    }
}
/// Shows the register slots only; the full 64K dump is never useful in a
/// panic message.
impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("pc", &format_args!("{:#06x}", self.read_word(PC_ADDR)))
            .field("sp", &format_args!("{:#06x}", self.read_word(SP_ADDR)))
            .field("rp", &format_args!("{:#06x}", self.read_word(RP_ADDR)))
            .finish_non_exhaustive()
    }
}
impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
