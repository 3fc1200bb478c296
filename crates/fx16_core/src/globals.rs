pub const MEMORY_SIZE: usize = 0x10000;

// register file, mirrored into memory between batches
pub const PC_ADDR: u16 = 0x0000;
pub const SP_ADDR: u16 = 0x0002;
pub const RP_ADDR: u16 = 0x0004;
pub const FRAME_COUNTER_ADDR: u16 = 0x0006;

pub const PALETTE_ADDR: u16 = 0x0100;
pub const PALETTE_ENTRIES: usize = 256;
pub const PALETTE_SIZE: usize = PALETTE_ENTRIES * 3;

pub const SCREEN_WIDTH: usize = 128;
pub const SCREEN_HEIGHT: usize = 128;
pub const FRAME_BUFFER_ADDR: u16 = 0x0400;
pub const FRAME_BUFFER_SIZE: usize = SCREEN_WIDTH * SCREEN_HEIGHT;

/// Opcode words below this value are primitives, anything else is a call target.
pub const PRIMITIVE_COUNT: u16 = 0x20;
pub const DEFAULT_CYCLES_PER_FRAME: usize = 0x10000;
