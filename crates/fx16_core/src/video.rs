use crate::{
    globals::{
        FRAME_BUFFER_ADDR, FRAME_BUFFER_SIZE, PALETTE_ADDR, PALETTE_ENTRIES, PALETTE_SIZE,
        SCREEN_HEIGHT, SCREEN_WIDTH,
    },
    memory::Memory,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}
impl Rgb {
    /// Packs as 0x00RRGGBB.
    pub fn to_u32(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

pub fn palette_entry(memory: &Memory, index: u8) -> Rgb {
    let base = index as usize * 3;
    let entry = &memory.slice(PALETTE_ADDR, PALETTE_SIZE)[base..base + 3];
    Rgb {
        r: entry[0],
        g: entry[1],
        b: entry[2],
    }
}

pub fn palette(memory: &Memory) -> [Rgb; PALETTE_ENTRIES] {
    let mut palette = [Rgb::default(); PALETTE_ENTRIES];
    for (i, rgb) in palette.iter_mut().enumerate() {
        *rgb = palette_entry(memory, i as u8);
    }
    palette
}

/// Palette index of a pixel, row-major from the top left.
pub fn pixel(memory: &Memory, x: usize, y: usize) -> u8 {
    memory.slice(FRAME_BUFFER_ADDR, FRAME_BUFFER_SIZE)[x % SCREEN_WIDTH + (y % SCREEN_HEIGHT) * SCREEN_WIDTH]
}

/// Colour shown around the picture when the window is bigger than the frame.
pub fn border_colour(memory: &Memory) -> Rgb {
    palette_entry(memory, 0)
}

/// Expands the indexed frame buffer into `out`, one 0x00RRGGBB word per pixel.
/// `out` must hold at least `FRAME_BUFFER_SIZE` words.
pub fn compose(memory: &Memory, out: &mut [u32]) {
    let palette = palette(memory);
    let pixels = memory.slice(FRAME_BUFFER_ADDR, FRAME_BUFFER_SIZE);
    for (dst, index) in out[..FRAME_BUFFER_SIZE].iter_mut().zip(pixels) {
        *dst = palette[*index as usize].to_u32();
    }
}
