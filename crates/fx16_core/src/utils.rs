#[inline(always)]
pub fn u16_from_two(hi: u8, lo: u8) -> u16 {
    (hi as u16) << 8 | lo as u16
}

#[inline(always)]
pub fn split_u16(val: u16) -> (u8, u8) {
    ((val >> 8) as u8, (val & 0xFF) as u8)
}

/// Boolean flag as seen by the guest: all bits set for true.
#[inline(always)]
pub fn flag(cond: bool) -> u16 {
    if cond { 0xFFFF } else { 0x0000 }
}
