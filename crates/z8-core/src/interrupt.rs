//! Interrupt priority decoding and source selection.

use crate::state::registers::{RegisterFile, IMR_ENABLE, IRQ_MASK};

/// Number of interrupt sources (`IRQ0..=IRQ5`).
pub const INTERRUPT_SOURCES: usize = 6;

/// Interrupt sources ordered from highest to lowest priority.
pub type InterruptPriority = [u8; INTERRUPT_SOURCES];

/// Decoded priority order for every 6-bit `IPR` value; `None` marks the
/// reserved group encodings.
pub const PRIORITY_TABLE: [Option<InterruptPriority>; 64] = build_priority_table();

const fn build_priority_table() -> [Option<InterruptPriority>; 64] {
    let mut table = [None; 64];
    let mut ipr = 0;
    while ipr < 64 {
        table[ipr] = priority_for(ipr as u8);
        ipr += 1;
    }
    table
}

const fn priority_for(ipr: u8) -> Option<InterruptPriority> {
    // Group pairs: A = IRQ3/IRQ5, B = IRQ0/IRQ2, C = IRQ1/IRQ4.
    let c = if ipr & 0x02 == 0 { [1, 4] } else { [4, 1] };
    let b = if ipr & 0x04 == 0 { [2, 0] } else { [0, 2] };
    let a = if ipr & 0x20 == 0 { [5, 3] } else { [3, 5] };
    let order = match ((ipr >> 2) & 0x06) | (ipr & 0x01) {
        1 => [c, a, b],
        2 => [a, b, c],
        3 => [a, c, b],
        4 => [b, c, a],
        5 => [c, b, a],
        6 => [b, a, c],
        _ => return None,
    };
    Some([
        order[0][0],
        order[0][1],
        order[1][0],
        order[1][1],
        order[2][0],
        order[2][1],
    ])
}

/// Decodes an `IPR` value; reserved group encodings yield `None`.
#[must_use]
pub const fn decode_priority(ipr: u8) -> Option<InterruptPriority> {
    PRIORITY_TABLE[(ipr & 0x3F) as usize]
}

/// Code-space address of the vector word for `source`.
#[must_use]
pub const fn vector_address(source: u8) -> u16 {
    source as u16 * 2
}

/// Returns the highest-priority deliverable interrupt source, if any.
///
/// Delivery requires `IMR` bit 7, a request bit that is also unmasked, and
/// a priority order programmed through `IPR` since power-on.
#[must_use]
pub fn pending_source(regs: &RegisterFile) -> Option<u8> {
    let imr = regs.imr();
    if imr & IMR_ENABLE == 0 {
        return None;
    }
    let deliverable = regs.irq() & imr & IRQ_MASK;
    if deliverable == 0 {
        return None;
    }
    regs.interrupt_priority()?
        .into_iter()
        .find(|&source| deliverable & (1u8 << source) != 0)
}
