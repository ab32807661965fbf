//! Per-opcode cycle costs.

use crate::encoding::{opcode_info, Mnemonic, Operands};

/// Cycles consumed by accepting an interrupt (push sequence plus vector fetch).
pub const INTERRUPT_ENTRY_CYCLES: u32 = 6;

/// Cycles the clock advances per step while halted.
pub const HALT_IDLE_CYCLES: u32 = 4;

/// Fixed cost of one opcode.
///
/// `alt` is charged for a taken branch (`DJNZ`, `JR cc`, `JP cc`) or for
/// a push onto an external stack; `base` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CycleCost {
    /// Normal cost.
    pub base: u8,
    /// Cost on the alternate path.
    pub alt: u8,
}

impl CycleCost {
    const fn fixed(cycles: u8) -> Self {
        Self {
            base: cycles,
            alt: cycles,
        }
    }

    const fn split(base: u8, alt: u8) -> Self {
        Self { base, alt }
    }
}

/// Single source of truth for instruction timing, indexed by opcode byte.
pub const CYCLE_COST_TABLE: [CycleCost; 256] = build_cycle_table();

const fn build_cycle_table() -> [CycleCost; 256] {
    let mut table = [CycleCost::fixed(6); 256];
    let mut opcode = 0;
    while opcode < 256 {
        table[opcode] = cost_of(opcode as u8);
        opcode += 1;
    }
    table
}

const fn cost_of(opcode: u8) -> CycleCost {
    let info = opcode_info(opcode);
    match info.mnemonic {
        Mnemonic::Djnz | Mnemonic::Jr | Mnemonic::Jp if opcode != 0x30 => CycleCost::split(10, 12),
        Mnemonic::Jp | Mnemonic::Da | Mnemonic::Swap => CycleCost::fixed(8),
        Mnemonic::Push => {
            if opcode == 0x70 {
                CycleCost::split(10, 12)
            } else {
                CycleCost::split(12, 14)
            }
        }
        Mnemonic::Pop | Mnemonic::Incw | Mnemonic::Decw => CycleCost::fixed(10),
        Mnemonic::Ldc | Mnemonic::Lde => CycleCost::fixed(12),
        Mnemonic::Ldci | Mnemonic::Ldei => CycleCost::fixed(18),
        Mnemonic::Call => CycleCost::fixed(20),
        Mnemonic::Ret => CycleCost::fixed(14),
        Mnemonic::Iret => CycleCost::fixed(16),
        Mnemonic::Halt => CycleCost::fixed(7),
        _ => match info.operands {
            Operands::RegReg
            | Operands::RegIndReg
            | Operands::RegImm
            | Operands::IndRegImm
            | Operands::Indexed
            | Operands::IndRegReg => CycleCost::fixed(10),
            _ => CycleCost::fixed(6),
        },
    }
}

/// Looks up the cost of `opcode`.
#[must_use]
pub const fn cycle_cost(opcode: u8) -> CycleCost {
    CYCLE_COST_TABLE[opcode as usize]
}
