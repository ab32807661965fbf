//! Arithmetic, logic and shift primitives with their `FLAGS` effects.
//!
//! Every function takes operand values, updates the flag bits it owns in
//! the register file and returns the result byte (or word). Flags an
//! operation does not define are left untouched.

use crate::state::registers::{RegisterFile, FLAG_C, FLAG_D, FLAG_H, FLAG_S, FLAG_V, FLAG_Z};

/// Two-operand operations of opcode rows 0..=7, A and B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    Or,
    And,
    Tcm,
    Tm,
    Cp,
    Xor,
}

impl AluOp {
    /// Operation selected by the high nibble of an arithmetic opcode.
    pub const fn from_row(opcode: u8) -> Option<Self> {
        Some(match opcode >> 4 {
            0x0 => Self::Add,
            0x1 => Self::Adc,
            0x2 => Self::Sub,
            0x3 => Self::Sbc,
            0x4 => Self::Or,
            0x5 => Self::And,
            0x6 => Self::Tcm,
            0x7 => Self::Tm,
            0xA => Self::Cp,
            0xB => Self::Xor,
            _ => return None,
        })
    }

    /// Applies the operation to `dst` and `src`.
    ///
    /// Returns the byte to store in the destination, or `None` for the
    /// compare and test forms that only set flags.
    pub fn apply(self, regs: &mut RegisterFile, dst: u8, src: u8) -> Option<u8> {
        let carry = u8::from(regs.read_flag(FLAG_C));
        match self {
            Self::Add => Some(add(regs, dst, src, 0)),
            Self::Adc => Some(add(regs, dst, src, carry)),
            Self::Sub => Some(sub(regs, dst, src, 0)),
            Self::Sbc => Some(sub(regs, dst, src, carry)),
            Self::Or => Some(logic(regs, dst | src)),
            Self::And => Some(logic(regs, dst & src)),
            Self::Xor => Some(logic(regs, dst ^ src)),
            Self::Tcm => {
                logic(regs, !dst & src);
                None
            }
            Self::Tm => {
                logic(regs, dst & src);
                None
            }
            Self::Cp => {
                compare(regs, dst, src);
                None
            }
        }
    }
}

fn set_sz(regs: &mut RegisterFile, value: u8) {
    regs.write_flag(FLAG_Z, value == 0);
    regs.write_flag(FLAG_S, value & 0x80 != 0);
}

/// `dst + src + carry_in`.
pub fn add(regs: &mut RegisterFile, dst: u8, src: u8, carry_in: u8) -> u8 {
    let (v1, v2, v3) = (i32::from(dst), i32::from(src), i32::from(carry_in));
    let partial = v1 + v2;
    let sum = partial + v3;
    let overflow = ((v1 & 0x80) == (v2 & 0x80) && (v1 & 0x80) != (partial & 0x80))
        || ((partial & 0x80) == (v3 & 0x80) && (partial & 0x80) != (sum & 0x80));
    let half = ((v1 & 0x0F) + (v2 & 0x0F) + v3) & 0xF0 != 0;
    let result = sum.to_le_bytes()[0];
    regs.write_flag(FLAG_V, overflow);
    regs.write_flag(FLAG_C, sum & 0xFF00 != 0);
    set_sz(regs, result);
    regs.write_flag(FLAG_D, false);
    regs.write_flag(FLAG_H, half);
    result
}

/// `dst - src - borrow_in`.
pub fn sub(regs: &mut RegisterFile, dst: u8, src: u8, borrow_in: u8) -> u8 {
    let (v1, v2, v3) = (i32::from(dst), i32::from(src), i32::from(borrow_in));
    let partial = v1 - v2;
    let diff = partial - v3;
    let overflow = ((v1 & 0x80) != (v2 & 0x80) && (partial & 0x80) == (v2 & 0x80))
        || ((partial & 0x80) != (v3 & 0x80) && (diff & 0x80) == (v3 & 0x80));
    let half = ((v1 & 0x0F) - (v2 & 0x0F) - v3) & 0xF0 != 0;
    let result = diff.to_le_bytes()[0];
    regs.write_flag(FLAG_V, overflow);
    regs.write_flag(FLAG_C, diff & 0xFF00 != 0);
    set_sz(regs, result);
    regs.write_flag(FLAG_D, true);
    regs.write_flag(FLAG_H, half);
    result
}

/// `CP`: subtraction that keeps only C, Z, S and V.
pub fn compare(regs: &mut RegisterFile, dst: u8, src: u8) {
    let (v1, v2) = (i32::from(dst), i32::from(src));
    let diff = v1 - v2;
    regs.write_flag(FLAG_V, (v1 & 0x80) != (v2 & 0x80) && (diff & 0x80) == (v2 & 0x80));
    regs.write_flag(FLAG_C, diff & 0xFF00 != 0);
    set_sz(regs, diff.to_le_bytes()[0]);
}

/// Logical result: S and Z from the value, V cleared.
pub fn logic(regs: &mut RegisterFile, value: u8) -> u8 {
    set_sz(regs, value);
    regs.write_flag(FLAG_V, false);
    value
}

pub fn inc(regs: &mut RegisterFile, value: u8) -> u8 {
    let result = value.wrapping_add(1);
    set_sz(regs, result);
    regs.write_flag(FLAG_V, (result ^ value) & 0x80 != 0);
    result
}

pub fn dec(regs: &mut RegisterFile, value: u8) -> u8 {
    let result = value.wrapping_sub(1);
    set_sz(regs, result);
    regs.write_flag(FLAG_V, (result ^ value) & 0x80 != 0);
    result
}

fn set_word_flags(regs: &mut RegisterFile, before: u16, after: u16) {
    regs.write_flag(FLAG_Z, after == 0);
    regs.write_flag(FLAG_S, after & 0x8000 != 0);
    regs.write_flag(FLAG_V, (after ^ before) & 0x8000 != 0);
}

pub fn incw(regs: &mut RegisterFile, value: u16) -> u16 {
    let result = value.wrapping_add(1);
    set_word_flags(regs, value, result);
    result
}

pub fn decw(regs: &mut RegisterFile, value: u16) -> u16 {
    let result = value.wrapping_sub(1);
    set_word_flags(regs, value, result);
    result
}

fn set_rotate_flags(regs: &mut RegisterFile, before: u8, after: u8, carry: bool) {
    regs.write_flag(FLAG_C, carry);
    set_sz(regs, after);
    regs.write_flag(FLAG_V, (after ^ before) & 0x80 != 0);
}

/// Rotate left; bit 7 goes to C and bit 0.
pub fn rl(regs: &mut RegisterFile, value: u8) -> u8 {
    let result = value.rotate_left(1);
    set_rotate_flags(regs, value, result, value & 0x80 != 0);
    result
}

/// Rotate left through carry.
pub fn rlc(regs: &mut RegisterFile, value: u8) -> u8 {
    let result = (value << 1) | u8::from(regs.read_flag(FLAG_C));
    set_rotate_flags(regs, value, result, value & 0x80 != 0);
    result
}

/// Rotate right; bit 0 goes to C and bit 7.
pub fn rr(regs: &mut RegisterFile, value: u8) -> u8 {
    let result = value.rotate_right(1);
    set_rotate_flags(regs, value, result, value & 0x01 != 0);
    result
}

/// Rotate right through carry.
pub fn rrc(regs: &mut RegisterFile, value: u8) -> u8 {
    let carry_in = if regs.read_flag(FLAG_C) { 0x80 } else { 0 };
    let result = (value >> 1) | carry_in;
    set_rotate_flags(regs, value, result, value & 0x01 != 0);
    result
}

/// Arithmetic shift right; the sign bit is kept.
pub fn sra(regs: &mut RegisterFile, value: u8) -> u8 {
    let result = (value >> 1) | (value & 0x80);
    regs.write_flag(FLAG_C, value & 0x01 != 0);
    set_sz(regs, result);
    regs.write_flag(FLAG_V, false);
    result
}

pub fn swap(regs: &mut RegisterFile, value: u8) -> u8 {
    let result = value.rotate_left(4);
    set_sz(regs, result);
    regs.write_flag(FLAG_V, false);
    result
}

pub fn com(regs: &mut RegisterFile, value: u8) -> u8 {
    logic(regs, !value)
}

/// Decimal adjust after a BCD add (D clear) or subtract (D set).
pub fn decimal_adjust(regs: &mut RegisterFile, value: u8) -> u8 {
    let c = regs.read_flag(FLAG_C);
    let h = regs.read_flag(FLAG_H);
    let hi = value >> 4;
    let lo = value & 0x0F;

    let (correction, carry) = if regs.read_flag(FLAG_D) {
        if !c && hi <= 8 && h && lo >= 6 {
            (0xFA, false)
        } else if c && hi >= 7 && !h && lo <= 9 {
            (0xA0, true)
        } else if c && hi >= 6 && h && lo >= 6 {
            (0x9A, true)
        } else {
            (0x00, false)
        }
    } else if (!c && hi <= 8 && !h && lo >= 0x0A) || (!c && hi <= 9 && h && lo <= 3) {
        (0x06, false)
    } else if (!c && hi >= 0x0A && !h && lo <= 9) || (c && hi <= 2 && !h && lo <= 9) {
        (0x60, true)
    } else if (!c && hi >= 9 && !h && lo >= 0x0A)
        || (!c && hi >= 0x0A && h && lo <= 3)
        || (c && hi <= 2 && !h && lo >= 0x0A)
        || (c && hi <= 3 && h && lo <= 3)
    {
        (0x66, true)
    } else {
        (0x00, false)
    };

    let result = value.wrapping_add(correction);
    regs.write_flag(FLAG_C, carry);
    set_sz(regs, result);
    result
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{add, compare, decimal_adjust, inc, rl, rr, rrc, sra, sub, AluOp};
    use crate::state::registers::{
        RegisterFile, FLAGS, FLAG_C, FLAG_D, FLAG_H, FLAG_S, FLAG_V, FLAG_Z,
    };

    fn regs_with_flags(flags: u8) -> RegisterFile {
        let mut regs = RegisterFile::new(false);
        regs.write(FLAGS, flags);
        regs
    }

    #[rstest]
    #[case(0x01, 0x02, 0, 0x03, 0)]
    #[case(0xFF, 0x01, 0, 0x00, FLAG_C | FLAG_Z | FLAG_H)]
    #[case(0x7F, 0x01, 0, 0x80, FLAG_S | FLAG_V | FLAG_H)]
    #[case(0x80, 0x80, 0, 0x00, FLAG_C | FLAG_Z | FLAG_V)]
    #[case(0x0F, 0x00, 1, 0x10, FLAG_H)]
    fn add_sets_flags(
        #[case] a: u8,
        #[case] b: u8,
        #[case] carry: u8,
        #[case] result: u8,
        #[case] flags: u8,
    ) {
        let mut regs = regs_with_flags(FLAG_D);
        assert_eq!(add(&mut regs, a, b, carry), result);
        assert_eq!(regs.flags(), flags);
    }

    #[rstest]
    #[case(0x05, 0x03, 0, 0x02, FLAG_D)]
    #[case(0x00, 0x01, 0, 0xFF, FLAG_C | FLAG_S | FLAG_D | FLAG_H)]
    #[case(0x80, 0x01, 0, 0x7F, FLAG_V | FLAG_D | FLAG_H)]
    #[case(0x10, 0x0F, 1, 0x00, FLAG_Z | FLAG_D | FLAG_H)]
    fn sub_sets_flags(
        #[case] a: u8,
        #[case] b: u8,
        #[case] borrow: u8,
        #[case] result: u8,
        #[case] flags: u8,
    ) {
        let mut regs = regs_with_flags(0);
        assert_eq!(sub(&mut regs, a, b, borrow), result);
        assert_eq!(regs.flags(), flags);
    }

    #[test]
    fn compare_leaves_decimal_flags() {
        let mut regs = regs_with_flags(FLAG_H);
        compare(&mut regs, 0x10, 0x20);
        assert_eq!(regs.flags(), FLAG_C | FLAG_S | FLAG_H);
        compare(&mut regs, 0x20, 0x20);
        assert_eq!(regs.flags(), FLAG_Z | FLAG_H);
    }

    #[test]
    fn test_forms_do_not_produce_results() {
        let mut regs = regs_with_flags(FLAG_C);
        assert_eq!(AluOp::Tm.apply(&mut regs, 0xF0, 0x0F), None);
        assert_eq!(regs.flags(), FLAG_C | FLAG_Z);
        assert_eq!(AluOp::Tcm.apply(&mut regs, 0xF0, 0x0F), None);
        assert_eq!(regs.flags(), FLAG_C);
        assert_eq!(AluOp::Adc.apply(&mut regs, 0x01, 0x01), Some(0x03));
    }

    #[test]
    fn decimal_adjust_after_bcd_add() {
        let mut regs = regs_with_flags(0);
        let sum = add(&mut regs, 0x19, 0x28, 0);
        assert_eq!(sum, 0x41);
        assert_eq!(decimal_adjust(&mut regs, sum), 0x47);
        assert!(!regs.read_flag(FLAG_C));

        let sum = add(&mut regs, 0x99, 0x01, 0);
        assert_eq!(decimal_adjust(&mut regs, sum), 0x00);
        assert!(regs.read_flag(FLAG_C));
        assert!(regs.read_flag(FLAG_Z));
    }

    #[test]
    fn decimal_adjust_after_bcd_subtract() {
        let mut regs = regs_with_flags(0);
        let diff = sub(&mut regs, 0x42, 0x15, 0);
        assert_eq!(decimal_adjust(&mut regs, diff), 0x27);
    }

    #[test]
    fn inc_reports_signed_overflow() {
        let mut regs = regs_with_flags(0);
        assert_eq!(inc(&mut regs, 0x7F), 0x80);
        assert!(regs.read_flag(FLAG_V | FLAG_S));
    }

    #[test]
    fn rotates_move_bits_through_carry() {
        let mut regs = regs_with_flags(0);
        assert_eq!(rl(&mut regs, 0x81), 0x03);
        assert!(regs.read_flag(FLAG_C));
        assert_eq!(rrc(&mut regs, 0x02), 0x81);
        assert!(!regs.read_flag(FLAG_C));
        assert_eq!(rr(&mut regs, 0x01), 0x80);
        assert!(regs.read_flag(FLAG_C | FLAG_S));
        assert_eq!(sra(&mut regs, 0x81), 0xC0);
        assert!(regs.read_flag(FLAG_C));
        assert!(!regs.read_flag(FLAG_V));
    }
}
