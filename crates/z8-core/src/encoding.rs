//! Z8 opcode map: mnemonic, operand form and length for all 256 opcode bytes.
//!
//! The table is built once at compile time from the nibble structure of the
//! instruction set and covers every byte value; unassigned bytes are listed
//! as [`Mnemonic::Illegal`].

/// Instruction mnemonics of the Z8601 instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum Mnemonic {
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
    Ld,
    Ldc,
    Ldci,
    Lde,
    Ldei,
    Inc,
    Dec,
    Incw,
    Decw,
    Da,
    Com,
    Clr,
    Rl,
    Rlc,
    Rr,
    Rrc,
    Sra,
    Swap,
    Push,
    Pop,
    Srp,
    Djnz,
    Jr,
    Jp,
    Call,
    Ret,
    Iret,
    Di,
    Ei,
    Rcf,
    Scf,
    Ccf,
    Nop,
    Halt,
    Stop,
    Wdh,
    Wdt,
    /// Unassigned opcode byte; executes as a 6-cycle no-op.
    Illegal,
}

impl Mnemonic {
    /// Assembler spelling of the mnemonic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Adc => "ADC",
            Self::Sub => "SUB",
            Self::Sbc => "SBC",
            Self::Or => "OR",
            Self::And => "AND",
            Self::Tcm => "TCM",
            Self::Tm => "TM",
            Self::Cp => "CP",
            Self::Xor => "XOR",
            Self::Ld => "LD",
            Self::Ldc => "LDC",
            Self::Ldci => "LDCI",
            Self::Lde => "LDE",
            Self::Ldei => "LDEI",
            Self::Inc => "INC",
            Self::Dec => "DEC",
            Self::Incw => "INCW",
            Self::Decw => "DECW",
            Self::Da => "DA",
            Self::Com => "COM",
            Self::Clr => "CLR",
            Self::Rl => "RL",
            Self::Rlc => "RLC",
            Self::Rr => "RR",
            Self::Rrc => "RRC",
            Self::Sra => "SRA",
            Self::Swap => "SWAP",
            Self::Push => "PUSH",
            Self::Pop => "POP",
            Self::Srp => "SRP",
            Self::Djnz => "DJNZ",
            Self::Jr => "JR",
            Self::Jp => "JP",
            Self::Call => "CALL",
            Self::Ret => "RET",
            Self::Iret => "IRET",
            Self::Di => "DI",
            Self::Ei => "EI",
            Self::Rcf => "RCF",
            Self::Scf => "SCF",
            Self::Ccf => "CCF",
            Self::Nop => "NOP",
            Self::Halt => "HALT",
            Self::Stop => "STOP",
            Self::Wdh => "WDH",
            Self::Wdt => "WDT",
            Self::Illegal => "???",
        }
    }
}

/// Operand layout following the opcode byte.
///
/// `r` is a 4-bit working register, `R` an 8-bit register address, `I`
/// marks indirection, `RR` a register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Operands {
    /// No operand bytes.
    None,
    /// `R`
    Reg,
    /// `IR`
    IndReg,
    /// `RR`
    RegPair,
    /// `IRR`
    IndRegPair,
    /// `IM` (SRP)
    Imm,
    /// `r1,r2`
    WorkWork,
    /// `r1,Ir2`
    WorkIndWork,
    /// `R1,R2` encoded source first
    RegReg,
    /// `R1,IR2` encoded source first
    RegIndReg,
    /// `R1,IM`
    RegImm,
    /// `IR1,IM`
    IndRegImm,
    /// `r1,R2`
    WorkReg,
    /// `R2,r1`
    RegWork,
    /// `r1,IM`
    WorkImm,
    /// `r1,RA` (DJNZ)
    WorkRel,
    /// `cc,RA`
    CondRel,
    /// `cc,DA`
    CondAbs,
    /// `r1` encoded in the opcode (INC r)
    Work,
    /// `DA`
    Abs,
    /// `r1,Irr2` and `Irr2,r1` (LDC/LDE)
    WorkIndPair,
    /// `Ir1,Irr2` and `Irr2,Ir1` (LDCI/LDEI)
    IndWorkIndPair,
    /// `r1,X(r2)` and `X(r2),r1`
    Indexed,
    /// `Ir1,r2`
    IndWorkWork,
    /// `IR2,R1` encoded source first
    IndRegReg,
}

impl Operands {
    /// Number of operand bytes after the opcode.
    #[must_use]
    pub const fn operand_bytes(self) -> u8 {
        match self {
            Self::None | Self::Work => 0,
            Self::Reg
            | Self::IndReg
            | Self::RegPair
            | Self::IndRegPair
            | Self::Imm
            | Self::WorkWork
            | Self::WorkIndWork
            | Self::WorkReg
            | Self::RegWork
            | Self::WorkImm
            | Self::WorkRel
            | Self::CondRel
            | Self::WorkIndPair
            | Self::IndWorkIndPair
            | Self::IndWorkWork => 1,
            Self::RegReg
            | Self::RegIndReg
            | Self::RegImm
            | Self::IndRegImm
            | Self::CondAbs
            | Self::Abs
            | Self::Indexed
            | Self::IndRegReg => 2,
        }
    }
}

/// Control-flow category used by the debug controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InstructionClass {
    /// `CALL`: pushes a return address.
    Call,
    /// `RET`/`IRET`: pops a return address.
    Return,
    /// `HALT`.
    Halt,
    /// `STOP`.
    Stop,
    /// Everything else.
    Other,
}

/// Static description of one opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OpcodeInfo {
    /// Mnemonic.
    pub mnemonic: Mnemonic,
    /// Operand layout.
    pub operands: Operands,
}

impl OpcodeInfo {
    const fn new(mnemonic: Mnemonic, operands: Operands) -> Self {
        Self { mnemonic, operands }
    }

    /// Total instruction length in bytes, opcode included.
    #[must_use]
    pub const fn length(self) -> u8 {
        1 + self.operands.operand_bytes()
    }

    /// Control-flow category.
    #[must_use]
    pub const fn class(self) -> InstructionClass {
        match self.mnemonic {
            Mnemonic::Call => InstructionClass::Call,
            Mnemonic::Ret | Mnemonic::Iret => InstructionClass::Return,
            Mnemonic::Halt => InstructionClass::Halt,
            Mnemonic::Stop => InstructionClass::Stop,
            _ => InstructionClass::Other,
        }
    }

    /// Returns true for unassigned opcode bytes.
    #[must_use]
    pub const fn is_illegal(self) -> bool {
        matches!(self.mnemonic, Mnemonic::Illegal)
    }
}

/// Arithmetic/logic row mnemonics indexed by opcode high nibble.
///
/// Rows 8, 9 and C..F have no arithmetic group.
pub const ALU_ROWS: [Option<Mnemonic>; 16] = [
    Some(Mnemonic::Add),
    Some(Mnemonic::Adc),
    Some(Mnemonic::Sub),
    Some(Mnemonic::Sbc),
    Some(Mnemonic::Or),
    Some(Mnemonic::And),
    Some(Mnemonic::Tcm),
    Some(Mnemonic::Tm),
    None,
    None,
    Some(Mnemonic::Cp),
    Some(Mnemonic::Xor),
    None,
    None,
    None,
    None,
];

/// Single source of truth for opcode decoding.
pub const OPCODE_TABLE: [OpcodeInfo; 256] = build_opcode_table();

const fn build_opcode_table() -> [OpcodeInfo; 256] {
    let mut table = [OpcodeInfo::new(Mnemonic::Illegal, Operands::None); 256];
    let mut opcode = 0;
    while opcode < 256 {
        table[opcode] = describe(opcode as u8);
        opcode += 1;
    }
    table
}

const fn describe(opcode: u8) -> OpcodeInfo {
    use Mnemonic as M;
    use Operands as O;

    let row = opcode >> 4;
    let column = opcode & 0x0F;

    match column {
        0x8 => return OpcodeInfo::new(M::Ld, O::WorkReg),
        0x9 => return OpcodeInfo::new(M::Ld, O::RegWork),
        0xA => return OpcodeInfo::new(M::Djnz, O::WorkRel),
        0xB => return OpcodeInfo::new(M::Jr, O::CondRel),
        0xC => return OpcodeInfo::new(M::Ld, O::WorkImm),
        0xD => return OpcodeInfo::new(M::Jp, O::CondAbs),
        0xE => return OpcodeInfo::new(M::Inc, O::Work),
        _ => {}
    }

    if let (0x2..=0x7, Some(mnemonic)) = (column, ALU_ROWS[row as usize]) {
        let operands = match column {
            0x2 => O::WorkWork,
            0x3 => O::WorkIndWork,
            0x4 => O::RegReg,
            0x5 => O::RegIndReg,
            0x6 => O::RegImm,
            _ => O::IndRegImm,
        };
        return OpcodeInfo::new(mnemonic, operands);
    }

    let (mnemonic, operands) = match opcode {
        0x00 => (M::Dec, O::Reg),
        0x01 => (M::Dec, O::IndReg),
        0x10 => (M::Rlc, O::Reg),
        0x11 => (M::Rlc, O::IndReg),
        0x20 => (M::Inc, O::Reg),
        0x21 => (M::Inc, O::IndReg),
        0x30 => (M::Jp, O::IndRegPair),
        0x31 => (M::Srp, O::Imm),
        0x40 => (M::Da, O::Reg),
        0x41 => (M::Da, O::IndReg),
        0x4F => (M::Wdh, O::None),
        0x50 => (M::Pop, O::Reg),
        0x51 => (M::Pop, O::IndReg),
        0x5F => (M::Wdt, O::None),
        0x60 => (M::Com, O::Reg),
        0x61 => (M::Com, O::IndReg),
        0x6F => (M::Stop, O::None),
        0x70 => (M::Push, O::Reg),
        0x71 => (M::Push, O::IndReg),
        0x7F => (M::Halt, O::None),
        0x80 => (M::Decw, O::RegPair),
        0x81 => (M::Decw, O::IndReg),
        0x82 | 0x92 => (M::Lde, O::WorkIndPair),
        0x83 | 0x93 => (M::Ldei, O::IndWorkIndPair),
        0x8F => (M::Di, O::None),
        0x90 => (M::Rl, O::Reg),
        0x91 => (M::Rl, O::IndReg),
        0x9F => (M::Ei, O::None),
        0xA0 => (M::Incw, O::RegPair),
        0xA1 => (M::Incw, O::IndReg),
        0xAF => (M::Ret, O::None),
        0xB0 => (M::Clr, O::Reg),
        0xB1 => (M::Clr, O::IndReg),
        0xBF => (M::Iret, O::None),
        0xC0 => (M::Rrc, O::Reg),
        0xC1 => (M::Rrc, O::IndReg),
        0xC2 | 0xD2 => (M::Ldc, O::WorkIndPair),
        0xC3 | 0xD3 => (M::Ldci, O::IndWorkIndPair),
        0xC7 | 0xD7 => (M::Ld, O::Indexed),
        0xCF => (M::Rcf, O::None),
        0xD0 => (M::Sra, O::Reg),
        0xD1 => (M::Sra, O::IndReg),
        0xD4 => (M::Call, O::IndRegPair),
        0xD6 => (M::Call, O::Abs),
        0xDF => (M::Scf, O::None),
        0xE0 => (M::Rr, O::Reg),
        0xE1 => (M::Rr, O::IndReg),
        0xE3 => (M::Ld, O::WorkIndWork),
        0xE4 => (M::Ld, O::RegReg),
        0xE5 => (M::Ld, O::RegIndReg),
        0xE6 => (M::Ld, O::RegImm),
        0xE7 => (M::Ld, O::IndRegImm),
        0xEF => (M::Ccf, O::None),
        0xF0 => (M::Swap, O::Reg),
        0xF1 => (M::Swap, O::IndReg),
        0xF3 => (M::Ld, O::IndWorkWork),
        0xF5 => (M::Ld, O::IndRegReg),
        0xFF => (M::Nop, O::None),
        _ => (M::Illegal, O::None),
    };
    OpcodeInfo::new(mnemonic, operands)
}

/// Looks up the static description of `opcode`.
#[must_use]
pub const fn opcode_info(opcode: u8) -> OpcodeInfo {
    OPCODE_TABLE[opcode as usize]
}

/// Condition-code nibble (opcode high nibble) for `JR cc`/`JP cc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum Condition {
    Never,
    Lt,
    Le,
    Ule,
    Ov,
    Mi,
    Z,
    C,
    Always,
    Ge,
    Gt,
    Ugt,
    Nov,
    Pl,
    Nz,
    Nc,
}

impl Condition {
    /// Decodes the high nibble of a conditional jump opcode.
    #[must_use]
    pub const fn from_opcode(opcode: u8) -> Self {
        match opcode >> 4 {
            0x0 => Self::Never,
            0x1 => Self::Lt,
            0x2 => Self::Le,
            0x3 => Self::Ule,
            0x4 => Self::Ov,
            0x5 => Self::Mi,
            0x6 => Self::Z,
            0x7 => Self::C,
            0x8 => Self::Always,
            0x9 => Self::Ge,
            0xA => Self::Gt,
            0xB => Self::Ugt,
            0xC => Self::Nov,
            0xD => Self::Pl,
            0xE => Self::Nz,
            _ => Self::Nc,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{opcode_info, InstructionClass, Mnemonic, Operands, OPCODE_TABLE};

    #[test]
    fn table_assigns_exactly_the_documented_illegal_bytes() {
        let illegal: Vec<u8> = (0..=u8::MAX)
            .filter(|op| opcode_info(*op).is_illegal())
            .collect();
        assert_eq!(
            illegal,
            vec![
                0x0F, 0x1F, 0x2F, 0x3F, 0x84, 0x85, 0x86, 0x87, 0x94, 0x95, 0x96, 0x97, 0xC4,
                0xC5, 0xC6, 0xD5, 0xE2, 0xF2, 0xF4, 0xF6, 0xF7,
            ]
        );
    }

    #[test]
    fn table_has_one_entry_per_byte() {
        assert_eq!(OPCODE_TABLE.len(), 256);
    }

    #[rstest]
    #[case(0x0C, Mnemonic::Ld, 2)]
    #[case(0x02, Mnemonic::Add, 2)]
    #[case(0xA6, Mnemonic::Cp, 3)]
    #[case(0xD6, Mnemonic::Call, 3)]
    #[case(0xC7, Mnemonic::Ld, 3)]
    #[case(0x8D, Mnemonic::Jp, 3)]
    #[case(0x3E, Mnemonic::Inc, 1)]
    #[case(0x7F, Mnemonic::Halt, 1)]
    #[case(0x31, Mnemonic::Srp, 2)]
    fn lengths_and_mnemonics(#[case] opcode: u8, #[case] mnemonic: Mnemonic, #[case] length: u8) {
        let info = opcode_info(opcode);
        assert_eq!(info.mnemonic, mnemonic);
        assert_eq!(info.length(), length);
    }

    #[test]
    fn control_flow_classes() {
        assert_eq!(opcode_info(0xD4).class(), InstructionClass::Call);
        assert_eq!(opcode_info(0xBF).class(), InstructionClass::Return);
        assert_eq!(opcode_info(0x6F).class(), InstructionClass::Stop);
        assert_eq!(opcode_info(0x8B).class(), InstructionClass::Other);
        assert_eq!(opcode_info(0x30).operands, Operands::IndRegPair);
    }
}
