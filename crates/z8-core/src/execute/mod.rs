//! Instruction execution: a 256-entry table of handler functions indexed by
//! opcode byte.
//!
//! A handler consumes its operand bytes, applies the instruction to the
//! processor state and reports which cycle cost applies. The dispatcher then
//! charges the cost from [`crate::timing`].

pub(crate) mod alu;

use crate::cpu::{Bus, Cpu};
use crate::encoding::Condition;
use crate::state::registers::{FLAG_C, RP};
use crate::timing::cycle_cost;

use self::alu::AluOp;

/// How an instruction finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retire {
    /// Normal completion; charge the base cost.
    Base,
    /// Taken branch or external-stack push; charge the alternate cost.
    Alt,
    /// `HALT` executed; PC is left on the opcode.
    Halt,
    /// `STOP` executed; PC is left on the opcode.
    Stop,
}

/// Result of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    /// Opcode byte.
    pub opcode: u8,
    /// Cycles charged.
    pub cycles: u32,
    /// Completion kind.
    pub retire: Retire,
}

/// Instruction handler. Receives the opcode with PC already past it.
pub type Handler = fn(&mut Cpu, &mut Bus<'_>, u8) -> Retire;

/// Handler table indexed by opcode byte.
pub static DISPATCH: [Handler; 256] = build_dispatch();

const fn build_dispatch() -> [Handler; 256] {
    let mut table: [Handler; 256] = [nop as Handler; 256];
    let mut index = 0;
    while index < 256 {
        table[index] = handler_for(index as u8);
        index += 1;
    }
    table
}

const fn handler_for(opcode: u8) -> Handler {
    match opcode & 0x0F {
        0x8 => return ld_r_reg,
        0x9 => return ld_reg_r,
        0xA => return djnz,
        0xB => return jr,
        0xC => return ld_r_imm,
        0xD => return jp_cc,
        0xE => return inc_r,
        _ => {}
    }
    if AluOp::from_row(opcode).is_some() {
        match opcode & 0x0F {
            0x2 => return alu_r_r,
            0x3 => return alu_r_ir,
            0x4 => return alu_reg_reg,
            0x5 => return alu_reg_ireg,
            0x6 => return alu_reg_imm,
            0x7 => return alu_ireg_imm,
            _ => {}
        }
    }
    match opcode {
        0x00 | 0x01 | 0x10 | 0x11 | 0x20 | 0x21 | 0x40 | 0x41 | 0x60 | 0x61 | 0x90 | 0x91
        | 0xB0 | 0xB1 | 0xC0 | 0xC1 | 0xD0 | 0xD1 | 0xE0 | 0xE1 | 0xF0 | 0xF1 => unary,
        0x30 => jp_indirect,
        0x31 => srp,
        0x50 | 0x51 => pop,
        0x6F => stop,
        0x70 | 0x71 => push,
        0x7F => halt,
        0x80 | 0x81 | 0xA0 | 0xA1 => word_step,
        0x82 | 0xC2 => load_from_memory,
        0x83 | 0xC3 => load_from_memory_increment,
        0x92 | 0xD2 => store_to_memory,
        0x93 | 0xD3 => store_to_memory_increment,
        0x8F => di,
        0x9F => ei,
        0xAF => ret,
        0xBF => iret,
        0xC7 => ld_indexed_load,
        0xD7 => ld_indexed_store,
        0xCF | 0xDF | 0xEF => carry_op,
        0xD4 => call_indirect,
        0xD6 => call_direct,
        0xE3 => ld_r_ir,
        0xE4 => ld_reg_reg,
        0xE5 => ld_reg_ireg,
        0xE6 => ld_reg_imm,
        0xE7 => ld_ireg_imm,
        0xF3 => ld_ir_r,
        0xF5 => ld_ireg_reg,
        _ => nop,
    }
}

/// Fetches, dispatches and retires one instruction.
pub fn execute_instruction(cpu: &mut Cpu, bus: &mut Bus<'_>) -> Executed {
    let opcode = cpu.fetch(bus);
    let retire = DISPATCH[usize::from(opcode)](cpu, bus, opcode);
    let cost = cycle_cost(opcode);
    let cycles = u32::from(match retire {
        Retire::Alt => cost.alt,
        Retire::Base | Retire::Halt | Retire::Stop => cost.base,
    });
    cpu.add_cycles(cycles);
    Executed {
        opcode,
        cycles,
        retire,
    }
}

fn relative(pc: u16, displacement: u8) -> u16 {
    pc.wrapping_add_signed(i16::from(i8::from_ne_bytes([displacement])))
}

// Operand decoding

fn reg_operand(cpu: &mut Cpu, bus: &mut Bus<'_>) -> u8 {
    let r = cpu.fetch(bus);
    cpu.resolve(r)
}

fn ireg_operand(cpu: &mut Cpu, bus: &mut Bus<'_>) -> u8 {
    let r = cpu.fetch(bus);
    cpu.indirect(bus, r)
}

/// Splits an `r1,r2` operand byte into two working register numbers.
fn work_pair(cpu: &mut Cpu, bus: &mut Bus<'_>) -> (u8, u8) {
    let byte = cpu.fetch(bus);
    (cpu.work(byte >> 4), cpu.work(byte & 0x0F))
}

fn alu_store(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8, dst: u8, src_value: u8) {
    let Some(op) = AluOp::from_row(opcode) else {
        return;
    };
    let dst_value = cpu.read_reg(bus, dst);
    if let Some(result) = op.apply(cpu.regs_mut(), dst_value, src_value) {
        cpu.write_reg(dst, result);
    }
}

// Column 8..E

fn ld_r_reg(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let dst = cpu.work(opcode >> 4);
    let src = reg_operand(cpu, bus);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_reg_r(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let src = cpu.work(opcode >> 4);
    let dst = reg_operand(cpu, bus);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn djnz(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let r = cpu.work(opcode >> 4);
    let displacement = cpu.fetch(bus);
    let value = cpu.read_reg(bus, r).wrapping_sub(1);
    cpu.write_reg(r, value);
    if value == 0 {
        return Retire::Base;
    }
    cpu.set_pc(relative(cpu.pc(), displacement));
    Retire::Alt
}

fn jr(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let displacement = cpu.fetch(bus);
    if !cpu.condition(Condition::from_opcode(opcode)) {
        return Retire::Base;
    }
    cpu.set_pc(relative(cpu.pc(), displacement));
    Retire::Alt
}

fn ld_r_imm(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let value = cpu.fetch(bus);
    cpu.write_reg(cpu.work(opcode >> 4), value);
    Retire::Base
}

fn jp_cc(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let target = cpu.fetch_word(bus);
    if !cpu.condition(Condition::from_opcode(opcode)) {
        return Retire::Base;
    }
    cpu.set_pc(target);
    Retire::Alt
}

fn inc_r(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let r = cpu.work(opcode >> 4);
    let value = cpu.read_reg(bus, r);
    let result = alu::inc(cpu.regs_mut(), value);
    cpu.write_reg(r, result);
    Retire::Base
}

// Arithmetic rows, columns 2..7

fn alu_r_r(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let (dst, src) = work_pair(cpu, bus);
    let value = cpu.read_reg(bus, src);
    alu_store(cpu, bus, opcode, dst, value);
    Retire::Base
}

fn alu_r_ir(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let (dst, holder) = work_pair(cpu, bus);
    let src = cpu.read_reg(bus, holder);
    let value = cpu.read_reg(bus, src);
    alu_store(cpu, bus, opcode, dst, value);
    Retire::Base
}

fn alu_reg_reg(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let src = reg_operand(cpu, bus);
    let dst = reg_operand(cpu, bus);
    let value = cpu.read_reg(bus, src);
    alu_store(cpu, bus, opcode, dst, value);
    Retire::Base
}

fn alu_reg_ireg(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let src = ireg_operand(cpu, bus);
    let dst = reg_operand(cpu, bus);
    let value = cpu.read_reg(bus, src);
    alu_store(cpu, bus, opcode, dst, value);
    Retire::Base
}

fn alu_reg_imm(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let dst = reg_operand(cpu, bus);
    let value = cpu.fetch(bus);
    alu_store(cpu, bus, opcode, dst, value);
    Retire::Base
}

fn alu_ireg_imm(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let dst = ireg_operand(cpu, bus);
    let value = cpu.fetch(bus);
    alu_store(cpu, bus, opcode, dst, value);
    Retire::Base
}

// Single-operand group, columns 0 and 1

fn unary(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let target = if opcode & 0x01 == 0 {
        reg_operand(cpu, bus)
    } else {
        ireg_operand(cpu, bus)
    };
    let value = cpu.read_reg(bus, target);
    let regs = cpu.regs_mut();
    let result = match opcode >> 4 {
        0x0 => alu::dec(regs, value),
        0x1 => alu::rlc(regs, value),
        0x2 => alu::inc(regs, value),
        0x4 => alu::decimal_adjust(regs, value),
        0x6 => alu::com(regs, value),
        0x9 => alu::rl(regs, value),
        0xB => 0,
        0xC => alu::rrc(regs, value),
        0xD => alu::sra(regs, value),
        0xE => alu::rr(regs, value),
        _ => alu::swap(regs, value),
    };
    cpu.write_reg(target, result);
    Retire::Base
}

fn word_step(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let pair = if opcode & 0x01 == 0 {
        reg_operand(cpu, bus)
    } else {
        ireg_operand(cpu, bus)
    };
    let value = cpu.read_reg_word(bus, pair);
    let result = if opcode & 0xF0 == 0x80 {
        alu::decw(cpu.regs_mut(), value)
    } else {
        alu::incw(cpu.regs_mut(), value)
    };
    cpu.write_reg_word(pair, result);
    Retire::Base
}

// Control transfer

fn jp_indirect(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let pair = reg_operand(cpu, bus);
    let target = cpu.read_reg_word(bus, pair);
    cpu.set_pc(target);
    Retire::Base
}

fn call_indirect(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let pair = reg_operand(cpu, bus);
    let target = cpu.read_reg_word(bus, pair);
    cpu.push_word(bus, cpu.pc());
    cpu.set_pc(target);
    Retire::Base
}

fn call_direct(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let target = cpu.fetch_word(bus);
    cpu.push_word(bus, cpu.pc());
    cpu.set_pc(target);
    Retire::Base
}

fn ret(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let target = cpu.pop_word(bus);
    cpu.set_pc(target);
    Retire::Base
}

fn iret(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    cpu.return_from_interrupt(bus);
    Retire::Base
}

fn halt(cpu: &mut Cpu, _bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    cpu.set_pc(cpu.pc().wrapping_sub(1));
    Retire::Halt
}

fn stop(cpu: &mut Cpu, _bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    cpu.set_pc(cpu.pc().wrapping_sub(1));
    Retire::Stop
}

// Stack and control registers

fn push(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let src = if opcode & 0x01 == 0 {
        reg_operand(cpu, bus)
    } else {
        ireg_operand(cpu, bus)
    };
    let value = cpu.read_reg(bus, src);
    cpu.push(bus, value);
    if cpu.regs().internal_stack() {
        Retire::Base
    } else {
        Retire::Alt
    }
}

fn pop(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let dst = if opcode & 0x01 == 0 {
        reg_operand(cpu, bus)
    } else {
        ireg_operand(cpu, bus)
    };
    let value = cpu.pop(bus);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn srp(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let value = cpu.fetch(bus);
    cpu.write_reg(RP, value & 0xF0);
    Retire::Base
}

fn di(cpu: &mut Cpu, _bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    cpu.regs_mut().set_interrupts_enabled(false);
    Retire::Base
}

fn ei(cpu: &mut Cpu, _bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    cpu.regs_mut().set_interrupts_enabled(true);
    Retire::Base
}

fn carry_op(cpu: &mut Cpu, _bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let regs = cpu.regs_mut();
    let carry = match opcode {
        0xCF => false,
        0xDF => true,
        _ => !regs.read_flag(FLAG_C),
    };
    regs.write_flag(FLAG_C, carry);
    Retire::Base
}

fn nop(_cpu: &mut Cpu, _bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    Retire::Base
}

// Loads

fn ld_r_ir(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let (dst, holder) = work_pair(cpu, bus);
    let src = cpu.read_reg(bus, holder);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_ir_r(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let (holder, src) = work_pair(cpu, bus);
    let dst = cpu.read_reg(bus, holder);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_reg_reg(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let src = reg_operand(cpu, bus);
    let dst = reg_operand(cpu, bus);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_reg_ireg(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let src = ireg_operand(cpu, bus);
    let dst = reg_operand(cpu, bus);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_reg_imm(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let dst = reg_operand(cpu, bus);
    let value = cpu.fetch(bus);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_ireg_imm(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let dst = ireg_operand(cpu, bus);
    let value = cpu.fetch(bus);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_ireg_reg(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let src = reg_operand(cpu, bus);
    let dst = ireg_operand(cpu, bus);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_indexed_load(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let (dst, index) = work_pair(cpu, bus);
    let offset = cpu.fetch(bus);
    let src = cpu.read_reg(bus, index).wrapping_add(offset);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

fn ld_indexed_store(cpu: &mut Cpu, bus: &mut Bus<'_>, _opcode: u8) -> Retire {
    let (src, index) = work_pair(cpu, bus);
    let offset = cpu.fetch(bus);
    let dst = cpu.read_reg(bus, index).wrapping_add(offset);
    let value = cpu.read_reg(bus, src);
    cpu.write_reg(dst, value);
    Retire::Base
}

// Rows 8 and 9 address data space (LDE), rows C and D code space (LDC).

const fn data_space(opcode: u8) -> bool {
    opcode & 0xE0 == 0x80
}

fn load_from_memory(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let (dst, pair) = work_pair(cpu, bus);
    let addr = cpu.read_reg_word(bus, pair);
    let value = bus.memory.read_byte(addr, data_space(opcode));
    cpu.write_reg(dst, value);
    Retire::Base
}

fn load_from_memory_increment(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let (holder, pair) = work_pair(cpu, bus);
    let dst = cpu.read_reg(bus, holder);
    let addr = cpu.read_reg_word(bus, pair);
    let value = bus.memory.read_byte(addr, data_space(opcode));
    cpu.write_reg(dst, value);
    cpu.write_reg(holder, dst.wrapping_add(1));
    cpu.write_reg_word(pair, addr.wrapping_add(1));
    Retire::Base
}

fn store_to_memory(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let (src, pair) = work_pair(cpu, bus);
    let addr = cpu.read_reg_word(bus, pair);
    let value = cpu.read_reg(bus, src);
    bus.memory.write_byte(addr, data_space(opcode), value);
    Retire::Base
}

fn store_to_memory_increment(cpu: &mut Cpu, bus: &mut Bus<'_>, opcode: u8) -> Retire {
    let (holder, pair) = work_pair(cpu, bus);
    let src = cpu.read_reg(bus, holder);
    let addr = cpu.read_reg_word(bus, pair);
    let value = cpu.read_reg(bus, src);
    bus.memory.write_byte(addr, data_space(opcode), value);
    cpu.write_reg(holder, src.wrapping_add(1));
    cpu.write_reg_word(pair, addr.wrapping_add(1));
    Retire::Base
}
