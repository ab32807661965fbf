//! Instruction-level behavior driven through the full step loop: cycle
//! accounting, stack placement, interrupts, timers and port edges.

#![allow(clippy::pedantic, clippy::nursery, clippy::too_many_lines)]

use std::sync::{Arc, Mutex};

use log as _;
use proptest as _;
use rand as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use rstest::rstest;
use z8_core::state::registers::{
    FLAGS, FLAG_C, FLAG_S, FLAG_V, FLAG_Z, IMR, IRQ, P01M, SPH, SPL, T0,
};
use z8_core::{
    FlatMemory, IoPort, MemoryPort, NullIo, RunMode, Scope, StackMode, StepOutcome, Z8Config,
    RESET_VECTOR, Z8,
};

const ARITH_FLAGS: u8 = FLAG_C | FLAG_Z | FLAG_S | FLAG_V;

/// Flat memory that records every data-space access.
#[derive(Debug, Default)]
struct RecordingMemory {
    inner: FlatMemory,
    data_accesses: Vec<(u16, bool)>,
}

impl MemoryPort for RecordingMemory {
    fn read_byte(&mut self, addr: u16, data_space: bool) -> u8 {
        if data_space {
            self.data_accesses.push((addr, false));
        }
        self.inner.read_byte(addr, data_space)
    }

    fn write_byte(&mut self, addr: u16, data_space: bool, value: u8) -> bool {
        if data_space {
            self.data_accesses.push((addr, true));
        }
        self.inner.write_byte(addr, data_space, value)
    }
}

/// Port 3 pins driven by the test; everything else pulled high.
#[derive(Debug)]
struct PinIo {
    port3: u8,
}

impl IoPort for PinIo {
    fn read_port(&mut self, port: u8) -> u8 {
        if port == 3 {
            self.port3
        } else {
            0xFF
        }
    }

    fn write_port(&mut self, _port: u8, _value: u8) {}
}

fn config() -> Z8Config {
    Z8Config {
        cycles_per_second: 0,
        ..Z8Config::default()
    }
}

fn boot(program: &[u8]) -> Z8<FlatMemory, NullIo> {
    let mut memory = FlatMemory::new();
    memory.load(RESET_VECTOR, program);
    Z8::new(config(), memory, NullIo)
}

fn boot_recording(
    config: Z8Config,
    program: &[u8],
    subroutine: &[u8],
) -> Z8<RecordingMemory, NullIo> {
    let mut memory = RecordingMemory::default();
    memory.inner.load(RESET_VECTOR, program);
    memory.inner.load(0x0100, subroutine);
    Z8::new(config, memory, NullIo)
}

#[test]
fn counting_loop_retires_with_exact_cycle_total() {
    let mut z8 = boot(&[
        0x31, 0x10, // SRP #10h
        0x1C, 0x03, // LD r1,#3
        0x2C, 0x00, // LD r2,#0
        0x2E, // loop: INC r2
        0x1A, 0xFD, // DJNZ r1,loop
        0x7F, // HALT
    ]);

    let outcome = z8.run_until_parked(100);
    assert_eq!(outcome.steps, 10);
    assert_eq!(
        outcome.final_step,
        StepOutcome::Retired {
            opcode: 0x7F,
            cycles: 7
        }
    );
    assert_eq!(z8.run_mode(), RunMode::InstHalt);
    assert_eq!(z8.pc(), 0x0015);
    assert_eq!(z8.view_register(0x12), 3);
    assert_eq!(z8.view_register(0x11), 0);
    assert_eq!(z8.cycles(), 77);
}

#[rstest]
#[case::add_overflows_into_sign(0x06, 0x7F, 0x01, 0x80, FLAG_S | FLAG_V)]
#[case::adc_carries_out(0x16, 0xFF, 0x01, 0x00, FLAG_C | FLAG_Z)]
#[case::sub_borrows(0x26, 0x00, 0x01, 0xFF, FLAG_C | FLAG_S)]
#[case::or_merges(0x46, 0x10, 0x01, 0x11, 0)]
#[case::and_clears(0x56, 0xF0, 0x0F, 0x00, FLAG_Z)]
#[case::tm_keeps_destination(0x76, 0x0F, 0xF0, 0x0F, FLAG_Z)]
#[case::cp_keeps_destination(0xA6, 0x10, 0x20, 0x10, FLAG_C | FLAG_S)]
#[case::xor_to_zero(0xB6, 0xFF, 0xFF, 0x00, FLAG_Z)]
fn register_immediate_arithmetic(
    #[case] opcode: u8,
    #[case] dst: u8,
    #[case] imm: u8,
    #[case] result: u8,
    #[case] flags: u8,
) {
    let mut z8 = boot(&[opcode, 0x20, imm]);
    z8.cpu_mut().regs_mut().write(0x20, dst);

    assert_eq!(z8.step(), StepOutcome::Retired { opcode, cycles: 10 });
    assert_eq!(z8.view_register(0x20), result);
    assert_eq!(z8.view_register(FLAGS) & ARITH_FLAGS, flags);
}

#[test]
fn call_and_return_on_internal_stack_never_touch_memory() {
    let mut z8 = boot_recording(
        config(),
        &[
            0xE6, 0xFF, 0x80, // LD SPL,#80h
            0xD6, 0x01, 0x00, // CALL 0100h
            0x7F, // HALT
        ],
        &[
            0x5C, 0x55, // LD r5,#55h
            0xAF, // RET
        ],
    );

    let outcome = z8.run_until_parked(100);
    assert_eq!(outcome.steps, 5);
    assert_eq!(z8.pc(), 0x0012);
    assert_eq!(z8.view_register(0x05), 0x55);
    assert_eq!(z8.view_register(SPL), 0x80);
    assert_eq!(z8.view_register(0x7F), 0x12);
    assert_eq!(z8.view_register(0x7E), 0x00);
    assert_eq!(z8.cycles(), 10 + 20 + 6 + 14 + 7);
    assert!(z8.memory().data_accesses.is_empty());
}

#[test]
fn external_stack_uses_only_stack_pointer_addresses() {
    let config = Z8Config {
        stack_mode: StackMode::External,
        ..config()
    };
    let mut z8 = boot_recording(
        config,
        &[
            0xE6, 0xFE, 0x20, // LD SPH,#20h
            0xE6, 0xFF, 0x00, // LD SPL,#00h
            0xD6, 0x01, 0x00, // CALL 0100h
            0x7F, // HALT
        ],
        &[0xAF],
    );
    assert_eq!(z8.view_register(P01M), 0x49);

    z8.run_until_parked(100);
    assert_eq!(z8.pc(), 0x0015);
    assert_eq!((z8.view_register(SPH), z8.view_register(SPL)), (0x20, 0x00));
    assert_eq!(z8.memory().inner.byte(0x1FFF), 0x15);
    assert_eq!(z8.memory().inner.byte(0x1FFE), 0x00);
    assert_eq!(
        z8.memory().data_accesses,
        vec![(0x1FFF, true), (0x1FFE, true), (0x1FFE, false), (0x1FFF, false)]
    );
}

#[test]
fn external_push_charges_the_alternate_cost() {
    let config = Z8Config {
        stack_mode: StackMode::External,
        ..config()
    };
    let mut z8 = boot_recording(config, &[0x70, 0x20], &[]);
    z8.cpu_mut().regs_mut().write(SPH, 0x30);

    assert_eq!(
        z8.step(),
        StepOutcome::Retired {
            opcode: 0x70,
            cycles: 12
        }
    );
    assert_eq!(z8.memory().data_accesses, vec![(0x2FFF, true)]);
}

fn interrupt_program(handler: &[u8]) -> Z8<FlatMemory, NullIo> {
    let mut memory = FlatMemory::new();
    memory.load(0x0008, &[0x01, 0x00]);
    memory.load(
        RESET_VECTOR,
        &[
            0xE6, 0xFF, 0x80, // LD SPL,#80h
            0xE6, 0xF9, 0x08, // LD IPR,#08h
            0xE6, 0xFB, 0x10, // LD IMR,#10h
            0xE6, 0xFA, 0x10, // LD IRQ,#10h
            0x9F, // EI
            0xFF, // NOP
            0x7F, // HALT
        ],
    );
    memory.load(0x0100, handler);
    Z8::new(config(), memory, NullIo)
}

#[test]
fn interrupt_entry_pushes_frame_and_masks() {
    let mut z8 = interrupt_program(&[0x7F]);
    for _ in 0..4 {
        z8.step();
    }

    assert_eq!(
        z8.step(),
        StepOutcome::Retired {
            opcode: 0x9F,
            cycles: 12
        }
    );
    assert_eq!(z8.pc(), 0x0100);
    assert_eq!(z8.view_register(SPL), 0x7D);
    assert_eq!(z8.view_register(0x7F), 0x19);
    assert_eq!(z8.view_register(0x7E), 0x00);
    assert_eq!(z8.view_register(IRQ), 0x00);
    assert_eq!(z8.view_register(IMR), 0x10);
}

#[test]
fn pc_listeners_see_both_the_retired_pc_and_the_vector() {
    let mut z8 = interrupt_program(&[0x7F]);
    let visited = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&visited);
    z8.add_pc_listener(Scope::All, Box::new(move |pc| sink.lock().unwrap().push(pc)));

    for _ in 0..5 {
        z8.step();
    }
    assert_eq!(
        *visited.lock().unwrap(),
        vec![0x000F, 0x0012, 0x0015, 0x0018, 0x0019, 0x0100]
    );
}

#[test]
fn iret_resumes_after_the_interrupted_instruction() {
    let mut z8 = interrupt_program(&[0xDF, 0xBF]);
    let visited = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&visited);
    z8.add_pc_listener(
        Scope::Address(0x0100),
        Box::new(move |pc| sink.lock().unwrap().push(pc)),
    );

    z8.run_until_parked(100);
    assert_eq!(z8.run_mode(), RunMode::InstHalt);
    assert_eq!(z8.pc(), 0x001A);
    assert_eq!(z8.view_register(SPL), 0x80);
    assert_eq!(z8.view_register(IMR), 0x90);
    assert_eq!(z8.view_register(FLAGS) & FLAG_C, 0);
    assert_eq!(*visited.lock().unwrap(), vec![0x0100]);
}

#[test]
fn timer_zero_underflow_requests_irq4() {
    let mut z8 = boot(&[
        0xE6, 0xF4, 0x02, // LD T0,#2
        0xE6, 0xF5, 0x05, // LD PRE0,#05h
        0xE6, 0xF1, 0x03, // LD TMR,#03h
        0x8B, 0xFE, // JR $
    ]);
    z8.step();
    z8.step();
    assert_eq!(z8.view_register(T0), 2);
    assert_eq!(z8.view_register(IRQ) & 0x10, 0);

    for _ in 0..3 {
        z8.step();
    }
    assert_ne!(z8.view_register(IRQ) & 0x10, 0);
}

#[rstest]
#[case::p32(0xFB, 0x01)]
#[case::p33(0xF7, 0x02)]
#[case::p31(0xFD, 0x04)]
#[case::p30(0xFE, 0x08)]
fn port3_falling_edges_raise_requests(#[case] pins: u8, #[case] irq: u8) {
    let mut memory = FlatMemory::new();
    memory.load(RESET_VECTOR, &[0xFF, 0xFF, 0xFF]);
    let mut z8 = Z8::new(config(), memory, PinIo { port3: 0xFF });

    z8.step();
    assert_eq!(z8.view_register(IRQ), 0);
    z8.io_mut().port3 = pins;
    z8.step();
    assert_eq!(z8.view_register(IRQ), irq);
}

#[test]
fn lde_writes_data_space_and_ldc_respects_rom() {
    let mut memory = RecordingMemory::default();
    memory.inner = FlatMemory::new().with_rom(0x0000..=0x0FFF);
    memory.inner.load(
        RESET_VECTOR,
        &[
            0x31, 0x20, // SRP #20h
            0x2C, 0xAB, // LD r2,#ABh
            0x4C, 0x30, // LD r4,#30h
            0x5C, 0x00, // LD r5,#00h
            0x92, 0x24, // LDE @rr4,r2
            0x4C, 0x01, // LD r4,#01h
            0xD2, 0x24, // LDC @rr4,r2
        ],
    );
    let mut z8 = Z8::new(config(), memory, NullIo);
    for _ in 0..7 {
        z8.step();
    }

    assert_eq!(z8.memory().inner.byte(0x3000), 0xAB);
    assert_eq!(z8.memory().data_accesses, vec![(0x3000, true)]);
    assert_eq!(z8.memory().inner.byte(0x0100), 0x00);
}
