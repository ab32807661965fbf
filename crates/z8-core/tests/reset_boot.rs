//! Reset and boot behavior: register reset values, power-on
//! initialization, listeners and the configurable register window.

#![allow(clippy::pedantic, clippy::nursery)]

use std::sync::{Arc, Mutex};

use log as _;
use proptest as _;
use rand as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use rstest::rstest;
use z8_core::state::registers::{
    DISABLED_WINDOW_VALUE, FLAGS, IMR, IRQ, P01M, P2M, P3M, RP, SPL, TMR,
};
use z8_core::{
    FlatMemory, IoPort, NullIo, RegisterInit, ResetKind, RunMode, Scope, Z8Config, RESET_VECTOR,
    Z8,
};

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

#[derive(Debug, Default)]
struct RecordingIo {
    writes: Vec<(u8, u8)>,
}

impl IoPort for RecordingIo {
    fn read_port(&mut self, _port: u8) -> u8 {
        0xFF
    }

    fn write_port(&mut self, port: u8, value: u8) {
        self.writes.push((port, value));
    }
}

#[test]
fn warm_reset_keeps_general_registers_and_power_on_clears_them() {
    let mut z8 = boot(&[]);
    z8.cpu_mut().regs_mut().write(0x20, 0x55);
    z8.cpu_mut().regs_mut().write(FLAGS, 0xF0);

    z8.reset(false);
    assert_eq!(z8.view_register(0x20), 0x55);
    assert_eq!(z8.view_register(FLAGS), 0xF0);

    z8.reset(true);
    assert_eq!(z8.view_register(0x20), 0x00);
    assert_eq!(z8.view_register(FLAGS), 0x00);
}

#[rstest]
#[case::tmr(TMR, 0x0F, 0x00)]
#[case::p2m(P2M, 0x00, 0xFF)]
#[case::p3m(P3M, 0x43, 0x02)]
#[case::p01m(P01M, 0x00, 0x4D)]
#[case::irq(IRQ, 0x3F, 0x00)]
#[case::imr(IMR, 0x9F, 0x1F)]
#[case::rp(RP, 0x30, 0x30)]
#[case::spl(SPL, 0x80, 0x80)]
fn warm_reset_values(#[case] addr: u8, #[case] before: u8, #[case] after: u8) {
    let mut z8 = boot(&[0xFF, 0xFF]);
    z8.step();
    z8.cpu_mut().regs_mut().write(addr, before);

    z8.reset(false);
    assert_eq!(z8.view_register(addr), after);
    assert_eq!(z8.pc(), RESET_VECTOR);
    assert_eq!(z8.cycles(), 0);
    assert_eq!(z8.run_mode(), RunMode::Running);
}

#[test]
fn reset_drives_port3_outputs_high() {
    let z8 = Z8::new(config(), FlatMemory::new(), RecordingIo::default());
    assert_eq!(z8.io().writes, vec![(3, 0xF0)]);
    assert_eq!(z8.view_register(0x03), 0xFF);
}

#[test]
fn reset_listener_can_install_boot_code() {
    let mut z8 = Z8::new(config(), FlatMemory::new(), NullIo);
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&kinds);
    z8.set_reset_listener(Some(Box::new(move |kind, memory: &mut FlatMemory| {
        seen.lock().unwrap().push(kind);
        if kind == ResetKind::PowerOn {
            memory.load(RESET_VECTOR, &[0x4C, 0x99, 0x7F]);
        }
    })));

    z8.reset(true);
    z8.run_until_parked(10);
    assert_eq!(z8.view_register(0x04), 0x99);
    assert_eq!(z8.run_mode(), RunMode::InstHalt);

    z8.reset(false);
    assert_eq!(*kinds.lock().unwrap(), vec![ResetKind::PowerOn, ResetKind::Reset]);
    assert_eq!(z8.run_mode(), RunMode::Running);
}

#[test]
fn random_power_on_contents_repeat_for_a_seed() {
    let config = Z8Config {
        register_init: RegisterInit::Random { seed: 42 },
        ..config()
    };
    let mut z8 = Z8::new(config, FlatMemory::new(), NullIo);
    let general = |z8: &Z8<FlatMemory, NullIo>| {
        (0x04..0x80).map(|r| z8.view_register(r)).collect::<Vec<_>>()
    };
    let first = general(&z8);

    let original = z8.view_register(0x40);
    z8.cpu_mut().regs_mut().write(0x40, !original);
    z8.reset(false);
    assert_eq!(z8.view_register(0x40), !original);

    z8.reset(true);
    assert_eq!(general(&z8), first);
}

#[rstest]
#[case::enabled(true, 0x12)]
#[case::disabled(false, DISABLED_WINDOW_VALUE)]
fn extended_register_window(#[case] extended: bool, #[case] expected: u8) {
    let config = Z8Config {
        extended_registers: extended,
        ..config()
    };
    let mut memory = FlatMemory::new();
    memory.load(RESET_VECTOR, &[0xE6, 0x90, 0x12]); // LD 90h,#12h
    let mut z8 = Z8::new(config, memory, NullIo);

    z8.step();
    assert_eq!(z8.view_register(0x90), expected);
}

#[test]
fn pc_listeners_follow_every_change() {
    let mut z8 = boot(&[0xFF, 0xFF, 0x7F]);
    let pcs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&pcs);
    let id = z8.add_pc_listener(
        Scope::All,
        Box::new(move |pc| sink.lock().unwrap().push(pc)),
    );

    z8.reset(false);
    z8.run_until_parked(10);
    assert_eq!(*pcs.lock().unwrap(), vec![0x000C, 0x000D, 0x000E, 0x000E]);

    assert!(z8.remove_pc_listener(id));
    assert!(!z8.remove_pc_listener(id));
    z8.reset(false);
    assert_eq!(pcs.lock().unwrap().len(), 4);
}

#[test]
fn pre_exec_listener_sees_pc_and_cycles() {
    let mut z8 = boot(&[0xFF, 0xFF, 0x7F]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    z8.set_pre_exec_listener(Some(Box::new(move |pc, cycles, _io: &mut NullIo| {
        sink.lock().unwrap().push((pc, cycles));
    })));

    z8.run_until_parked(10);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![(0x000C, 0), (0x000D, 6), (0x000E, 12)]
    );
}
