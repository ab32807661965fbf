//! Deterministic execution fingerprint used by CI cross-host comparison.

use log as _;
use proptest as _;
use rand as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use z8_core::{FlatMemory, IoPort, RegisterInit, StepOutcome, Z8Config, RESET_VECTOR, Z8};

/// Port 3 input that toggles P30 every read so the edge detector fires.
#[derive(Default)]
struct TogglingIo {
    reads: u32,
}

impl IoPort for TogglingIo {
    fn read_port(&mut self, port: u8) -> u8 {
        if port != 3 {
            return 0xFF;
        }
        self.reads = self.reads.wrapping_add(1);
        if self.reads % 7 == 0 {
            0xFE
        } else {
            0xFF
        }
    }

    fn write_port(&mut self, _port: u8, _value: u8) {}
}

const PROGRAM: &[u8] = &[
    0xE6, 0xFF, 0x80, // LD SPL,#80h
    0x31, 0x10, // SRP #10h
    0xE6, 0xF4, 0x03, // LD T0,#3
    0xE6, 0xF5, 0x05, // LD PRE0,#05h
    0xE6, 0xF1, 0x03, // LD TMR,#03h
    0x1C, 0x20, // LD r1,#20h
    0x2E, // loop: INC r2
    0x02, 0x42, // ADD r4,r2
    0xD6, 0x01, 0x00, // CALL 0100h
    0x1A, 0xF8, // DJNZ r1,loop
    0x7F, // HALT
];

const SUBROUTINE: &[u8] = &[
    0x70, 0xE2, // PUSH r2
    0x3C, 0x5A, // LD r3,#5Ah
    0x60, 0xE3, // COM r3
    0x50, 0xE2, // POP r2
    0xAF, // RET
];

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn fingerprint() -> String {
    let mut memory = FlatMemory::new();
    memory.load(RESET_VECTOR, PROGRAM);
    memory.load(0x0100, SUBROUTINE);

    let config = Z8Config {
        register_init: RegisterInit::Random { seed: 0x5A5A },
        cycles_per_second: 0,
        ..Z8Config::default()
    };
    let mut z8 = Z8::new(config, memory, TogglingIo::default());
    let outcome = z8.run_until_parked(10_000);

    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    hash_bytes(&mut hash, &outcome.steps.to_le_bytes());

    match outcome.final_step {
        StepOutcome::Retired { opcode, cycles } => {
            hash_bytes(&mut hash, &[0x10, opcode]);
            hash_bytes(&mut hash, &cycles.to_le_bytes());
        }
        StepOutcome::Idle { cycles } => {
            hash_bytes(&mut hash, &[0x11]);
            hash_bytes(&mut hash, &cycles.to_le_bytes());
        }
        StepOutcome::Parked(mode) => hash_bytes(&mut hash, &[0x12, mode.as_u8()]),
    }

    hash_bytes(&mut hash, &z8.pc().to_le_bytes());
    hash_bytes(&mut hash, &z8.cycles().to_le_bytes());
    hash_bytes(&mut hash, &[z8.run_mode().as_u8()]);
    for addr in 0..=u8::MAX {
        hash_bytes(&mut hash, &[z8.view_register(addr)]);
    }
    hash_bytes(&mut hash, &z8.memory().byte(0x0100).to_le_bytes());

    format!("{hash:016x}")
}

fn main() {
    println!("{}", fingerprint());
}
