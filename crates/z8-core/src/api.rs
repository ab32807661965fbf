//! Host-facing contracts: configuration, the memory and IO ports the core
//! calls out through, and the outcome types returned by the step loop.

use crate::state::registers::REGISTER_COUNT;
use crate::RunMode;

/// Default clock rate used for wall-clock pacing.
pub const DEFAULT_CYCLES_PER_SECOND: u32 = 4_000_000;

/// Default number of cycles between snapshot publications while running.
pub const DEFAULT_SNAPSHOT_INTERVAL_CYCLES: u64 = 20_000;

/// How general registers are initialized on power-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterInit {
    /// All general registers read zero.
    #[default]
    Zero,
    /// General registers hold pseudo-random bytes from a seeded generator.
    Random {
        /// Seed for the generator; the same seed gives the same contents.
        seed: u64,
    },
}

/// Stack mode selected by the reset value of `P01M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StackMode {
    /// `SPL` indexes the register file.
    #[default]
    Internal,
    /// `SPH:SPL` addresses host data memory.
    External,
}

/// What interrupt acceptance pushes and `IRET` pops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptFrame {
    /// Return address followed by `FLAGS` (Z8 hardware behavior).
    #[default]
    PcAndFlags,
    /// Return address only.
    PcOnly,
}

/// Construction-time configuration for a [`crate::Z8`] instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Z8Config {
    /// Power-on contents of the general registers.
    pub register_init: RegisterInit,
    /// Backs 0x80..=0xEF with storage.
    pub extended_registers: bool,
    /// Target clock for wall-clock pacing in `run`; zero runs unthrottled.
    pub cycles_per_second: u32,
    /// Stack mode after every reset.
    pub stack_mode: StackMode,
    /// Interrupt stack frame layout.
    pub interrupt_frame: InterruptFrame,
    /// Cycles between snapshot publications while running.
    pub snapshot_interval_cycles: u64,
}

impl Default for Z8Config {
    fn default() -> Self {
        Self {
            register_init: RegisterInit::Zero,
            extended_registers: false,
            cycles_per_second: DEFAULT_CYCLES_PER_SECOND,
            stack_mode: StackMode::Internal,
            interrupt_frame: InterruptFrame::PcAndFlags,
            snapshot_interval_cycles: DEFAULT_SNAPSHOT_INTERVAL_CYCLES,
        }
    }
}

/// Byte-wide memory as seen by the core.
///
/// Every call is total: hosts map unmapped addresses to some value rather
/// than failing.
pub trait MemoryPort {
    /// Reads a byte from code space (`data_space == false`) or data space.
    fn read_byte(&mut self, addr: u16, data_space: bool) -> u8;

    /// Writes a byte; returns false when the address is read-only.
    fn write_byte(&mut self, addr: u16, data_space: bool, value: u8) -> bool;
}

/// The four 8-bit I/O ports as seen by the core.
pub trait IoPort {
    /// Samples the pins of `port` (0..=3).
    fn read_port(&mut self, port: u8) -> u8;

    /// Drives new output levels on `port` (0..=3).
    fn write_port(&mut self, port: u8, value: u8);
}

/// Port implementation with all pins pulled high and nothing attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullIo;

impl IoPort for NullIo {
    fn read_port(&mut self, _port: u8) -> u8 {
        0xFF
    }

    fn write_port(&mut self, _port: u8, _value: u8) {}
}

/// Result of one call to [`crate::Z8::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StepOutcome {
    /// One instruction retired; `cycles` includes any interrupt entry that followed.
    Retired {
        /// Opcode byte of the retired instruction.
        opcode: u8,
        /// Cycles added to the counter by this step.
        cycles: u32,
    },
    /// Halted: the clock advanced without executing an instruction.
    Idle {
        /// Cycles added to the counter by this step.
        cycles: u32,
    },
    /// No progress is possible until a debugger action or reset arrives.
    Parked(RunMode),
}

impl StepOutcome {
    /// Cycles consumed by this step.
    #[must_use]
    pub const fn cycles(self) -> u32 {
        match self {
            Self::Retired { cycles, .. } | Self::Idle { cycles } => cycles,
            Self::Parked(_) => 0,
        }
    }
}

/// Aggregate result of a bounded multi-step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RunOutcome {
    /// Number of `step` calls that made progress.
    pub steps: u32,
    /// Outcome of the final step.
    pub final_step: StepOutcome,
}

/// Copy of the observable machine state, published for other threads.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Snapshot {
    /// Program counter.
    pub pc: u16,
    /// Cycle counter.
    pub cycles: u64,
    /// Run mode at publication time.
    pub run_mode: RunMode,
    /// Side-effect-free view of all 256 register addresses.
    pub registers: Box<[u8]>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            pc: 0,
            cycles: 0,
            run_mode: RunMode::Running,
            registers: vec![0; REGISTER_COUNT].into_boxed_slice(),
        }
    }
}

impl Snapshot {
    /// Register value at `addr`.
    #[must_use]
    pub fn register(&self, addr: u8) -> u8 {
        self.registers
            .get(usize::from(addr))
            .copied()
            .unwrap_or_default()
    }
}
