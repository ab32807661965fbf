//! Cycle-counted Zilog Z8 interpreter with a debug-control state machine.
//!
//! A [`Z8`] owns the processor state and the host's [`MemoryPort`] and
//! [`IoPort`]. The thread that owns it drives execution with [`Z8::step`] or
//! [`Z8::run`]; other threads steer it through a cloned [`DebugHandle`].

/// Host-facing configuration, port traits and step outcomes.
pub mod api;
pub use api::{
    InterruptFrame, IoPort, MemoryPort, NullIo, RegisterInit, RunOutcome, Snapshot, StackMode,
    StepOutcome, Z8Config, DEFAULT_CYCLES_PER_SECOND, DEFAULT_SNAPSHOT_INTERVAL_CYCLES,
};

/// Processor state and stack, port and interrupt primitives.
pub mod cpu;
pub use cpu::{Bus, Cpu};

/// Debug controller shared state and the cross-thread handle.
pub mod debug;
pub use debug::breakpoints::{Breakpoint, BreakpointSet};
pub use debug::{DebugHandle, DebugObserver};

/// Opcode table: mnemonics, operand forms and instruction lengths.
pub mod encoding;
pub use encoding::{opcode_info, Condition, InstructionClass, Mnemonic, OpcodeInfo, Operands};

/// Debugger-side error type.
pub mod error;
pub use error::DebugError;

/// Instruction handlers and the dispatch table.
pub mod execute;
pub use execute::{execute_instruction, Executed, Retire};

/// Interrupt priority decoding and vector lookup.
pub mod interrupt;

/// PC listener registry.
pub mod listeners;
pub use listeners::{ListenerId, PcListener, Scope};

/// The machine and its step loop.
pub mod machine;
pub use machine::{PreExecListener, ResetListener, RESET_VECTOR, Z8};

/// Flat 64 KiB memory for hosts and tests.
pub mod memory;
pub use memory::FlatMemory;

/// Port latches, mode handling and pin edge detection.
pub mod ports;

/// Register file and run-state model.
pub mod state;
pub use state::{DebugAction, RegisterFile, RegisterWrite, ResetKind, RunMode};

/// Counter/timer unit.
pub mod timer;

/// Per-opcode cycle costs.
pub mod timing;
pub use timing::{cycle_cost, CycleCost};

#[cfg(test)]
use proptest as _;
