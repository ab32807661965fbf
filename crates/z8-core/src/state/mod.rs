//! Register file and execution-status model.

/// Register space, flag bits and control-register addresses.
pub mod registers;
/// Run modes, debugger actions and reset kinds.
pub mod run_state;

pub use registers::{RegisterFile, RegisterWrite, REGISTER_COUNT};
pub use run_state::{DebugAction, ResetKind, RunMode};
