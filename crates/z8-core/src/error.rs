use thiserror::Error;

use crate::RunMode;

/// Rejection reasons for debugger-side requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DebugError {
    /// Register and PC edits are only accepted while parked in `DebugStop`.
    #[error("debug edits require DEBUG_STOP, machine is {mode:?}")]
    NotStopped {
        /// Mode observed when the request was made.
        mode: RunMode,
    },
    /// A thread panicked while holding shared debug state.
    #[error("shared debug state poisoned")]
    Poisoned,
}

impl DebugError {
    /// Returns true when retrying after the machine parks can succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::NotStopped { .. })
    }
}
