/// Externally observable execution status of the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum RunMode {
    /// Executing instructions.
    #[default]
    Running = 0,
    /// Parked at an instruction boundary under debugger control.
    DebugStop = 1,
    /// Parked by a `HALT` instruction; the clock and timers keep running.
    InstHalt = 2,
    /// Parked by a `STOP` instruction; the clock is frozen.
    InstStop = 3,
}

impl RunMode {
    /// Returns the stable wire value used for atomic publication.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a value produced by [`Self::as_u8`].
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Running),
            1 => Some(Self::DebugStop),
            2 => Some(Self::InstHalt),
            3 => Some(Self::InstStop),
            _ => None,
        }
    }

    /// Returns true for the modes in which state is consistent for inspection.
    #[must_use]
    pub const fn is_parked(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One-shot debugger command that drives the machine out of `DebugStop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum DebugAction {
    /// Stop at the next instruction boundary.
    Stop = 1,
    /// Execute one instruction, running called subroutines to completion.
    StepOver = 2,
    /// Execute exactly one instruction.
    StepInto = 3,
    /// Run until the current subroutine returns.
    RunToRet = 4,
    /// Resume free execution.
    Run = 5,
}

impl DebugAction {
    /// Returns the nonzero wire value used for atomic submission.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a value produced by [`Self::as_u8`]; zero means "no action".
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Stop),
            2 => Some(Self::StepOver),
            3 => Some(Self::StepInto),
            4 => Some(Self::RunToRet),
            5 => Some(Self::Run),
            _ => None,
        }
    }
}

/// Why the reset listener fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ResetKind {
    /// Power-on: register contents are reinitialized.
    PowerOn,
    /// Warm reset: only control registers take their reset values.
    Reset,
}
