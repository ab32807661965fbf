//! Counter/timers T0 and T1 with their 6-bit prescalers.
//!
//! The prescaler is clocked at a quarter of the CPU clock. Each prescaler
//! underflow decrements the 8-bit counter; counter underflow raises the
//! timer's interrupt request and either reloads (continuous mode) or stops.

use crate::state::registers::{
    RegisterFile, IRQ_T0, IRQ_T1, P3M_P31_HANDSHAKE, P3M_SERIAL_IO, TMR_ENABLE_T0, TMR_ENABLE_T1,
    TMR_LOAD_T0, TMR_LOAD_T1, TMR_T1_INPUT_MASK, TMR_TOUT_MASK,
};

/// CPU clock cycles per prescaler decrement.
pub const CYCLES_PER_PRESCALER_TICK: u32 = 4;

/// Identifies one of the two on-chip timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TimerId {
    /// Counter/timer 0 (`T0`/`PRE0`).
    T0,
    /// Counter/timer 1 (`T1`/`PRE1`).
    T1,
}

/// One countdown timer and its prescaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Timer {
    clock_divider: u32,
    prescaler: u8,
    prescaler_reload: u8,
    counter: u8,
    counter_reload: u8,
    continuous: bool,
    continuous_reload: bool,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Creates a stopped timer with zeroed reload latches.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clock_divider: CYCLES_PER_PRESCALER_TICK,
            prescaler: 0,
            prescaler_reload: 0,
            counter: 0,
            counter_reload: 0,
            continuous: false,
            continuous_reload: false,
        }
    }

    /// Live counter value (what a read of `T0`/`T1` returns).
    #[must_use]
    pub const fn counter(&self) -> u8 {
        self.counter
    }

    /// Live 6-bit prescaler count.
    #[must_use]
    pub const fn prescaler(&self) -> u8 {
        self.prescaler
    }

    /// Counter reload latch.
    #[must_use]
    pub const fn counter_reload(&self) -> u8 {
        self.counter_reload
    }

    /// Prescaler reload latch.
    #[must_use]
    pub const fn prescaler_reload(&self) -> u8 {
        self.prescaler_reload
    }

    /// Returns true when the active count mode reloads on underflow.
    #[must_use]
    pub const fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Latches a new counter start value (guest write to `T0`/`T1`).
    pub fn set_counter_reload(&mut self, value: u8) {
        self.counter_reload = value;
    }

    /// Latches a prescaler write: bits 7..2 are the divisor, bit 0 the count mode.
    pub fn set_prescaler_reload(&mut self, value: u8) {
        self.prescaler_reload = (value >> 2) & 0x3F;
        self.continuous_reload = value & 0x01 != 0;
    }

    /// Transfers the reload latches into the live counters.
    pub fn load(&mut self) {
        self.prescaler = self.prescaler_reload;
        self.counter = self.counter_reload;
        self.continuous = self.continuous_reload;
    }

    /// Advances the timer by `cycles` CPU clocks.
    ///
    /// Returns true if the counter reached zero at least once. A prescaler
    /// reload of zero divides by 64. A counter of zero counts 256 ticks in
    /// continuous mode; a single-pass timer sitting at zero stays idle.
    pub fn advance(&mut self, mut cycles: u32) -> bool {
        let mut underflow = false;
        while cycles > 0 && (self.continuous || self.counter > 0) {
            if cycles >= self.clock_divider {
                cycles -= self.clock_divider;
                self.clock_divider = CYCLES_PER_PRESCALER_TICK;
                underflow |= self.tick_prescaler();
            } else {
                self.clock_divider -= cycles;
                cycles = 0;
            }
        }
        underflow
    }

    /// Applies a single external clock edge to the counter (T1 external mode).
    pub fn pulse(&mut self) -> bool {
        if self.continuous || self.counter > 0 {
            self.tick_prescaler()
        } else {
            false
        }
    }

    fn tick_prescaler(&mut self) -> bool {
        self.prescaler = self.prescaler.wrapping_sub(1) & 0x3F;
        if self.prescaler != 0 {
            return false;
        }
        self.prescaler = self.prescaler_reload;
        self.counter = self.counter.wrapping_sub(1);
        if self.counter != 0 {
            return false;
        }
        if self.continuous {
            self.counter = self.counter_reload;
        }
        true
    }
}

/// Port 3 input state the timer unit samples for T1's external modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerPins {
    /// Current level of P31.
    pub p31_high: bool,
    /// P31 went from high to low since the previous instruction.
    pub p31_falling: bool,
}

/// Side effects of one timer update that belong to other units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerTick {
    /// The timer selected by `TMR` bits 7..6 underflowed; toggle P36.
    pub toggle_tout: bool,
    /// T0 underflowed while the serial channel owns it.
    pub serial_clock: bool,
}

/// Advances both timers by one instruction's worth of cycles.
///
/// Raises `IRQ4`/`IRQ5` on underflow and services pending `TMR` load bits
/// after counting, so a load issued by the instruction just executed takes
/// effect for the next one.
pub fn update_timers(regs: &mut RegisterFile, cycles: u32, pins: TimerPins) -> TimerTick {
    let mut tick = TimerTick::default();
    let tmr = regs.tmr();

    if tmr & TMR_ENABLE_T0 != 0 && regs.timer_mut(TimerId::T0).advance(cycles) {
        if regs.p3m() & P3M_SERIAL_IO != 0 {
            tick.serial_clock = true;
        } else {
            regs.raise_irq(IRQ_T0);
        }
        if tmr & TMR_TOUT_MASK == 0x40 {
            tick.toggle_tout = true;
        }
    }

    if tmr & TMR_ENABLE_T1 != 0 {
        let underflow = if regs.timer1_external_clock() {
            advance_external_t1(regs, cycles, pins)
        } else {
            regs.timer_mut(TimerId::T1).advance(cycles)
        };
        if underflow {
            regs.raise_irq(IRQ_T1);
            if tmr & TMR_TOUT_MASK == 0x80 {
                tick.toggle_tout = true;
            }
        }
    }

    let tmr = regs.tmr();
    if tmr & TMR_LOAD_T0 != 0 {
        regs.timer_mut(TimerId::T0).load();
    }
    if tmr & TMR_LOAD_T1 != 0 {
        regs.timer_mut(TimerId::T1).load();
    }
    regs.set_tmr(tmr & !(TMR_LOAD_T0 | TMR_LOAD_T1));
    tick
}

fn advance_external_t1(regs: &mut RegisterFile, cycles: u32, pins: TimerPins) -> bool {
    // P31 doubles as the port 2 handshake line.
    if regs.p3m() & P3M_P31_HANDSHAKE != 0 {
        return false;
    }
    match regs.tmr() & TMR_T1_INPUT_MASK {
        0x00 => pins.p31_falling && regs.timer_mut(TimerId::T1).pulse(),
        0x10 => pins.p31_high && regs.timer_mut(TimerId::T1).advance(cycles),
        0x20 => {
            if regs.timer(TimerId::T1).counter() == 0 && pins.p31_falling {
                regs.set_tmr(regs.tmr() | TMR_LOAD_T1);
            }
            false
        }
        _ => {
            if pins.p31_falling {
                regs.set_tmr(regs.tmr() | TMR_LOAD_T1);
            }
            false
        }
    }
}
