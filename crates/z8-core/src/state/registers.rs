use rand::Rng;

use crate::interrupt::{decode_priority, InterruptPriority};
use crate::timer::{Timer, TimerId};

/// Number of addressable register slots.
pub const REGISTER_COUNT: usize = 256;
/// First address of the optional extended register window.
pub const EXTENDED_WINDOW_START: u8 = 0x80;
/// Last address of the optional extended register window.
pub const EXTENDED_WINDOW_END: u8 = 0xEF;
/// Value returned for reads of the extended window while it is disabled.
pub const DISABLED_WINDOW_VALUE: u8 = 0xFF;

/// Serial I/O register.
pub const SIO: u8 = 0xF0;
/// Timer mode register.
pub const TMR: u8 = 0xF1;
/// Counter/timer 1.
pub const T1: u8 = 0xF2;
/// Timer 1 prescaler.
pub const PRE1: u8 = 0xF3;
/// Counter/timer 0.
pub const T0: u8 = 0xF4;
/// Timer 0 prescaler.
pub const PRE0: u8 = 0xF5;
/// Port 2 mode register.
pub const P2M: u8 = 0xF6;
/// Port 3 mode register.
pub const P3M: u8 = 0xF7;
/// Port 0/1 mode register.
pub const P01M: u8 = 0xF8;
/// Interrupt priority register.
pub const IPR: u8 = 0xF9;
/// Interrupt request register.
pub const IRQ: u8 = 0xFA;
/// Interrupt mask register.
pub const IMR: u8 = 0xFB;
/// Flag register.
pub const FLAGS: u8 = 0xFC;
/// Register pointer.
pub const RP: u8 = 0xFD;
/// Stack pointer high byte.
pub const SPH: u8 = 0xFE;
/// Stack pointer low byte.
pub const SPL: u8 = 0xFF;

/// `FLAGS` carry bit.
pub const FLAG_C: u8 = 0x80;
/// `FLAGS` zero bit.
pub const FLAG_Z: u8 = 0x40;
/// `FLAGS` sign bit.
pub const FLAG_S: u8 = 0x20;
/// `FLAGS` overflow bit.
pub const FLAG_V: u8 = 0x10;
/// `FLAGS` decimal-adjust bit (last arithmetic op was a subtraction).
pub const FLAG_D: u8 = 0x08;
/// `FLAGS` half-carry bit.
pub const FLAG_H: u8 = 0x04;
/// `FLAGS` user flag F2.
pub const FLAG_F2: u8 = 0x02;
/// `FLAGS` user flag F1.
pub const FLAG_F1: u8 = 0x01;

/// `TMR` bit: load T0 from its reload latches.
pub const TMR_LOAD_T0: u8 = 0x01;
/// `TMR` bit: T0 counts.
pub const TMR_ENABLE_T0: u8 = 0x02;
/// `TMR` bit: load T1 from its reload latches.
pub const TMR_LOAD_T1: u8 = 0x04;
/// `TMR` bit: T1 counts.
pub const TMR_ENABLE_T1: u8 = 0x08;
/// `TMR` bits selecting the T1 external input mode.
pub const TMR_T1_INPUT_MASK: u8 = 0x30;
/// `TMR` bits selecting which timer drives the P36 output.
pub const TMR_TOUT_MASK: u8 = 0xC0;

/// `PRE1` bit: T1 runs from the internal clock (clear selects P31).
pub const PRE1_INTERNAL_CLOCK: u8 = 0x02;
/// `P01M` bit: stack lives in the register file.
pub const P01M_INTERNAL_STACK: u8 = 0x04;
/// `P3M` bit: P31 is the port 2 handshake line.
pub const P3M_P31_HANDSHAKE: u8 = 0x20;
/// `P3M` bit: serial I/O enabled.
pub const P3M_SERIAL_IO: u8 = 0x40;
/// `IMR` bit: master interrupt enable.
pub const IMR_ENABLE: u8 = 0x80;
/// `IRQ` bit raised by T0.
pub const IRQ_T0: u8 = 0x10;
/// `IRQ` bit raised by T1.
pub const IRQ_T1: u8 = 0x20;
/// Mask of the six implemented interrupt request bits.
pub const IRQ_MASK: u8 = 0x3F;

/// `P01M` after reset (ports 0/1 input, internal stack, normal timing).
pub const P01M_RESET_VALUE: u8 = 0x4D;

/// Result of a register write, reporting whether the value reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterWrite {
    /// The value was stored and reads back unchanged.
    Stored,
    /// The value went to a timer reload latch; reads keep returning live timer state.
    Latched,
    /// The write had no effect.
    Rejected,
}

impl RegisterWrite {
    /// Returns true when a read of the same address returns the written value.
    #[must_use]
    pub const fn is_stored(self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// The Z8 register space: general registers plus the control block.
///
/// Port registers 0x00..=0x03 are plain storage here; their pin behavior is
/// layered on top by the port unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    general: [u8; 0xF0],
    extended: bool,
    sio: u8,
    tmr: u8,
    p2m: u8,
    p3m: u8,
    p01m: u8,
    ipr: u8,
    irq: u8,
    imr: u8,
    flags: u8,
    rp: u8,
    sph: u8,
    spl: u8,
    timer0: Timer,
    timer1: Timer,
    timer1_external: bool,
    priority: Option<InterruptPriority>,
}

impl RegisterFile {
    /// Creates a zeroed register file.
    #[must_use]
    pub const fn new(extended: bool) -> Self {
        Self {
            general: [0; 0xF0],
            extended,
            sio: 0,
            tmr: 0,
            p2m: 0,
            p3m: 0,
            p01m: 0,
            ipr: 0,
            irq: 0,
            imr: 0,
            flags: 0,
            rp: 0,
            sph: 0,
            spl: 0,
            timer0: Timer::new(),
            timer1: Timer::new(),
            timer1_external: false,
            priority: None,
        }
    }

    /// Returns true when 0x80..=0xEF are backed by storage.
    #[must_use]
    pub const fn extended_window(&self) -> bool {
        self.extended
    }

    /// Reads a register. Never has side effects.
    #[must_use]
    pub const fn read(&self, addr: u8) -> u8 {
        match addr {
            0x00..=0x7F => self.general[addr as usize],
            EXTENDED_WINDOW_START..=EXTENDED_WINDOW_END => {
                if self.extended {
                    self.general[addr as usize]
                } else {
                    DISABLED_WINDOW_VALUE
                }
            }
            SIO => self.sio,
            TMR => self.tmr,
            T1 => self.timer1.counter(),
            PRE1 => self.timer1.prescaler(),
            T0 => self.timer0.counter(),
            PRE0 => self.timer0.prescaler(),
            P2M => self.p2m,
            P3M => self.p3m,
            P01M => self.p01m,
            IPR => self.ipr,
            IRQ => self.irq,
            IMR => self.imr,
            FLAGS => self.flags,
            RP => self.rp,
            SPH => self.sph,
            SPL => self.spl,
        }
    }

    /// Debugger view of a register; port registers show the last value
    /// transferred by an instruction.
    #[must_use]
    pub const fn view(&self, addr: u8) -> u8 {
        self.read(addr)
    }

    /// Writes a register and reports whether the value will read back.
    pub fn write(&mut self, addr: u8, value: u8) -> RegisterWrite {
        match addr {
            0x00..=0x7F => self.general[usize::from(addr)] = value,
            EXTENDED_WINDOW_START..=EXTENDED_WINDOW_END => {
                if !self.extended {
                    log::trace!("write {value:#04x} to disabled register {addr:#04x} dropped");
                    return RegisterWrite::Rejected;
                }
                self.general[usize::from(addr)] = value;
            }
            SIO => return RegisterWrite::Rejected,
            TMR => self.tmr = value,
            T1 => {
                self.timer1.set_counter_reload(value);
                self.tmr |= TMR_LOAD_T1;
                return RegisterWrite::Latched;
            }
            PRE1 => {
                self.timer1.set_prescaler_reload(value);
                self.timer1_external = value & PRE1_INTERNAL_CLOCK == 0;
                self.tmr |= TMR_LOAD_T1;
                return RegisterWrite::Latched;
            }
            T0 => {
                self.timer0.set_counter_reload(value);
                self.tmr |= TMR_LOAD_T0;
                return RegisterWrite::Latched;
            }
            PRE0 => {
                self.timer0.set_prescaler_reload(value);
                self.tmr |= TMR_LOAD_T0;
                return RegisterWrite::Latched;
            }
            P2M => self.p2m = value,
            P3M => self.p3m = value,
            P01M => self.p01m = value,
            IPR => {
                // Reserved group encodings keep the previous priority order.
                if let Some(priority) = decode_priority(value) {
                    self.priority = Some(priority);
                }
                self.ipr = value;
            }
            IRQ => self.irq = value,
            IMR => self.imr = value,
            FLAGS => self.flags = value,
            RP => self.rp = value,
            SPH => self.sph = value,
            SPL => self.spl = value,
        }
        RegisterWrite::Stored
    }

    /// Reads a register pair; bit 0 of the address is ignored.
    #[must_use]
    pub const fn read_word(&self, addr: u8) -> u16 {
        let even = addr & 0xFE;
        u16::from_be_bytes([self.read(even), self.read(even + 1)])
    }

    /// Writes a register pair, high byte to the even address.
    pub fn write_word(&mut self, addr: u8, value: u16) {
        let even = addr & 0xFE;
        let [hi, lo] = value.to_be_bytes();
        self.write(even, hi);
        self.write(even + 1, lo);
    }

    /// Returns true when every bit in `mask` is set in `FLAGS`.
    #[must_use]
    pub const fn read_flag(&self, mask: u8) -> bool {
        self.flags & mask == mask
    }

    /// Sets or clears the `FLAGS` bits in `mask`, leaving the others untouched.
    pub fn write_flag(&mut self, mask: u8, value: bool) {
        if value {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
    }

    /// Raw `FLAGS` byte.
    #[must_use]
    pub const fn flags(&self) -> u8 {
        self.flags
    }

    /// Maps a 4-bit working register number through `RP`.
    #[must_use]
    pub const fn working_register(&self, r: u8) -> u8 {
        (self.rp & 0xF0) | (r & 0x0F)
    }

    /// Resolves an 8-bit register operand; 0xE0..=0xEF select working registers.
    #[must_use]
    pub const fn resolve(&self, r: u8) -> u8 {
        if r & 0xF0 == 0xE0 {
            self.working_register(r)
        } else {
            r
        }
    }

    /// Returns true when `P01M` selects the register-file stack.
    #[must_use]
    pub const fn internal_stack(&self) -> bool {
        self.p01m & P01M_INTERNAL_STACK != 0
    }

    /// Stack pointer in the active mode: `SPL` alone, or `SPH:SPL`.
    #[must_use]
    pub const fn sp(&self) -> u16 {
        if self.internal_stack() {
            self.spl as u16
        } else {
            u16::from_be_bytes([self.sph, self.spl])
        }
    }

    /// Updates the stack pointer in the active mode only.
    pub fn set_sp(&mut self, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        if !self.internal_stack() {
            self.sph = hi;
        }
        self.spl = lo;
    }

    /// Timer mode register.
    #[must_use]
    pub const fn tmr(&self) -> u8 {
        self.tmr
    }

    /// Sets the timer mode register.
    pub fn set_tmr(&mut self, value: u8) {
        self.tmr = value;
    }

    /// Port 3 mode register.
    #[must_use]
    pub const fn p3m(&self) -> u8 {
        self.p3m
    }

    /// Port 2 mode register.
    #[must_use]
    pub const fn p2m(&self) -> u8 {
        self.p2m
    }

    /// Port 0/1 mode register.
    #[must_use]
    pub const fn p01m(&self) -> u8 {
        self.p01m
    }

    /// Interrupt request register.
    #[must_use]
    pub const fn irq(&self) -> u8 {
        self.irq
    }

    /// Interrupt mask register.
    #[must_use]
    pub const fn imr(&self) -> u8 {
        self.imr
    }

    /// Sets request bits in `IRQ`.
    pub fn raise_irq(&mut self, mask: u8) {
        self.irq |= mask;
    }

    /// Clears request bits in `IRQ`.
    pub fn clear_irq(&mut self, mask: u8) {
        self.irq &= !mask;
    }

    /// Sets or clears the master interrupt enable in `IMR`.
    pub fn set_interrupts_enabled(&mut self, enabled: bool) {
        if enabled {
            self.imr |= IMR_ENABLE;
        } else {
            self.imr &= !IMR_ENABLE;
        }
    }

    /// Last valid decoded interrupt priority, if `IPR` was ever programmed.
    #[must_use]
    pub const fn interrupt_priority(&self) -> Option<InterruptPriority> {
        self.priority
    }

    /// Received serial byte as seen through `SIO`.
    pub fn set_serial_input(&mut self, value: u8) {
        self.sio = value;
    }

    /// Returns true when `PRE1` selected the P31 pin as T1's clock.
    #[must_use]
    pub const fn timer1_external_clock(&self) -> bool {
        self.timer1_external
    }

    /// Shared access to a timer.
    #[must_use]
    pub const fn timer(&self, id: TimerId) -> &Timer {
        match id {
            TimerId::T0 => &self.timer0,
            TimerId::T1 => &self.timer1,
        }
    }

    /// Mutable access to a timer.
    pub fn timer_mut(&mut self, id: TimerId) -> &mut Timer {
        match id {
            TimerId::T0 => &mut self.timer0,
            TimerId::T1 => &mut self.timer1,
        }
    }

    /// Zeroes all general registers (power-on with zero init).
    pub fn clear_general(&mut self) {
        self.general.fill(0);
    }

    /// Fills all general registers with random bytes (power-on with random init).
    pub fn randomize_general<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        rng.fill(&mut self.general[..]);
    }

    /// Clears the control registers that have no hardware reset value and
    /// forgets the programmed interrupt priority.
    pub fn clear_control(&mut self) {
        self.sio = 0;
        self.flags = 0;
        self.rp = 0;
        self.sph = 0;
        self.spl = 0;
        self.ipr = 0;
        self.imr = 0;
        self.p3m = 0;
        self.priority = None;
    }

    /// Applies the Z8601 reset values to the control block.
    ///
    /// Registers without a defined reset value keep their contents.
    pub fn reset_control(&mut self, internal_stack: bool) {
        self.tmr = 0;
        self.timer0.set_prescaler_reload(self.timer0.prescaler_reload() << 2);
        self.timer1.set_prescaler_reload(self.timer1.prescaler_reload() << 2);
        self.timer1_external = true;
        self.p2m = 0xFF;
        self.p3m &= 0x02;
        self.p01m = if internal_stack {
            P01M_RESET_VALUE
        } else {
            P01M_RESET_VALUE & !P01M_INTERNAL_STACK
        };
        self.irq = 0;
        self.imr &= !IMR_ENABLE;
    }

    /// Copies all 256 readable values into `out`.
    pub fn copy_view(&self, out: &mut [u8; REGISTER_COUNT]) {
        for (addr, slot) in (0..=u8::MAX).zip(out.iter_mut()) {
            *slot = self.read(addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        RegisterFile, RegisterWrite, DISABLED_WINDOW_VALUE, FLAGS, FLAG_C, FLAG_S, FLAG_V, FLAG_Z,
        IPR, P01M, PRE0, RP, SIO, SPH, SPL, T0, TMR,
    };

    #[test]
    fn disabled_extended_window_reads_sentinel_and_rejects_writes() {
        let mut regs = RegisterFile::new(false);
        assert_eq!(regs.read(0x80), DISABLED_WINDOW_VALUE);
        assert_eq!(regs.write(0xEF, 0x12), RegisterWrite::Rejected);
        assert_eq!(regs.read(0xEF), DISABLED_WINDOW_VALUE);
    }

    #[test]
    fn enabled_extended_window_is_storage() {
        let mut regs = RegisterFile::new(true);
        assert!(regs.write(0xA0, 0x5A).is_stored());
        assert_eq!(regs.read(0xA0), 0x5A);
    }

    #[test]
    fn timer_registers_latch_instead_of_storing() {
        let mut regs = RegisterFile::new(false);
        assert_eq!(regs.write(T0, 0x42), RegisterWrite::Latched);
        assert_eq!(regs.read(T0), 0);
        assert_eq!(regs.read(TMR) & 0x01, 0x01);

        assert_eq!(regs.write(PRE0, 0x0D), RegisterWrite::Latched);
        assert_eq!(regs.read(PRE0), 0);
        assert_eq!(regs.write(SIO, 0x99), RegisterWrite::Rejected);
    }

    #[test]
    fn write_flag_touches_only_its_bit() {
        let mut regs = RegisterFile::new(false);
        regs.write(FLAGS, FLAG_C | FLAG_V);
        regs.write_flag(FLAG_Z, true);
        assert_eq!(regs.read(FLAGS), FLAG_C | FLAG_V | FLAG_Z);
        regs.write_flag(FLAG_C, false);
        assert_eq!(regs.read(FLAGS), FLAG_V | FLAG_Z);
        assert!(!regs.read_flag(FLAG_S));
    }

    #[test]
    fn working_registers_follow_register_pointer() {
        let mut regs = RegisterFile::new(false);
        regs.write(RP, 0x35);
        assert_eq!(regs.working_register(0x7), 0x37);
        assert_eq!(regs.resolve(0xE2), 0x32);
        assert_eq!(regs.resolve(0x52), 0x52);
    }

    #[test]
    fn word_access_ignores_low_address_bit() {
        let mut regs = RegisterFile::new(false);
        regs.write_word(0x21, 0xBEEF);
        assert_eq!(regs.read(0x20), 0xBE);
        assert_eq!(regs.read(0x21), 0xEF);
        assert_eq!(regs.read_word(0x20), 0xBEEF);
    }

    #[test]
    fn stack_pointer_width_follows_p01m() {
        let mut regs = RegisterFile::new(false);
        regs.write(SPH, 0x12);
        regs.write(SPL, 0x34);
        assert_eq!(regs.sp(), 0x1234);

        regs.write(P01M, 0x04);
        assert_eq!(regs.sp(), 0x34);
        regs.set_sp(0x0080);
        assert_eq!(regs.read(SPH), 0x12, "internal mode leaves SPH alone");
        assert_eq!(regs.read(SPL), 0x80);
    }

    #[test]
    fn reserved_ipr_group_keeps_previous_priority() {
        let mut regs = RegisterFile::new(false);
        assert!(regs.interrupt_priority().is_none());
        regs.write(IPR, 0x01);
        let programmed = regs.interrupt_priority();
        assert!(programmed.is_some());
        regs.write(IPR, 0x00);
        assert_eq!(regs.interrupt_priority(), programmed);
        assert_eq!(regs.read(IPR), 0x00);
    }

    #[test]
    fn reset_control_selects_configured_stack_mode() {
        let mut regs = RegisterFile::new(false);
        regs.reset_control(true);
        assert!(regs.internal_stack());
        regs.reset_control(false);
        assert!(!regs.internal_stack());
        assert_eq!(regs.p2m(), 0xFF);
    }
}
