//! Processor state and the primitive operations instructions are built from.

use crate::api::{InterruptFrame, IoPort, MemoryPort};
use crate::encoding::Condition;
use crate::interrupt::{pending_source, vector_address};
use crate::ports::Ports;
use crate::state::registers::{RegisterFile, FLAGS, FLAG_C, FLAG_S, FLAG_V, FLAG_Z, IMR_ENABLE};
use crate::timer::{update_timers, TimerPins};
use crate::timing::INTERRUPT_ENTRY_CYCLES;

/// Host devices an instruction may touch.
pub struct Bus<'a> {
    /// Code and data memory.
    pub memory: &'a mut dyn MemoryPort,
    /// The four I/O ports.
    pub io: &'a mut dyn IoPort,
}

impl<'a> Bus<'a> {
    /// Bundles the host devices for one step.
    pub fn new(memory: &'a mut dyn MemoryPort, io: &'a mut dyn IoPort) -> Self {
        Self { memory, io }
    }
}

/// Architectural state of one Z8: register file, program counter, cycle
/// counter and the port unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cpu {
    regs: RegisterFile,
    pc: u16,
    cycles: u64,
    ports: Ports,
    fetch_address: u16,
    interrupt_frame: InterruptFrame,
}

impl Cpu {
    /// Creates a processor with zeroed state.
    #[must_use]
    pub const fn new(extended_registers: bool, interrupt_frame: InterruptFrame) -> Self {
        Self {
            regs: RegisterFile::new(extended_registers),
            pc: 0,
            cycles: 0,
            ports: Ports::new(),
            fetch_address: 0,
            interrupt_frame,
        }
    }

    /// Register file.
    #[must_use]
    pub const fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    /// Mutable register file.
    pub fn regs_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Port unit.
    #[must_use]
    pub const fn ports(&self) -> &Ports {
        &self.ports
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.pc
    }

    /// Moves the program counter.
    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    /// Cycles executed since the last reset.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Overwrites the cycle counter.
    pub fn set_cycles(&mut self, cycles: u64) {
        self.cycles = cycles;
    }

    /// Advances the cycle counter.
    pub fn add_cycles(&mut self, cycles: u32) {
        self.cycles = self.cycles.wrapping_add(u64::from(cycles));
    }

    /// Stack frame layout used by interrupt entry and `IRET`.
    #[must_use]
    pub const fn interrupt_frame(&self) -> InterruptFrame {
        self.interrupt_frame
    }

    /// Reads the code byte at PC and advances PC.
    pub fn fetch(&mut self, bus: &mut Bus<'_>) -> u8 {
        self.fetch_address = self.pc;
        let byte = bus.memory.read_byte(self.pc, false);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    /// Reads a big-endian code word at PC and advances PC by two.
    pub fn fetch_word(&mut self, bus: &mut Bus<'_>) -> u16 {
        let hi = self.fetch(bus);
        let lo = self.fetch(bus);
        u16::from_be_bytes([hi, lo])
    }

    /// Reads a code byte without moving PC.
    pub fn peek(&self, bus: &mut Bus<'_>, addr: u16) -> u8 {
        bus.memory.read_byte(addr, false)
    }

    /// Reads a register as an instruction sees it; port registers sample pins.
    pub fn read_reg(&mut self, bus: &mut Bus<'_>, addr: u8) -> u8 {
        if usize::from(addr) < crate::ports::PORT_COUNT {
            let value = self.ports.read(&self.regs, bus.io, addr, self.fetch_address);
            // The register slot keeps the last transferred value for viewers.
            self.regs.write(addr, value);
            value
        } else {
            self.regs.read(addr)
        }
    }

    /// Writes a register as an instruction does; port registers update the latch.
    pub fn write_reg(&mut self, addr: u8, value: u8) {
        if usize::from(addr) < crate::ports::PORT_COUNT {
            self.ports.write(&self.regs, addr, value);
        }
        self.regs.write(addr, value);
    }

    /// Reads the register pair at `addr & 0xFE`.
    pub fn read_reg_word(&mut self, bus: &mut Bus<'_>, addr: u8) -> u16 {
        let even = addr & 0xFE;
        u16::from_be_bytes([self.read_reg(bus, even), self.read_reg(bus, even | 1)])
    }

    /// Writes the register pair at `addr & 0xFE`, high byte first.
    pub fn write_reg_word(&mut self, addr: u8, value: u16) {
        let even = addr & 0xFE;
        let [hi, lo] = value.to_be_bytes();
        self.write_reg(even, hi);
        self.write_reg(even | 1, lo);
    }

    /// Register number of working register `r`.
    #[must_use]
    pub const fn work(&self, r: u8) -> u8 {
        self.regs.working_register(r)
    }

    /// Register number named by an 8-bit operand.
    #[must_use]
    pub const fn resolve(&self, r: u8) -> u8 {
        self.regs.resolve(r)
    }

    /// Register number held in the register named by operand `r` (`@R`).
    pub fn indirect(&mut self, bus: &mut Bus<'_>, r: u8) -> u8 {
        let holder = self.resolve(r);
        self.read_reg(bus, holder)
    }

    /// Pushes a byte; the stack pointer decrements first.
    pub fn push(&mut self, bus: &mut Bus<'_>, value: u8) {
        let sp = self.regs.sp().wrapping_sub(1);
        self.regs.set_sp(sp);
        let sp = self.regs.sp();
        if self.regs.internal_stack() {
            self.write_reg(sp.to_be_bytes()[1], value);
        } else {
            bus.memory.write_byte(sp, true, value);
        }
    }

    /// Pops a byte; the stack pointer increments after the read.
    pub fn pop(&mut self, bus: &mut Bus<'_>) -> u8 {
        let sp = self.regs.sp();
        let value = if self.regs.internal_stack() {
            self.read_reg(bus, sp.to_be_bytes()[1])
        } else {
            bus.memory.read_byte(sp, true)
        };
        self.regs.set_sp(sp.wrapping_add(1));
        value
    }

    /// Pushes a word low byte first, leaving the high byte at the lower address.
    pub fn push_word(&mut self, bus: &mut Bus<'_>, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.push(bus, lo);
        self.push(bus, hi);
    }

    /// Pops a word pushed by [`Cpu::push_word`].
    pub fn pop_word(&mut self, bus: &mut Bus<'_>) -> u16 {
        let hi = self.pop(bus);
        let lo = self.pop(bus);
        u16::from_be_bytes([hi, lo])
    }

    /// Evaluates a jump condition against `FLAGS`.
    #[must_use]
    pub const fn condition(&self, condition: Condition) -> bool {
        let flags = self.regs.flags();
        let c = flags & FLAG_C != 0;
        let z = flags & FLAG_Z != 0;
        let s = flags & FLAG_S != 0;
        let v = flags & FLAG_V != 0;
        match condition {
            Condition::Never => false,
            Condition::Lt => s ^ v,
            Condition::Le => z || (s ^ v),
            Condition::Ule => c || z,
            Condition::Ov => v,
            Condition::Mi => s,
            Condition::Z => z,
            Condition::C => c,
            Condition::Always => true,
            Condition::Ge => s == v,
            Condition::Gt => !(z || (s ^ v)),
            Condition::Ugt => !c && !z,
            Condition::Nov => !v,
            Condition::Pl => !s,
            Condition::Nz => !z,
            Condition::Nc => !c,
        }
    }

    /// Vectors to `source`: pushes the return frame, clears the request and
    /// the master enable, loads PC from the vector table.
    pub fn accept_interrupt(&mut self, bus: &mut Bus<'_>, source: u8) {
        log::trace!("interrupt IRQ{source} accepted at {:#06x}", self.pc);
        self.push_word(bus, self.pc);
        if self.interrupt_frame == InterruptFrame::PcAndFlags {
            let flags = self.regs.read(FLAGS);
            self.push(bus, flags);
        }
        let vector = vector_address(source);
        let hi = bus.memory.read_byte(vector, false);
        let lo = bus.memory.read_byte(vector.wrapping_add(1), false);
        self.pc = u16::from_be_bytes([hi, lo]);
        self.regs.clear_irq(1 << source);
        self.regs.set_interrupts_enabled(false);
        self.add_cycles(INTERRUPT_ENTRY_CYCLES);
    }

    /// Unwinds an interrupt frame.
    pub fn return_from_interrupt(&mut self, bus: &mut Bus<'_>) {
        if self.interrupt_frame == InterruptFrame::PcAndFlags {
            let flags = self.pop(bus);
            self.regs.write(FLAGS, flags);
        }
        self.regs.set_interrupts_enabled(true);
        self.pc = self.pop_word(bus);
    }

    /// Accepts the highest-priority deliverable interrupt, if any.
    ///
    /// Returns the cycles consumed.
    pub fn service_interrupts(&mut self, bus: &mut Bus<'_>) -> u32 {
        if self.regs.imr() & IMR_ENABLE == 0 {
            return 0;
        }
        match pending_source(&self.regs) {
            Some(source) => {
                self.accept_interrupt(bus, source);
                INTERRUPT_ENTRY_CYCLES
            }
            None => 0,
        }
    }

    /// Samples port 3 edges into `IRQ0..=IRQ3`. Returns the P31 state for the timers.
    pub fn latch_port_edges(&mut self, bus: &mut Bus<'_>) -> TimerPins {
        let raised = self.ports.edge_requests(&self.regs, bus.io);
        self.regs.raise_irq(raised);
        TimerPins {
            p31_high: self.ports.port3_pin(bus.io, 0x02),
            p31_falling: self.ports.port3_fell(bus.io, 0x02),
        }
    }

    /// Runs the timers over `cycles` and applies their port side effects.
    pub fn tick_timers(&mut self, cycles: u32, pins: TimerPins) {
        let tick = update_timers(&mut self.regs, cycles, pins);
        if tick.toggle_tout {
            self.ports.toggle_tout();
        }
    }

    /// Ends an instruction boundary: drives changed port latches.
    pub fn finish_ports(&mut self, bus: &mut Bus<'_>) {
        self.ports.finish(bus.io);
    }

    /// Drops any port samples and output state (reset).
    pub fn reset_ports(&mut self) {
        self.ports = Ports::new();
    }

    /// Raw register file value, with no port sampling.
    #[must_use]
    pub const fn view_register(&self, addr: u8) -> u8 {
        self.regs.read(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::{Bus, Cpu};
    use crate::api::{InterruptFrame, NullIo};
    use crate::encoding::Condition;
    use crate::memory::FlatMemory;
    use crate::state::registers::{FLAGS, FLAG_S, FLAG_Z, IMR, IPR, IRQ, P01M, SPH, SPL};

    fn cpu() -> Cpu {
        let mut cpu = Cpu::new(false, InterruptFrame::PcAndFlags);
        cpu.regs_mut().write(P01M, 0x4D);
        cpu
    }

    #[test]
    fn internal_stack_uses_register_file() {
        let mut cpu = cpu();
        let mut memory = FlatMemory::new();
        let mut io = NullIo;
        let mut bus = Bus::new(&mut memory, &mut io);
        cpu.regs_mut().write(SPL, 0x80);
        cpu.push_word(&mut bus, 0x1234);
        assert_eq!(cpu.regs().read(SPL), 0x7E);
        assert_eq!(cpu.regs().read(0x7E), 0x12);
        assert_eq!(cpu.regs().read(0x7F), 0x34);
        assert_eq!(cpu.pop_word(&mut bus), 0x1234);
        assert_eq!(cpu.regs().read(SPL), 0x80);
    }

    #[test]
    fn external_stack_uses_data_memory() {
        let mut cpu = cpu();
        cpu.regs_mut().write(P01M, 0x49);
        cpu.regs_mut().write(SPH, 0x40);
        cpu.regs_mut().write(SPL, 0x00);
        let mut memory = FlatMemory::new();
        let mut io = NullIo;
        let mut bus = Bus::new(&mut memory, &mut io);
        cpu.push(&mut bus, 0xAB);
        assert_eq!(cpu.regs().sp(), 0x3FFF);
        assert_eq!(memory.byte(0x3FFF), 0xAB);
    }

    #[test]
    fn conditions_follow_flag_combinations() {
        let mut cpu = cpu();
        cpu.regs_mut().write(FLAGS, FLAG_S);
        assert!(cpu.condition(Condition::Lt));
        assert!(cpu.condition(Condition::Mi));
        assert!(!cpu.condition(Condition::Ge));
        cpu.regs_mut().write(FLAGS, FLAG_Z);
        assert!(cpu.condition(Condition::Le));
        assert!(cpu.condition(Condition::Ule));
        assert!(!cpu.condition(Condition::Ugt));
        assert!(!cpu.condition(Condition::Never));
    }

    #[test]
    fn interrupt_entry_pushes_frame_and_vectors() {
        let mut cpu = cpu();
        let mut memory = FlatMemory::new();
        memory.load(0x0008, &[0x12, 0x00]);
        let mut io = NullIo;
        let mut bus = Bus::new(&mut memory, &mut io);
        cpu.regs_mut().write(SPL, 0x80);
        cpu.regs_mut().write(IPR, 0x08);
        cpu.regs_mut().write(IMR, 0x90);
        cpu.regs_mut().write(IRQ, 0x10);
        cpu.regs_mut().write(FLAGS, 0x44);
        cpu.set_pc(0x0456);

        assert_eq!(cpu.service_interrupts(&mut bus), 6);
        assert_eq!(cpu.pc(), 0x1200);
        assert_eq!(cpu.regs().read(IRQ), 0x00);
        assert_eq!(cpu.regs().read(IMR), 0x10);
        assert_eq!(cpu.regs().read(SPL), 0x7D);
        assert_eq!(cpu.regs().read(0x7D), 0x44);

        cpu.return_from_interrupt(&mut bus);
        assert_eq!(cpu.pc(), 0x0456);
        assert_eq!(cpu.regs().read(IMR), 0x90);
        assert_eq!(cpu.regs().read(SPL), 0x80);
    }
}
