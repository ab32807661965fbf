//! Port registers 0x00..=0x03: pin sampling, output latches and the port 3
//! edge detector that feeds `IRQ0..=IRQ3`.
//!
//! Inputs are sampled from the host at most once per instruction. Output
//! latches are pushed to the host at the end of the instruction, and only
//! when they changed.

use crate::api::IoPort;
use crate::state::registers::{RegisterFile, P3M_SERIAL_IO};

/// Number of 8-bit ports.
pub const PORT_COUNT: usize = 4;

const P3_IRQ_SOURCES: [(u8, u8); 4] = [
    // (P3 pin mask, IRQ bit)
    (0x04, 0x01),
    (0x08, 0x02),
    (0x02, 0x04),
    (0x01, 0x08),
];

/// Pin-level state of the four ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ports {
    input: [Option<u8>; PORT_COUNT],
    output: [u8; PORT_COUNT],
    driven: [u8; PORT_COUNT],
    port3_previous: u8,
}

impl Default for Ports {
    fn default() -> Self {
        Self::new()
    }
}

impl Ports {
    /// Creates ports with all latches low and nothing sampled yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            input: [None; PORT_COUNT],
            output: [0; PORT_COUNT],
            driven: [0; PORT_COUNT],
            port3_previous: 0,
        }
    }

    /// Output latch value waiting to be driven.
    #[must_use]
    pub const fn output(&self, port: u8) -> u8 {
        self.output[(port & 0x03) as usize]
    }

    /// Samples a port, reusing the value already read during this instruction.
    pub fn sample(&mut self, io: &mut dyn IoPort, port: u8) -> u8 {
        let index = usize::from(port & 0x03);
        *self.input[index].get_or_insert_with(|| io.read_port(port & 0x03))
    }

    /// Value an instruction reads from port register `port`.
    ///
    /// `address` is the address of the last fetched byte, presented on
    /// ports 0 and 1 when they are configured as the external address bus.
    pub fn read(&mut self, regs: &RegisterFile, io: &mut dyn IoPort, port: u8, address: u16) -> u8 {
        let [addr_hi, addr_lo] = address.to_be_bytes();
        match port & 0x03 {
            0 => {
                let mode = regs.p01m();
                let low = match mode & 0x03 {
                    0x00 => self.driven[0],
                    0x01 => self.sample(io, 0),
                    _ => addr_hi,
                };
                let high = match mode & 0xC0 {
                    0x00 => self.driven[0],
                    0x40 => self.sample(io, 0),
                    _ => addr_hi,
                };
                (high & 0xF0) | (low & 0x0F)
            }
            1 => match regs.p01m() & 0x18 {
                0x00 => self.driven[1],
                0x10 => addr_lo,
                _ => self.sample(io, 1),
            },
            2 => {
                let inputs = regs.p2m();
                if inputs == 0 {
                    self.driven[2]
                } else {
                    (self.sample(io, 2) & inputs) | (self.driven[2] & !inputs)
                }
            }
            _ => (self.driven[3] & 0xF0) | (self.sample(io, 3) & 0x0F),
        }
    }

    /// Updates the output latch after an instruction wrote port register `port`.
    pub fn write(&mut self, regs: &RegisterFile, port: u8, value: u8) {
        let index = usize::from(port & 0x03);
        let mut out = self.output[index];
        match index {
            0 => {
                let mode = regs.p01m();
                if mode & 0xC0 == 0 {
                    out = (value & 0xF0) | (out & 0x0F);
                }
                if mode & 0x03 == 0 {
                    out = (out & 0xF0) | (value & 0x0F);
                }
            }
            1 => {
                if regs.p01m() & 0x18 == 0 {
                    out = value;
                }
            }
            2 => {
                let inputs = regs.p2m();
                out = (out & inputs) | (value & !inputs);
            }
            _ => {
                let p3m = regs.p3m();
                out = (out & 0xF0) | (self.port3_previous & 0x0F);
                // P34..P37 are plain outputs unless claimed by a P3M function.
                for (bit, claimed) in [(0x10, 0x18), (0x20, 0x04), (0x40, 0x20), (0x80, 0x80)] {
                    if p3m & claimed == 0 {
                        out = (out & !bit) | (value & bit);
                    }
                }
            }
        }
        self.output[index] = out;
    }

    /// Toggles the P36 timer output relative to the level currently driven.
    pub fn toggle_tout(&mut self) {
        self.output[3] = (self.output[3] & !0x40) | (!self.driven[3] & 0x40);
    }

    /// Returns the `IRQ` bits raised by P30..P33 falling edges this instruction.
    pub fn edge_requests(&mut self, regs: &RegisterFile, io: &mut dyn IoPort) -> u8 {
        let now = self.sample(io, 3);
        let falling = self.port3_previous & !now;
        let mut raised = 0;
        for (pin, irq) in P3_IRQ_SOURCES {
            // P30 belongs to the receiver while serial I/O is on.
            if pin == 0x01 && regs.p3m() & P3M_SERIAL_IO != 0 {
                continue;
            }
            if falling & pin != 0 {
                raised |= irq;
            }
        }
        raised
    }

    /// Level of a port 3 input pin as sampled this instruction.
    pub fn port3_pin(&mut self, io: &mut dyn IoPort, mask: u8) -> bool {
        self.sample(io, 3) & mask != 0
    }

    /// Returns true when a port 3 input pin fell since the previous instruction.
    pub fn port3_fell(&mut self, io: &mut dyn IoPort, mask: u8) -> bool {
        self.port3_previous & mask != 0 && self.sample(io, 3) & mask == 0
    }

    /// Ends an instruction: drives changed latches and forgets the samples.
    pub fn finish(&mut self, io: &mut dyn IoPort) {
        if let Some(port3) = self.input[3] {
            self.port3_previous = port3;
        }
        for (port, (out, driven)) in (0u8..).zip(self.output.iter().zip(self.driven.iter_mut())) {
            if *out != *driven {
                *driven = *out;
                io.write_port(port, *out);
            }
        }
        self.input = [None; PORT_COUNT];
    }
}
