//! A 64 KiB flat memory for hosts and tests.
//!
//! Code and data space share one backing store. An optional inclusive
//! address range can be marked read-only to model a mask ROM.

use std::ops::RangeInclusive;

use crate::api::MemoryPort;

/// Size in bytes of the 16-bit address space.
pub const ADDRESS_SPACE_BYTES: usize = u16::MAX as usize + 1;

/// Flat 64 KiB memory with an optional read-only window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatMemory {
    bytes: Box<[u8]>,
    rom: Option<RangeInclusive<u16>>,
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatMemory {
    /// Creates zeroed, fully writable memory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: vec![0; ADDRESS_SPACE_BYTES].into_boxed_slice(),
            rom: None,
        }
    }

    /// Marks `range` read-only for program writes.
    #[must_use]
    pub fn with_rom(mut self, range: RangeInclusive<u16>) -> Self {
        self.rom = Some(range);
        self
    }

    /// Copies `image` to `origin`, bypassing ROM protection. Bytes past
    /// 0xFFFF are dropped.
    pub fn load(&mut self, origin: u16, image: &[u8]) {
        let start = usize::from(origin);
        let len = image.len().min(ADDRESS_SPACE_BYTES - start);
        self.bytes[start..start + len].copy_from_slice(&image[..len]);
    }

    /// Byte at `addr`.
    #[must_use]
    pub fn byte(&self, addr: u16) -> u8 {
        self.bytes[usize::from(addr)]
    }

    /// Returns true when `addr` lies in the read-only window.
    #[must_use]
    pub fn is_read_only(&self, addr: u16) -> bool {
        self.rom.as_ref().is_some_and(|rom| rom.contains(&addr))
    }
}

impl MemoryPort for FlatMemory {
    fn read_byte(&mut self, addr: u16, _data_space: bool) -> u8 {
        self.byte(addr)
    }

    fn write_byte(&mut self, addr: u16, _data_space: bool, value: u8) -> bool {
        if self.is_read_only(addr) {
            return false;
        }
        self.bytes[usize::from(addr)] = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::FlatMemory;
    use crate::api::MemoryPort;

    #[test]
    fn rom_window_rejects_program_writes() {
        let mut memory = FlatMemory::new().with_rom(0x0000..=0x07FF);
        memory.load(0x0000, &[0xAA]);
        assert!(!memory.write_byte(0x0000, true, 0x55));
        assert_eq!(memory.read_byte(0x0000, false), 0xAA);
        assert!(memory.write_byte(0x0800, true, 0x55));
        assert_eq!(memory.read_byte(0x0800, true), 0x55);
    }

    #[test]
    fn load_truncates_at_top_of_address_space() {
        let mut memory = FlatMemory::new();
        memory.load(0xFFFE, &[1, 2, 3, 4]);
        assert_eq!(memory.byte(0xFFFE), 1);
        assert_eq!(memory.byte(0xFFFF), 2);
        assert_eq!(memory.byte(0x0000), 0);
    }
}
