//! COFF file header decoding.

use crate::stream::{GrowStream, Stream};
use crate::Result;
use bitflags::bitflags;

/// PE signature "PE\0\0".
pub const PE_SIGNATURE: u32 = 0x0000_4550;

/// Machine type constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[non_exhaustive]
pub enum MachineType {
    Unknown = 0x0000,
    /// Intel 386 or later.
    I386 = 0x014C,
    /// x64 (AMD64).
    Amd64 = 0x8664,
    /// ARM little endian.
    Arm = 0x01C0,
    /// ARM64 little endian.
    Arm64 = 0xAA64,
    /// ARM Thumb-2 little endian.
    ArmNt = 0x01C4,
    /// Intel Itanium.
    Ia64 = 0x0200,
    /// RISC-V 64-bit.
    RiscV64 = 0x5064,
}

impl MachineType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::Unknown),
            0x014C => Some(Self::I386),
            0x8664 => Some(Self::Amd64),
            0x01C0 => Some(Self::Arm),
            0xAA64 => Some(Self::Arm64),
            0x01C4 => Some(Self::ArmNt),
            0x0200 => Some(Self::Ia64),
            0x5064 => Some(Self::RiscV64),
            _ => None,
        }
    }
}

bitflags! {
    /// COFF characteristics flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CoffCharacteristics: u16 {
        const RELOCS_STRIPPED = 0x0001;
        const EXECUTABLE_IMAGE = 0x0002;
        const LINE_NUMS_STRIPPED = 0x0004;
        const LOCAL_SYMS_STRIPPED = 0x0008;
        const LARGE_ADDRESS_AWARE = 0x0020;
        const MACHINE_32BIT = 0x0100;
        const DEBUG_STRIPPED = 0x0200;
        const SYSTEM = 0x1000;
        const DLL = 0x2000;
        const UP_SYSTEM_ONLY = 0x4000;
    }
}

/// IMAGE_FILE_HEADER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoffHeader {
    /// Target machine type.
    pub machine: u16,
    /// Number of sections.
    pub number_of_sections: u16,
    /// Timestamp (seconds since epoch).
    pub time_date_stamp: u32,
    /// File offset of the COFF symbol table.
    pub pointer_to_symbol_table: u32,
    /// Number of symbol table entries.
    pub number_of_symbols: u32,
    /// Size of the optional header.
    pub size_of_optional_header: u16,
    /// Characteristics flags.
    pub characteristics: u16,
}

impl CoffHeader {
    /// Size of the COFF header in bytes.
    pub const SIZE: usize = 20;

    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        Ok(Self {
            machine: s.read_u16_le()?,
            number_of_sections: s.read_u16_le()?,
            time_date_stamp: s.read_u32_le()?,
            pointer_to_symbol_table: s.read_u32_le()?,
            number_of_symbols: s.read_u32_le()?,
            size_of_optional_header: s.read_u16_le()?,
            characteristics: s.read_u16_le()?,
        })
    }

    pub fn write(&self, s: &mut GrowStream) {
        s.write_u16_le(self.machine);
        s.write_u16_le(self.number_of_sections);
        s.write_u32_le(self.time_date_stamp);
        s.write_u32_le(self.pointer_to_symbol_table);
        s.write_u32_le(self.number_of_symbols);
        s.write_u16_le(self.size_of_optional_header);
        s.write_u16_le(self.characteristics);
    }

    pub fn machine_type(&self) -> Option<MachineType> {
        MachineType::from_u16(self.machine)
    }

    pub fn is_dll(&self) -> bool {
        CoffCharacteristics::from_bits_truncate(self.characteristics)
            .contains(CoffCharacteristics::DLL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let h = CoffHeader {
            machine: MachineType::Amd64 as u16,
            number_of_sections: 3,
            time_date_stamp: 0x5F00_0000,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: 240,
            characteristics: (CoffCharacteristics::EXECUTABLE_IMAGE | CoffCharacteristics::DLL)
                .bits(),
        };
        let mut g = GrowStream::new();
        h.write(&mut g);
        assert_eq!(g.len(), CoffHeader::SIZE);

        let bytes = g.into_bytes();
        let mut s = Stream::new(&bytes);
        let parsed = CoffHeader::read(&mut s).unwrap();
        assert_eq!(parsed, h);
        assert!(parsed.is_dll());
        assert_eq!(parsed.machine_type(), Some(MachineType::Amd64));
    }
}
