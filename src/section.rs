//! Section header decoding and address-range lookups.

use crate::stream::{GrowStream, Stream};
use crate::Result;
use bitflags::bitflags;

bitflags! {
    /// Section characteristics flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SectionCharacteristics: u32 {
        const CODE = 0x0000_0020;
        const INITIALIZED_DATA = 0x0000_0040;
        const UNINITIALIZED_DATA = 0x0000_0080;
        const DISCARDABLE = 0x0200_0000;
        const NOT_CACHED = 0x0400_0000;
        const NOT_PAGED = 0x0800_0000;
        const SHARED = 0x1000_0000;
        const EXECUTE = 0x2000_0000;
        const READ = 0x4000_0000;
        const WRITE = 0x8000_0000;
    }
}

/// IMAGE_SECTION_HEADER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section name (8-byte NUL-padded ASCII).
    pub name: [u8; 8],
    /// Size of the section once loaded.
    pub virtual_size: u32,
    /// RVA of the section.
    pub virtual_address: u32,
    /// Size of raw data on disk.
    pub size_of_raw_data: u32,
    /// File offset of raw data.
    pub pointer_to_raw_data: u32,
    /// File offset of relocations.
    pub pointer_to_relocations: u32,
    /// File offset of line numbers.
    pub pointer_to_linenumbers: u32,
    /// Number of relocations.
    pub number_of_relocations: u16,
    /// Number of line numbers.
    pub number_of_linenumbers: u16,
    /// Characteristics flags.
    pub characteristics: u32,
}

impl Default for SectionHeader {
    fn default() -> Self {
        Self {
            name: [0; 8],
            virtual_size: 0,
            virtual_address: 0,
            size_of_raw_data: 0,
            pointer_to_raw_data: 0,
            pointer_to_relocations: 0,
            pointer_to_linenumbers: 0,
            number_of_relocations: 0,
            number_of_linenumbers: 0,
            characteristics: 0,
        }
    }
}

impl SectionHeader {
    /// Size of a section header in bytes.
    pub const SIZE: usize = 40;

    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        let mut name = [0u8; 8];
        name.copy_from_slice(s.read_bytes(8)?);
        Ok(Self {
            name,
            virtual_size: s.read_u32_le()?,
            virtual_address: s.read_u32_le()?,
            size_of_raw_data: s.read_u32_le()?,
            pointer_to_raw_data: s.read_u32_le()?,
            pointer_to_relocations: s.read_u32_le()?,
            pointer_to_linenumbers: s.read_u32_le()?,
            number_of_relocations: s.read_u16_le()?,
            number_of_linenumbers: s.read_u16_le()?,
            characteristics: s.read_u32_le()?,
        })
    }

    pub fn write(&self, s: &mut GrowStream) {
        s.write_bytes(&self.name);
        s.write_u32_le(self.virtual_size);
        s.write_u32_le(self.virtual_address);
        s.write_u32_le(self.size_of_raw_data);
        s.write_u32_le(self.pointer_to_raw_data);
        s.write_u32_le(self.pointer_to_relocations);
        s.write_u32_le(self.pointer_to_linenumbers);
        s.write_u16_le(self.number_of_relocations);
        s.write_u16_le(self.number_of_linenumbers);
        s.write_u32_le(self.characteristics);
    }

    /// Section name with NUL padding trimmed.
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    pub fn flags(&self) -> SectionCharacteristics {
        SectionCharacteristics::from_bits_truncate(self.characteristics)
    }

    pub fn is_executable(&self) -> bool {
        self.flags().contains(SectionCharacteristics::EXECUTE)
    }

    /// Whether `rva` falls inside this section's file-backed virtual
    /// range.
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address
            && (rva - self.virtual_address) < self.size_of_raw_data
    }

    /// Whether `offset` falls inside this section's raw data range.
    pub fn contains_file_offset(&self, offset: u32) -> bool {
        offset >= self.pointer_to_raw_data
            && (offset - self.pointer_to_raw_data) < self.size_of_raw_data
    }
}

/// The document's immutable section table. Lookups are linear scans;
/// section counts are small enough that no index is warranted.
#[derive(Debug, Clone, Default)]
pub struct SectionTable {
    pub sections: Vec<SectionHeader>,
}

impl SectionTable {
    pub fn new(sections: Vec<SectionHeader>) -> Self {
        Self { sections }
    }

    /// Read `count` consecutive section headers at the stream cursor.
    pub fn read(s: &mut Stream<'_>, count: usize) -> Result<Self> {
        let mut sections = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            sections.push(SectionHeader::read(s)?);
        }
        Ok(Self { sections })
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.name_str() == name)
    }

    /// The section whose virtual range contains `rva`, if any.
    pub fn find_by_rva(&self, rva: u32) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// The section whose raw-data range contains `offset`, if any.
    pub fn find_by_file_offset(&self, offset: u32) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.contains_file_offset(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_section() -> SectionHeader {
        let mut h = SectionHeader {
            virtual_size: 0x1000,
            virtual_address: 0x1000,
            size_of_raw_data: 0x800,
            pointer_to_raw_data: 0x400,
            characteristics: (SectionCharacteristics::CODE
                | SectionCharacteristics::EXECUTE
                | SectionCharacteristics::READ)
                .bits(),
            ..Default::default()
        };
        h.name[..5].copy_from_slice(b".text");
        h
    }

    #[test]
    fn roundtrip() {
        let h = text_section();
        let mut g = GrowStream::new();
        h.write(&mut g);
        assert_eq!(g.len(), SectionHeader::SIZE);

        let bytes = g.into_bytes();
        let mut s = Stream::new(&bytes);
        let parsed = SectionHeader::read(&mut s).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(parsed.name_str(), ".text");
        assert!(parsed.is_executable());
    }

    #[test]
    fn rva_range_is_half_open() {
        let h = text_section();
        assert!(h.contains_rva(0x1000));
        assert!(h.contains_rva(0x17FF));
        assert!(!h.contains_rva(0x1800));
        assert!(!h.contains_rva(0xFFF));
    }

    #[test]
    fn table_lookups() {
        let table = SectionTable::new(vec![text_section()]);
        assert!(table.find_by_rva(0x1234).is_some());
        assert!(table.find_by_rva(0x9000).is_none());
        assert!(table.find_by_file_offset(0x400).is_some());
        assert!(table.find_by_file_offset(0xC00).is_none());
        assert!(table.by_name(".text").is_some());
        assert!(table.by_name(".data").is_none());
    }
}
