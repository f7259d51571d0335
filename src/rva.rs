//! RVA (relative virtual address) to file-offset translation.
//!
//! The resolver borrows a finalized section table and the raw image
//! bytes; directory decoders receive it explicitly once the section
//! headers have been read. An address outside every section resolves
//! to `None`, which callers treat as "entry absent" rather than an
//! error.

use crate::desc::Blob;
use crate::section::{SectionHeader, SectionTable};

/// Read-only view translating RVAs and file offsets into image bytes.
#[derive(Debug, Clone, Copy)]
pub struct RvaResolver<'a> {
    table: &'a SectionTable,
    data: &'a [u8],
}

impl<'a> RvaResolver<'a> {
    pub fn new(table: &'a SectionTable, data: &'a [u8]) -> Self {
        Self { table, data }
    }

    pub fn sections(&self) -> &'a SectionTable {
        self.table
    }

    /// The file-backed bytes of a section, clamped to the buffer.
    pub fn section_bytes(&self, section: &SectionHeader) -> &'a [u8] {
        let start = (section.pointer_to_raw_data as usize).min(self.data.len());
        let end = (start + section.size_of_raw_data as usize).min(self.data.len());
        &self.data[start..end]
    }

    /// File offset backing `rva`, if any section contains it.
    pub fn rva_to_file_offset(&self, rva: u32) -> Option<usize> {
        let section = self.table.find_by_rva(rva)?;
        Some(section.pointer_to_raw_data as usize + (rva - section.virtual_address) as usize)
    }

    /// Bytes backing `rva` through the end of its section.
    pub fn resolve(&self, rva: u32) -> Option<&'a [u8]> {
        let section = self.table.find_by_rva(rva)?;
        let bytes = self.section_bytes(section);
        let offset = (rva - section.virtual_address) as usize;
        bytes.get(offset..)
    }

    /// Bytes backing `rva`, capped at `size`.
    pub fn resolve_sized(&self, rva: u32, size: usize) -> Option<&'a [u8]> {
        let bytes = self.resolve(rva)?;
        Some(&bytes[..size.min(bytes.len())])
    }

    /// Like [`resolve_sized`](Self::resolve_sized), but looking the
    /// address up in file space rather than virtual space. Used for
    /// tables expressed as raw file offsets (relocations, line
    /// numbers).
    pub fn resolve_raw(&self, offset: u32, size: usize) -> Option<&'a [u8]> {
        let section = self.table.find_by_file_offset(offset)?;
        let bytes = self.section_bytes(section);
        let start = (offset - section.pointer_to_raw_data) as usize;
        let slice = bytes.get(start..)?;
        Some(&slice[..size.min(slice.len())])
    }

    /// An addressable blob for `size` bytes at `rva`.
    pub fn blob(&self, rva: u32, size: usize) -> Option<Blob> {
        let offset = self.rva_to_file_offset(rva)?;
        let bytes = self.resolve_sized(rva, size)?;
        Some(Blob {
            offset,
            bytes: bytes.to_vec(),
        })
    }

    pub fn read_u16(&self, rva: u32) -> Option<u16> {
        let b = self.resolve(rva)?;
        Some(u16::from_le_bytes([*b.first()?, *b.get(1)?]))
    }

    pub fn read_u32(&self, rva: u32) -> Option<u32> {
        let b = self.resolve(rva)?;
        if b.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&self, rva: u32) -> Option<u64> {
        let b = self.resolve(rva)?;
        if b.len() < 8 {
            return None;
        }
        Some(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// NUL-terminated ASCII string at `rva`. Lossy on non-UTF-8 bytes
    /// since import/export names in hostile files are arbitrary.
    pub fn read_cstr(&self, rva: u32) -> Option<String> {
        let bytes = self.resolve(rva)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}
