//! Import directory decoding.
//!
//! The descriptor sequence has no count field; it runs until a
//! descriptor whose first word is zero. Thunk arrays are likewise
//! zero-terminated, with slot width following the image's bitness.

use log::debug;

use crate::data_dir::DataDirectory;
use crate::rva::RvaResolver;
use crate::stream::{GrowStream, Stream};
use crate::Result;

/// IMAGE_IMPORT_DESCRIPTOR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportDescriptor {
    /// RVA of the import lookup table (also called Characteristics).
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    /// RVA of the imported module's name.
    pub name: u32,
    /// RVA of the import address table.
    pub first_thunk: u32,
}

impl ImportDescriptor {
    /// Size of one descriptor in bytes.
    pub const SIZE: usize = 20;

    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        Ok(Self {
            original_first_thunk: s.read_u32_le()?,
            time_date_stamp: s.read_u32_le()?,
            forwarder_chain: s.read_u32_le()?,
            name: s.read_u32_le()?,
            first_thunk: s.read_u32_le()?,
        })
    }

    pub fn write(&self, s: &mut GrowStream) {
        s.write_u32_le(self.original_first_thunk);
        s.write_u32_le(self.time_date_stamp);
        s.write_u32_le(self.forwarder_chain);
        s.write_u32_le(self.name);
        s.write_u32_le(self.first_thunk);
    }

    /// The all-important sequence terminator.
    pub fn is_terminator(&self) -> bool {
        self.original_first_thunk == 0
    }

    /// RVA of the thunk array to walk. The lookup table is preferred;
    /// bound images leave only the address table populated.
    pub fn thunk_rva(&self) -> u32 {
        if self.original_first_thunk != 0 {
            self.original_first_thunk
        } else {
            self.first_thunk
        }
    }
}

/// One import slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportThunk {
    /// Import by ordinal (high bit of the slot was set).
    Ordinal(u16),
    /// Import by name; the hint precedes the name in the hint/name
    /// table.
    Name { hint: u16, name: String },
}

impl ImportThunk {
    /// Display form: the name, or `ordinal_<N>`.
    pub fn display(&self) -> String {
        match self {
            Self::Ordinal(n) => format!("ordinal_{n}"),
            Self::Name { name, .. } => name.clone(),
        }
    }
}

/// Imports from a single module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedDll {
    pub descriptor: ImportDescriptor,
    /// Module name; empty when its RVA does not resolve.
    pub name: String,
    pub thunks: Vec<ImportThunk>,
}

/// A fully decoded import directory.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    pub dlls: Vec<ImportedDll>,
}

impl ImportTable {
    /// Decode the import directory a data-directory slot points at.
    /// `pe32plus` selects 8-byte thunk slots; PE32 images use 4-byte
    /// slots.
    pub fn decode(
        resolver: &RvaResolver<'_>,
        slot: DataDirectory,
        pe32plus: bool,
    ) -> Result<Option<Self>> {
        let Some(bytes) = resolver.resolve(slot.virtual_address) else {
            return Ok(None);
        };
        let mut s = Stream::new(bytes);
        let mut dlls = Vec::new();
        loop {
            let descriptor = match ImportDescriptor::read(&mut s) {
                Ok(d) => d,
                // A section-truncated descriptor table simply ends the
                // sequence.
                Err(_) => break,
            };
            if descriptor.is_terminator() {
                break;
            }
            let name = resolver.read_cstr(descriptor.name).unwrap_or_default();
            let thunks = read_thunks(resolver, descriptor.thunk_rva(), pe32plus);
            dlls.push(ImportedDll {
                descriptor,
                name,
                thunks,
            });
        }
        debug!("import directory: {} modules", dlls.len());
        Ok(Some(Self { dlls }))
    }
}

fn read_thunks(resolver: &RvaResolver<'_>, rva: u32, pe32plus: bool) -> Vec<ImportThunk> {
    let Some(bytes) = resolver.resolve(rva) else {
        return Vec::new();
    };
    let width = if pe32plus { 8 } else { 4 };
    let ordinal_bit = if pe32plus { 1u64 << 63 } else { 1u64 << 31 };
    let mut s = Stream::new(bytes);
    let mut thunks = Vec::new();
    loop {
        let slot = if pe32plus {
            s.read_u64_le()
        } else {
            s.read_u32_le().map(u64::from)
        };
        let Ok(slot) = slot else { break };
        if slot == 0 {
            break;
        }
        if slot & ordinal_bit != 0 {
            thunks.push(ImportThunk::Ordinal(slot as u16));
        } else {
            // The hint/name entry is a u16 hint followed by the name.
            let name_rva = slot as u32;
            let Some(name) = resolver.read_cstr(name_rva.wrapping_add(2)) else {
                // Slot points outside every section: absent, not fatal.
                continue;
            };
            let hint = resolver.read_u16(name_rva).unwrap_or(0);
            thunks.push(ImportThunk::Name { hint, name });
        }
        debug_assert_eq!(s.tell() % width, 0);
    }
    thunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{SectionHeader, SectionTable};

    const SECTION_VA: u32 = 0x2000;
    const SECTION_RAW: u32 = 0x400;

    fn section_table() -> SectionTable {
        let mut section = SectionHeader {
            virtual_size: 0x1000,
            virtual_address: SECTION_VA,
            size_of_raw_data: 0x800,
            pointer_to_raw_data: SECTION_RAW,
            ..Default::default()
        };
        section.name[..6].copy_from_slice(b".idata");
        SectionTable::new(vec![section])
    }

    /// One module ("KERNEL32.dll") importing by name and by ordinal,
    /// followed by `extra_terminators` zero descriptors.
    fn image(pe32plus: bool, extra_terminators: usize) -> Vec<u8> {
        let thunk_rva = SECTION_VA + 0x100;
        let hint_name_rva = SECTION_VA + 0x200;
        let dll_name_rva = SECTION_VA + 0x240;

        let mut g = GrowStream::new();
        g.seek(SECTION_RAW as usize);
        ImportDescriptor {
            original_first_thunk: thunk_rva,
            name: dll_name_rva,
            first_thunk: thunk_rva,
            ..Default::default()
        }
        .write(&mut g);
        for _ in 0..=extra_terminators {
            ImportDescriptor::default().write(&mut g);
        }

        g.seek((SECTION_RAW + 0x100) as usize);
        if pe32plus {
            g.write_u64_le(hint_name_rva as u64);
            g.write_u64_le(1u64 << 63 | 7);
            g.write_u64_le(0);
        } else {
            g.write_u32_le(hint_name_rva);
            g.write_u32_le(1u32 << 31 | 7);
            g.write_u32_le(0);
        }

        g.seek((SECTION_RAW + 0x200) as usize);
        g.write_u16_le(0x00AB);
        g.write_bytes(b"CreateFileW\0");
        g.seek((SECTION_RAW + 0x240) as usize);
        g.write_bytes(b"KERNEL32.dll\0");

        g.seek((SECTION_RAW + 0x800) as usize);
        g.write_u8(0);
        g.into_bytes()
    }

    fn import_slot() -> DataDirectory {
        DataDirectory {
            virtual_address: SECTION_VA,
            size: 0x28,
        }
    }

    #[test]
    fn decodes_name_and_ordinal_thunks_pe32plus() {
        let table = section_table();
        let data = image(true, 0);
        let r = RvaResolver::new(&table, &data);
        let imports = ImportTable::decode(&r, import_slot(), true).unwrap().unwrap();
        assert_eq!(imports.dlls.len(), 1);
        let dll = &imports.dlls[0];
        assert_eq!(dll.name, "KERNEL32.dll");
        assert_eq!(
            dll.thunks,
            vec![
                ImportThunk::Name {
                    hint: 0x00AB,
                    name: "CreateFileW".into()
                },
                ImportThunk::Ordinal(7),
            ]
        );
        assert_eq!(dll.thunks[1].display(), "ordinal_7");
    }

    #[test]
    fn pe32_uses_narrow_thunks() {
        let table = section_table();
        let data = image(false, 0);
        let r = RvaResolver::new(&table, &data);
        let imports = ImportTable::decode(&r, import_slot(), false).unwrap().unwrap();
        assert_eq!(imports.dlls[0].thunks.len(), 2);
        assert_eq!(imports.dlls[0].thunks[1], ImportThunk::Ordinal(7));
    }

    #[test]
    fn terminator_stops_regardless_of_trailing_zeros() {
        let table = section_table();
        let data = image(true, 5);
        let r = RvaResolver::new(&table, &data);
        let imports = ImportTable::decode(&r, import_slot(), true).unwrap().unwrap();
        assert_eq!(imports.dlls.len(), 1);
    }

    #[test]
    fn unresolvable_directory_is_absent() {
        let table = section_table();
        let data = vec![0u8; 0x1000];
        let r = RvaResolver::new(&table, &data);
        let slot = DataDirectory {
            virtual_address: 0x9000,
            size: 0x28,
        };
        assert!(ImportTable::decode(&r, slot, true).unwrap().is_none());
    }
}
