//! Export directory decoding.

use log::debug;

use crate::data_dir::DataDirectory;
use crate::rva::RvaResolver;
use crate::stream::{GrowStream, Stream};
use crate::Result;

/// IMAGE_EXPORT_DIRECTORY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// RVA of the exporting module's name.
    pub name: u32,
    /// Ordinal base added to every function slot index.
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    /// RVA of the function address array.
    pub address_of_functions: u32,
    /// RVA of the name pointer array.
    pub address_of_names: u32,
    /// RVA of the ordinal index array.
    pub address_of_name_ordinals: u32,
}

impl ExportDirectory {
    /// Size of the directory record in bytes.
    pub const SIZE: usize = 40;

    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        Ok(Self {
            characteristics: s.read_u32_le()?,
            time_date_stamp: s.read_u32_le()?,
            major_version: s.read_u16_le()?,
            minor_version: s.read_u16_le()?,
            name: s.read_u32_le()?,
            base: s.read_u32_le()?,
            number_of_functions: s.read_u32_le()?,
            number_of_names: s.read_u32_le()?,
            address_of_functions: s.read_u32_le()?,
            address_of_names: s.read_u32_le()?,
            address_of_name_ordinals: s.read_u32_le()?,
        })
    }

    pub fn write(&self, s: &mut GrowStream) {
        s.write_u32_le(self.characteristics);
        s.write_u32_le(self.time_date_stamp);
        s.write_u16_le(self.major_version);
        s.write_u16_le(self.minor_version);
        s.write_u32_le(self.name);
        s.write_u32_le(self.base);
        s.write_u32_le(self.number_of_functions);
        s.write_u32_le(self.number_of_names);
        s.write_u32_le(self.address_of_functions);
        s.write_u32_le(self.address_of_names);
        s.write_u32_le(self.address_of_name_ordinals);
    }
}

/// One resolved export slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    /// Displayed ordinal (ordinal base already applied).
    pub ordinal: u32,
    /// Export name; empty for ordinal-only exports.
    pub name: String,
    /// RVA of the exported code or data.
    pub rva: u32,
    /// File offset the RVA resolves to.
    pub file_offset: usize,
}

impl ExportEntry {
    /// Display key: `#<ordinal>: <name>` (trailing space stays for
    /// ordinal-only exports).
    pub fn key(&self) -> String {
        format!("#{}: {}", self.ordinal, self.name)
    }
}

/// A fully decoded export directory.
#[derive(Debug, Clone, Default)]
pub struct ExportTable {
    pub directory: ExportDirectory,
    /// Name of the exporting module, when its RVA resolves.
    pub dll_name: Option<String>,
    pub entries: Vec<ExportEntry>,
}

fn u32_at(bytes: &[u8], index: usize) -> Option<u32> {
    let b = bytes.get(index * 4..index * 4 + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn u16_at(bytes: &[u8], index: usize) -> Option<u16> {
    let b = bytes.get(index * 2..index * 2 + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

impl ExportTable {
    /// Decode the export directory a data-directory slot points at.
    ///
    /// Slots whose function address falls outside every section are
    /// dropped without comment; dangling export stubs are common in
    /// real binaries. Counts are bounded by the bytes actually backing
    /// each array, so a hostile count cannot force work past the
    /// section end.
    pub fn decode(resolver: &RvaResolver<'_>, slot: DataDirectory) -> Result<Option<Self>> {
        let Some(bytes) = resolver.resolve(slot.virtual_address) else {
            return Ok(None);
        };
        let mut s = Stream::new(bytes);
        let directory = ExportDirectory::read(&mut s)?;

        let dll_name = resolver.read_cstr(directory.name);
        let functions = resolver.resolve(directory.address_of_functions).unwrap_or(&[]);
        let names = resolver.resolve(directory.address_of_names).unwrap_or(&[]);
        let ordinals = resolver
            .resolve(directory.address_of_name_ordinals)
            .unwrap_or(&[]);

        let count = (directory.number_of_functions as usize).min(functions.len() / 4);
        let name_count = directory.number_of_names as usize;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let Some(rva) = u32_at(functions, i) else { break };
            let Some(file_offset) = resolver.rva_to_file_offset(rva) else {
                continue;
            };
            let index = if i < name_count {
                u16_at(ordinals, i).map(u32::from).unwrap_or(i as u32)
            } else {
                i as u32
            };
            // OrdinalBase comes straight from the file; wrap instead
            // of overflowing on hostile values.
            let ordinal = directory.base.wrapping_add(index);
            let name = if i < name_count {
                u32_at(names, i)
                    .and_then(|name_rva| resolver.read_cstr(name_rva))
                    .unwrap_or_default()
            } else {
                String::new()
            };
            entries.push(ExportEntry {
                ordinal,
                name,
                rva,
                file_offset,
            });
        }
        debug!(
            "export directory: {} of {} slots resolved",
            entries.len(),
            directory.number_of_functions
        );
        Ok(Some(Self {
            directory,
            dll_name,
            entries,
        }))
    }

    /// Entries keyed for display, in slot order.
    pub fn keyed(&self) -> impl Iterator<Item = (String, &ExportEntry)> {
        self.entries.iter().map(|e| (e.key(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{SectionHeader, SectionTable};

    const SECTION_VA: u32 = 0x1000;
    const SECTION_RAW: u32 = 0x200;

    fn section_table() -> SectionTable {
        let mut section = SectionHeader {
            virtual_size: 0x1000,
            virtual_address: SECTION_VA,
            size_of_raw_data: 0x400,
            pointer_to_raw_data: SECTION_RAW,
            ..Default::default()
        };
        section.name[..5].copy_from_slice(b".text");
        SectionTable::new(vec![section])
    }

    /// Image with an export directory at the start of `.text`. Function
    /// address slots are supplied by the caller; the name tables are
    /// empty (ordinal-only exports).
    fn image_with_exports(addresses: &[u32], base: u32) -> Vec<u8> {
        let mut g = GrowStream::new();
        g.skip(SECTION_RAW as usize);
        let dir = ExportDirectory {
            base,
            number_of_functions: addresses.len() as u32,
            number_of_names: 0,
            address_of_functions: SECTION_VA + ExportDirectory::SIZE as u32,
            ..Default::default()
        };
        dir.write(&mut g);
        for &a in addresses {
            g.write_u32_le(a);
        }
        // Pad out the section's raw data.
        g.seek((SECTION_RAW + 0x400) as usize);
        g.write_u8(0);
        g.into_bytes()
    }

    fn export_slot() -> DataDirectory {
        DataDirectory {
            virtual_address: SECTION_VA,
            size: 0x100,
        }
    }

    #[test]
    fn ordinal_only_exports_have_empty_names() {
        let table = section_table();
        let data = image_with_exports(&[SECTION_VA + 0x100, SECTION_VA + 0x110], 1);
        let r = RvaResolver::new(&table, &data);
        let exports = ExportTable::decode(&r, export_slot()).unwrap().unwrap();
        let keys: Vec<String> = exports.keyed().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["#1: ", "#2: "]);
    }

    #[test]
    fn unresolved_slot_is_skipped_silently() {
        let table = section_table();
        // Middle slot points outside every section.
        let data = image_with_exports(&[SECTION_VA + 0x100, 0x9999_0000, SECTION_VA + 0x120], 1);
        let r = RvaResolver::new(&table, &data);
        let exports = ExportTable::decode(&r, export_slot()).unwrap().unwrap();
        assert_eq!(exports.entries.len(), 2);
        assert!(exports.entries.iter().all(|e| e.ordinal != 2));
        assert_eq!(exports.entries[1].ordinal, 3);
    }

    #[test]
    fn entry_carries_file_offset() {
        let table = section_table();
        let data = image_with_exports(&[SECTION_VA + 0x40], 10);
        let r = RvaResolver::new(&table, &data);
        let exports = ExportTable::decode(&r, export_slot()).unwrap().unwrap();
        assert_eq!(exports.entries[0].file_offset, (SECTION_RAW + 0x40) as usize);
        assert_eq!(exports.entries[0].key(), "#10: ");
    }

    #[test]
    fn unresolvable_directory_is_absent() {
        let table = section_table();
        let data = vec![0u8; 0x600];
        let r = RvaResolver::new(&table, &data);
        let slot = DataDirectory {
            virtual_address: 0x9000,
            size: 0x100,
        };
        assert!(ExportTable::decode(&r, slot).unwrap().is_none());
    }

    #[test]
    fn hostile_ordinal_base_wraps_instead_of_panicking() {
        let table = section_table();
        let data = image_with_exports(&[SECTION_VA + 0x100, SECTION_VA + 0x110], u32::MAX);
        let r = RvaResolver::new(&table, &data);
        let exports = ExportTable::decode(&r, export_slot()).unwrap().unwrap();
        assert_eq!(exports.entries.len(), 2);
        assert_eq!(exports.entries[0].ordinal, u32::MAX);
        assert_eq!(exports.entries[1].ordinal, 0);
    }

    #[test]
    fn hostile_count_is_bounded_by_section() {
        let table = section_table();
        let mut data = image_with_exports(&[SECTION_VA + 0x100], 1);
        // Claim far more functions than the section can back.
        let dir_off = SECTION_RAW as usize;
        data[dir_off + 20..dir_off + 24].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        let r = RvaResolver::new(&table, &data);
        let exports = ExportTable::decode(&r, export_slot()).unwrap().unwrap();
        assert!(exports.entries.len() <= 0x400 / 4);
    }
}
