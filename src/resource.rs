//! Resource directory decoding.
//!
//! The resource section is a tree: interior nodes share one directory
//! header layout and entries reference children by offset within the
//! resource section itself. High bits tag the two entry words: a set
//! bit on the id word means the identifier is a length-prefixed
//! UTF-16LE name, a set bit on the offset word means the child is a
//! subdirectory rather than a data leaf. Offsets can be crafted to
//! form cycles, so descent is depth-bounded.

use log::warn;

use crate::data_dir::DataDirectory;
use crate::desc::{Blob, Desc, Encoding};
use crate::rva::RvaResolver;
use crate::stream::{GrowStream, Stream};
use crate::{Error, Result};

/// High-bit tag on entry words.
const HIGH_BIT: u32 = 0x8000_0000;
/// Mask recovering the offset or id under the tag bit.
const OFFSET_MASK: u32 = 0x7FFF_FFFF;

/// Maximum directory nesting accepted before descent stops. Real
/// resource sections are three levels deep (type, name, language).
pub const MAX_DEPTH: usize = 32;

/// IMAGE_RESOURCE_DIRECTORY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceDirectoryHeader {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_named_entries: u16,
    pub number_of_id_entries: u16,
}

impl ResourceDirectoryHeader {
    /// Size of the directory header in bytes.
    pub const SIZE: usize = 16;

    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        Ok(Self {
            characteristics: s.read_u32_le()?,
            time_date_stamp: s.read_u32_le()?,
            major_version: s.read_u16_le()?,
            minor_version: s.read_u16_le()?,
            number_of_named_entries: s.read_u16_le()?,
            number_of_id_entries: s.read_u16_le()?,
        })
    }

    pub fn write(&self, s: &mut GrowStream) {
        s.write_u32_le(self.characteristics);
        s.write_u32_le(self.time_date_stamp);
        s.write_u16_le(self.major_version);
        s.write_u16_le(self.minor_version);
        s.write_u16_le(self.number_of_named_entries);
        s.write_u16_le(self.number_of_id_entries);
    }

    pub fn entry_count(&self) -> usize {
        self.number_of_named_entries as usize + self.number_of_id_entries as usize
    }
}

/// A resource identifier: numeric id or UTF-16 name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceId {
    Id(u32),
    Name(String),
}

impl ResourceId {
    pub fn display(&self) -> String {
        match self {
            Self::Id(n) => n.to_string(),
            Self::Name(s) => s.clone(),
        }
    }
}

/// IMAGE_RESOURCE_DATA_ENTRY plus the bytes it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceData {
    /// RVA of the resource bytes.
    pub offset_to_data: u32,
    pub size: u32,
    pub code_page: u32,
    pub reserved: u32,
    /// Top-level type id in effect for this leaf, when numeric.
    pub type_id: Option<u32>,
    /// The referenced bytes with their file offset, when they land
    /// inside the resource section.
    pub data: Option<Blob>,
}

/// A node of the resource tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceNode {
    Directory(ResourceDirectory),
    Data(ResourceData),
}

/// One directory entry with its decoded child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub id: ResourceId,
    pub node: ResourceNode,
}

/// An interior node: header plus decoded children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceDirectory {
    pub header: ResourceDirectoryHeader,
    pub entries: Vec<ResourceEntry>,
}

/// A fully decoded resource section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTree {
    pub root: ResourceDirectory,
}

impl ResourceTree {
    /// Decode the resource tree a data-directory slot points at.
    pub fn decode(resolver: &RvaResolver<'_>, slot: DataDirectory) -> Result<Option<Self>> {
        let Some(bytes) = resolver.resolve(slot.virtual_address) else {
            return Ok(None);
        };
        let file_base = resolver
            .rva_to_file_offset(slot.virtual_address)
            .unwrap_or(0);
        let ctx = DecodeCtx {
            bytes,
            section_va: slot.virtual_address,
            file_base,
        };
        let root = ctx.directory(0, 0, None)?;
        Ok(Some(Self { root }))
    }

    /// Depth of the deepest directory chain, counting the root.
    pub fn depth(&self) -> usize {
        fn dir_depth(d: &ResourceDirectory) -> usize {
            1 + d
                .entries
                .iter()
                .filter_map(|e| match &e.node {
                    ResourceNode::Directory(child) => Some(dir_depth(child)),
                    ResourceNode::Data(_) => None,
                })
                .max()
                .unwrap_or(0)
        }
        dir_depth(&self.root)
    }
}

/// UTF-16LE string prefixed by a u16 code-unit count.
fn name_desc() -> Desc {
    Desc::prefix_str(Desc::u16_le(), Encoding::Utf16Le)
}

struct DecodeCtx<'a> {
    /// The resource section's bytes; all offsets in the tree are
    /// relative to this slice.
    bytes: &'a [u8],
    section_va: u32,
    file_base: usize,
}

impl DecodeCtx<'_> {
    fn stream_at(&self, offset: u32) -> Result<Stream<'_>> {
        let offset = offset as usize;
        if offset > self.bytes.len() {
            return Err(Error::EndOfBuffer {
                offset: self.file_base + offset,
                needed: ResourceDirectoryHeader::SIZE,
                len: self.file_base + self.bytes.len(),
            });
        }
        Ok(Stream::with_origin(
            &self.bytes[offset..],
            self.file_base + offset,
        ))
    }

    fn directory(
        &self,
        offset: u32,
        depth: usize,
        type_id: Option<u32>,
    ) -> Result<ResourceDirectory> {
        let mut s = self.stream_at(offset)?;
        let header = ResourceDirectoryHeader::read(&mut s)?;
        let mut entries = Vec::with_capacity(header.entry_count().min(256));
        for _ in 0..header.entry_count() {
            let id_word = s.read_u32_le()?;
            let offset_word = s.read_u32_le()?;

            let id = if id_word & HIGH_BIT != 0 {
                let mut name_stream = self.stream_at(id_word & OFFSET_MASK)?;
                let name = name_desc()
                    .get(&mut name_stream)?
                    .as_str()
                    .unwrap_or_default()
                    .to_owned();
                ResourceId::Name(name)
            } else {
                ResourceId::Id(id_word)
            };

            // The first level's unnamed ids are the resource types;
            // carry the one in effect down to the leaves.
            let child_type = if depth == 0 {
                match id {
                    ResourceId::Id(n) => Some(n),
                    ResourceId::Name(_) => None,
                }
            } else {
                type_id
            };

            let node = if offset_word & HIGH_BIT != 0 {
                if depth + 1 >= MAX_DEPTH {
                    warn!("resource tree exceeds depth {MAX_DEPTH}, entry dropped");
                    continue;
                }
                ResourceNode::Directory(self.directory(
                    offset_word & OFFSET_MASK,
                    depth + 1,
                    child_type,
                )?)
            } else {
                ResourceNode::Data(self.data_entry(offset_word, child_type)?)
            };
            entries.push(ResourceEntry { id, node });
        }
        Ok(ResourceDirectory { header, entries })
    }

    fn data_entry(&self, offset: u32, type_id: Option<u32>) -> Result<ResourceData> {
        let mut s = self.stream_at(offset)?;
        let offset_to_data = s.read_u32_le()?;
        let size = s.read_u32_le()?;
        let code_page = s.read_u32_le()?;
        let reserved = s.read_u32_le()?;

        // The leaf's address is an RVA; the bytes live at that address
        // minus the section's base.
        let data = offset_to_data
            .checked_sub(self.section_va)
            .and_then(|rel| {
                let rel = rel as usize;
                let end = rel.checked_add(size as usize)?;
                self.bytes.get(rel..end.min(self.bytes.len()))
            })
            .map(|bytes| Blob {
                offset: self.file_base + (offset_to_data - self.section_va) as usize,
                bytes: bytes.to_vec(),
            });

        Ok(ResourceData {
            offset_to_data,
            size,
            code_page,
            reserved,
            type_id,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{SectionHeader, SectionTable};

    const SECTION_VA: u32 = 0x3000;
    const SECTION_RAW: u32 = 0x600;

    fn section_table() -> SectionTable {
        let mut section = SectionHeader {
            virtual_size: 0x1000,
            virtual_address: SECTION_VA,
            size_of_raw_data: 0x800,
            pointer_to_raw_data: SECTION_RAW,
            ..Default::default()
        };
        section.name[..5].copy_from_slice(b".rsrc");
        SectionTable::new(vec![section])
    }

    fn dir_header(named: u16, ids: u16) -> ResourceDirectoryHeader {
        ResourceDirectoryHeader {
            number_of_named_entries: named,
            number_of_id_entries: ids,
            ..Default::default()
        }
    }

    /// Three levels (type 6 → name "STRINGS" → language 0x409) ending
    /// in an 8-byte leaf.
    fn image() -> Vec<u8> {
        let mut g = GrowStream::new();
        g.seek(SECTION_RAW as usize);

        // Root: one id entry (type 6) -> subdirectory at 0x20.
        dir_header(0, 1).write(&mut g);
        g.write_u32_le(6);
        g.write_u32_le(HIGH_BIT | 0x20);

        // Level 2 at 0x20: one named entry -> subdirectory at 0x40.
        g.seek((SECTION_RAW + 0x20) as usize);
        dir_header(1, 0).write(&mut g);
        g.write_u32_le(HIGH_BIT | 0x60);
        g.write_u32_le(HIGH_BIT | 0x40);

        // Level 3 at 0x40: one id entry (language) -> data entry at 0x80.
        g.seek((SECTION_RAW + 0x40) as usize);
        dir_header(0, 1).write(&mut g);
        g.write_u32_le(0x0409);
        g.write_u32_le(0x80);

        // Name string at 0x60: u16 length then UTF-16LE code units.
        g.seek((SECTION_RAW + 0x60) as usize);
        g.write_u16_le(7);
        for u in "STRINGS".encode_utf16() {
            g.write_u16_le(u);
        }

        // Data entry at 0x80 -> 8 bytes at RVA SECTION_VA + 0x100.
        g.seek((SECTION_RAW + 0x80) as usize);
        g.write_u32_le(SECTION_VA + 0x100);
        g.write_u32_le(8);
        g.write_u32_le(1252);
        g.write_u32_le(0);

        g.seek((SECTION_RAW + 0x100) as usize);
        g.write_bytes(b"resource");

        g.seek((SECTION_RAW + 0x800) as usize);
        g.write_u8(0);
        g.into_bytes()
    }

    fn resource_slot() -> DataDirectory {
        DataDirectory {
            virtual_address: SECTION_VA,
            size: 0x200,
        }
    }

    #[test]
    fn three_level_tree_decodes() {
        let table = section_table();
        let data = image();
        let r = RvaResolver::new(&table, &data);
        let tree = ResourceTree::decode(&r, resource_slot()).unwrap().unwrap();
        assert_eq!(tree.depth(), 3);

        let type_entry = &tree.root.entries[0];
        assert_eq!(type_entry.id, ResourceId::Id(6));
        let ResourceNode::Directory(level2) = &type_entry.node else {
            panic!("expected subdirectory");
        };
        assert_eq!(level2.entries[0].id, ResourceId::Name("STRINGS".into()));
        let ResourceNode::Directory(level3) = &level2.entries[0].node else {
            panic!("expected subdirectory");
        };
        assert_eq!(level3.entries[0].id, ResourceId::Id(0x0409));
        let ResourceNode::Data(leaf) = &level3.entries[0].node else {
            panic!("expected data leaf");
        };
        assert_eq!(leaf.size, 8);
        assert_eq!(leaf.code_page, 1252);
        assert_eq!(leaf.type_id, Some(6));
        let blob = leaf.data.as_ref().unwrap();
        assert_eq!(blob.bytes, b"resource");
        assert_eq!(blob.offset, (SECTION_RAW + 0x100) as usize);
    }

    #[test]
    fn cyclic_offsets_are_depth_bounded() {
        let table = section_table();
        let mut g = GrowStream::new();
        g.seek(SECTION_RAW as usize);
        // Root points back at itself forever.
        dir_header(0, 1).write(&mut g);
        g.write_u32_le(1);
        g.write_u32_le(HIGH_BIT);
        g.seek((SECTION_RAW + 0x800) as usize);
        g.write_u8(0);
        let data = g.into_bytes();

        let r = RvaResolver::new(&table, &data);
        let tree = ResourceTree::decode(&r, resource_slot()).unwrap().unwrap();
        assert!(tree.depth() <= MAX_DEPTH);
    }

    #[test]
    fn leaf_outside_section_has_no_bytes() {
        let table = section_table();
        let mut g = GrowStream::new();
        g.seek(SECTION_RAW as usize);
        dir_header(0, 1).write(&mut g);
        g.write_u32_le(2);
        g.write_u32_le(0x20);
        g.seek((SECTION_RAW + 0x20) as usize);
        g.write_u32_le(0x100); // below the section's VA
        g.write_u32_le(16);
        g.write_u32_le(0);
        g.write_u32_le(0);
        g.seek((SECTION_RAW + 0x800) as usize);
        g.write_u8(0);
        let data = g.into_bytes();

        let r = RvaResolver::new(&table, &data);
        let tree = ResourceTree::decode(&r, resource_slot()).unwrap().unwrap();
        let ResourceNode::Data(leaf) = &tree.root.entries[0].node else {
            panic!("expected data leaf");
        };
        assert!(leaf.data.is_none());
        assert_eq!(leaf.size, 16);
    }

    #[test]
    fn unresolvable_directory_is_absent() {
        let table = section_table();
        let data = vec![0u8; 0x1000];
        let r = RvaResolver::new(&table, &data);
        let slot = DataDirectory {
            virtual_address: 0x9000,
            size: 0x100,
        };
        assert!(ResourceTree::decode(&r, slot).unwrap().is_none());
    }
}
