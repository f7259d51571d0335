//! Optional header decoding (PE32 and PE32+).
//!
//! The two layouts share a prefix and diverge after `Magic`: PE32
//! carries `BaseOfData` and 32-bit pointer fields, PE32+ drops
//! `BaseOfData` and widens the pointers to 64 bits. `Magic` alone
//! selects the layout; the COFF machine field is not consulted.

use crate::data_dir::{DataDirectory, DirectoryKind, NUMBER_OF_DIRECTORY_ENTRIES};
use crate::stream::{GrowStream, Stream};
use crate::{Error, Result};

/// Optional header magic for PE32 images.
pub const MAGIC_PE32: u16 = 0x010B;
/// Optional header magic for PE32+ images.
pub const MAGIC_PE32_PLUS: u16 = 0x020B;

/// IMAGE_OPTIONAL_HEADER32.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionalHeader32 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    pub data_directories: Vec<DataDirectory>,
}

/// IMAGE_OPTIONAL_HEADER64.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionalHeader64 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    pub data_directories: Vec<DataDirectory>,
}

fn read_directories(s: &mut Stream<'_>, count: u32) -> Result<Vec<DataDirectory>> {
    // NumberOfRvaAndSizes is attacker-controlled; cap at the format's
    // maximum and skip whatever claims to follow.
    let keep = (count as usize).min(NUMBER_OF_DIRECTORY_ENTRIES);
    let mut dirs = Vec::with_capacity(keep);
    for _ in 0..keep {
        dirs.push(DataDirectory::read(s)?);
    }
    for _ in keep..count as usize {
        if s.remaining() < DataDirectory::SIZE {
            break;
        }
        s.skip(DataDirectory::SIZE);
    }
    Ok(dirs)
}

fn write_directories(s: &mut GrowStream, dirs: &[DataDirectory]) {
    for dir in dirs {
        dir.write(s);
    }
}

impl OptionalHeader32 {
    /// Fixed-field size, before the data directory array.
    pub const FIXED_SIZE: usize = 96;

    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        let magic = s.read_u16_le()?;
        if magic != MAGIC_PE32 {
            return Err(Error::FormatMismatch("optional header magic is not PE32"));
        }
        let mut h = Self {
            magic,
            major_linker_version: s.read_u8()?,
            minor_linker_version: s.read_u8()?,
            size_of_code: s.read_u32_le()?,
            size_of_initialized_data: s.read_u32_le()?,
            size_of_uninitialized_data: s.read_u32_le()?,
            address_of_entry_point: s.read_u32_le()?,
            base_of_code: s.read_u32_le()?,
            base_of_data: s.read_u32_le()?,
            image_base: s.read_u32_le()?,
            section_alignment: s.read_u32_le()?,
            file_alignment: s.read_u32_le()?,
            major_operating_system_version: s.read_u16_le()?,
            minor_operating_system_version: s.read_u16_le()?,
            major_image_version: s.read_u16_le()?,
            minor_image_version: s.read_u16_le()?,
            major_subsystem_version: s.read_u16_le()?,
            minor_subsystem_version: s.read_u16_le()?,
            win32_version_value: s.read_u32_le()?,
            size_of_image: s.read_u32_le()?,
            size_of_headers: s.read_u32_le()?,
            checksum: s.read_u32_le()?,
            subsystem: s.read_u16_le()?,
            dll_characteristics: s.read_u16_le()?,
            size_of_stack_reserve: s.read_u32_le()?,
            size_of_stack_commit: s.read_u32_le()?,
            size_of_heap_reserve: s.read_u32_le()?,
            size_of_heap_commit: s.read_u32_le()?,
            loader_flags: s.read_u32_le()?,
            number_of_rva_and_sizes: s.read_u32_le()?,
            ..Self::default()
        };
        h.data_directories = read_directories(s, h.number_of_rva_and_sizes)?;
        Ok(h)
    }

    pub fn write(&self, s: &mut GrowStream) {
        s.write_u16_le(self.magic);
        s.write_u8(self.major_linker_version);
        s.write_u8(self.minor_linker_version);
        s.write_u32_le(self.size_of_code);
        s.write_u32_le(self.size_of_initialized_data);
        s.write_u32_le(self.size_of_uninitialized_data);
        s.write_u32_le(self.address_of_entry_point);
        s.write_u32_le(self.base_of_code);
        s.write_u32_le(self.base_of_data);
        s.write_u32_le(self.image_base);
        s.write_u32_le(self.section_alignment);
        s.write_u32_le(self.file_alignment);
        s.write_u16_le(self.major_operating_system_version);
        s.write_u16_le(self.minor_operating_system_version);
        s.write_u16_le(self.major_image_version);
        s.write_u16_le(self.minor_image_version);
        s.write_u16_le(self.major_subsystem_version);
        s.write_u16_le(self.minor_subsystem_version);
        s.write_u32_le(self.win32_version_value);
        s.write_u32_le(self.size_of_image);
        s.write_u32_le(self.size_of_headers);
        s.write_u32_le(self.checksum);
        s.write_u16_le(self.subsystem);
        s.write_u16_le(self.dll_characteristics);
        s.write_u32_le(self.size_of_stack_reserve);
        s.write_u32_le(self.size_of_stack_commit);
        s.write_u32_le(self.size_of_heap_reserve);
        s.write_u32_le(self.size_of_heap_commit);
        s.write_u32_le(self.loader_flags);
        s.write_u32_le(self.number_of_rva_and_sizes);
        write_directories(s, &self.data_directories);
    }
}

impl OptionalHeader64 {
    /// Fixed-field size, before the data directory array.
    pub const FIXED_SIZE: usize = 112;

    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        let magic = s.read_u16_le()?;
        if magic != MAGIC_PE32_PLUS {
            return Err(Error::FormatMismatch("optional header magic is not PE32+"));
        }
        let mut h = Self {
            magic,
            major_linker_version: s.read_u8()?,
            minor_linker_version: s.read_u8()?,
            size_of_code: s.read_u32_le()?,
            size_of_initialized_data: s.read_u32_le()?,
            size_of_uninitialized_data: s.read_u32_le()?,
            address_of_entry_point: s.read_u32_le()?,
            base_of_code: s.read_u32_le()?,
            image_base: s.read_u64_le()?,
            section_alignment: s.read_u32_le()?,
            file_alignment: s.read_u32_le()?,
            major_operating_system_version: s.read_u16_le()?,
            minor_operating_system_version: s.read_u16_le()?,
            major_image_version: s.read_u16_le()?,
            minor_image_version: s.read_u16_le()?,
            major_subsystem_version: s.read_u16_le()?,
            minor_subsystem_version: s.read_u16_le()?,
            win32_version_value: s.read_u32_le()?,
            size_of_image: s.read_u32_le()?,
            size_of_headers: s.read_u32_le()?,
            checksum: s.read_u32_le()?,
            subsystem: s.read_u16_le()?,
            dll_characteristics: s.read_u16_le()?,
            size_of_stack_reserve: s.read_u64_le()?,
            size_of_stack_commit: s.read_u64_le()?,
            size_of_heap_reserve: s.read_u64_le()?,
            size_of_heap_commit: s.read_u64_le()?,
            loader_flags: s.read_u32_le()?,
            number_of_rva_and_sizes: s.read_u32_le()?,
            ..Self::default()
        };
        h.data_directories = read_directories(s, h.number_of_rva_and_sizes)?;
        Ok(h)
    }

    pub fn write(&self, s: &mut GrowStream) {
        s.write_u16_le(self.magic);
        s.write_u8(self.major_linker_version);
        s.write_u8(self.minor_linker_version);
        s.write_u32_le(self.size_of_code);
        s.write_u32_le(self.size_of_initialized_data);
        s.write_u32_le(self.size_of_uninitialized_data);
        s.write_u32_le(self.address_of_entry_point);
        s.write_u32_le(self.base_of_code);
        s.write_u64_le(self.image_base);
        s.write_u32_le(self.section_alignment);
        s.write_u32_le(self.file_alignment);
        s.write_u16_le(self.major_operating_system_version);
        s.write_u16_le(self.minor_operating_system_version);
        s.write_u16_le(self.major_image_version);
        s.write_u16_le(self.minor_image_version);
        s.write_u16_le(self.major_subsystem_version);
        s.write_u16_le(self.minor_subsystem_version);
        s.write_u32_le(self.win32_version_value);
        s.write_u32_le(self.size_of_image);
        s.write_u32_le(self.size_of_headers);
        s.write_u32_le(self.checksum);
        s.write_u16_le(self.subsystem);
        s.write_u16_le(self.dll_characteristics);
        s.write_u64_le(self.size_of_stack_reserve);
        s.write_u64_le(self.size_of_stack_commit);
        s.write_u64_le(self.size_of_heap_reserve);
        s.write_u64_le(self.size_of_heap_commit);
        s.write_u32_le(self.loader_flags);
        s.write_u32_le(self.number_of_rva_and_sizes);
        write_directories(s, &self.data_directories);
    }
}

/// Either optional header layout, selected by `Magic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalHeader {
    Pe32(OptionalHeader32),
    Pe32Plus(OptionalHeader64),
}

impl OptionalHeader {
    /// Decode the layout indicated by the leading magic word. An
    /// unrecognized magic is a format mismatch, not a corrupt-file
    /// error: the caller may try a different container format.
    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        let start = s.tell();
        let magic = s.read_u16_le()?;
        s.seek(start);
        match magic {
            MAGIC_PE32 => Ok(Self::Pe32(OptionalHeader32::read(s)?)),
            MAGIC_PE32_PLUS => Ok(Self::Pe32Plus(OptionalHeader64::read(s)?)),
            _ => Err(Error::FormatMismatch("unknown optional header magic")),
        }
    }

    pub fn write(&self, s: &mut GrowStream) {
        match self {
            Self::Pe32(h) => h.write(s),
            Self::Pe32Plus(h) => h.write(s),
        }
    }

    pub fn magic(&self) -> u16 {
        match self {
            Self::Pe32(h) => h.magic,
            Self::Pe32Plus(h) => h.magic,
        }
    }

    pub fn is_pe32plus(&self) -> bool {
        matches!(self, Self::Pe32Plus(_))
    }

    pub fn image_base(&self) -> u64 {
        match self {
            Self::Pe32(h) => h.image_base as u64,
            Self::Pe32Plus(h) => h.image_base,
        }
    }

    pub fn address_of_entry_point(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.address_of_entry_point,
            Self::Pe32Plus(h) => h.address_of_entry_point,
        }
    }

    pub fn size_of_image(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.size_of_image,
            Self::Pe32Plus(h) => h.size_of_image,
        }
    }

    pub fn size_of_headers(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.size_of_headers,
            Self::Pe32Plus(h) => h.size_of_headers,
        }
    }

    pub fn file_alignment(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.file_alignment,
            Self::Pe32Plus(h) => h.file_alignment,
        }
    }

    pub fn section_alignment(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.section_alignment,
            Self::Pe32Plus(h) => h.section_alignment,
        }
    }

    pub fn subsystem(&self) -> u16 {
        match self {
            Self::Pe32(h) => h.subsystem,
            Self::Pe32Plus(h) => h.subsystem,
        }
    }

    pub fn data_directories(&self) -> &[DataDirectory] {
        match self {
            Self::Pe32(h) => &h.data_directories,
            Self::Pe32Plus(h) => &h.data_directories,
        }
    }

    /// The directory slot for `kind`, if it exists and is non-empty.
    pub fn directory(&self, kind: DirectoryKind) -> Option<DataDirectory> {
        self.data_directories()
            .get(kind.as_index())
            .copied()
            .filter(DataDirectory::is_present)
    }
}
