//! Data directory table decoding.

use crate::stream::{GrowStream, Stream};
use crate::Result;

/// Number of data directory slots in the optional header.
pub const NUMBER_OF_DIRECTORY_ENTRIES: usize = 16;

/// The fixed purpose of each data directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum DirectoryKind {
    Export = 0,
    Import = 1,
    Resource = 2,
    Exception = 3,
    Security = 4,
    BaseReloc = 5,
    Debug = 6,
    Architecture = 7,
    GlobalPtr = 8,
    Tls = 9,
    LoadConfig = 10,
    BoundImport = 11,
    Iat = 12,
    DelayImport = 13,
    ClrRuntime = 14,
    Reserved = 15,
}

impl DirectoryKind {
    /// Canonical slot names, in table order.
    pub const NAMES: [&'static str; NUMBER_OF_DIRECTORY_ENTRIES] = [
        "EXPORT",
        "IMPORT",
        "RESOURCE",
        "EXCEPTION",
        "SECURITY",
        "BASERELOC",
        "DEBUG",
        "ARCHITECTURE",
        "GLOBALPTR",
        "TLS",
        "LOAD_CONFIG",
        "BOUND_IMPORT",
        "IAT",
        "DELAY_IMPORT",
        "CLR_DESCRIPTOR",
        "RESERVED",
    ];

    pub const fn as_index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Export),
            1 => Some(Self::Import),
            2 => Some(Self::Resource),
            3 => Some(Self::Exception),
            4 => Some(Self::Security),
            5 => Some(Self::BaseReloc),
            6 => Some(Self::Debug),
            7 => Some(Self::Architecture),
            8 => Some(Self::GlobalPtr),
            9 => Some(Self::Tls),
            10 => Some(Self::LoadConfig),
            11 => Some(Self::BoundImport),
            12 => Some(Self::Iat),
            13 => Some(Self::DelayImport),
            14 => Some(Self::ClrRuntime),
            15 => Some(Self::Reserved),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        Self::NAMES[self.as_index()]
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUMBER_OF_DIRECTORY_ENTRIES).filter_map(Self::from_index)
    }
}

/// IMAGE_DATA_DIRECTORY: one `{address, size}` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    /// RVA of the table this slot points at.
    pub virtual_address: u32,
    /// Size of the table in bytes.
    pub size: u32,
}

impl DataDirectory {
    /// Size of one slot in bytes.
    pub const SIZE: usize = 8;

    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        Ok(Self {
            virtual_address: s.read_u32_le()?,
            size: s.read_u32_le()?,
        })
    }

    pub fn write(&self, s: &mut GrowStream) {
        s.write_u32_le(self.virtual_address);
        s.write_u32_le(self.size);
    }

    /// A slot with `size == 0` denotes an absent directory and must be
    /// filtered before any further decoding.
    pub fn is_present(&self) -> bool {
        self.size != 0
    }
}
