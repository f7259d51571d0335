//! # binform
//!
//! A declarative binary-layout engine with a PE (Portable Executable)
//! decoder built on top of it.
//!
//! The engine side is a cursor [`Stream`] over an in-memory buffer and
//! a vocabulary of composable type descriptors ([`Desc`]) whose `get`
//! and `put` are symmetric: writing back what was read reproduces the
//! consumed bytes exactly. The PE side decodes the DOS/COFF/optional
//! header chain and section table into typed records, translates RVAs
//! through the section table, and walks the export, import, and
//! resource directories.
//!
//! ## Example
//!
//! ```no_run
//! use binform::{Format, Pe};
//!
//! let data = std::fs::read("example.exe").unwrap();
//! assert_eq!(Format::detect(&data), Format::Pe);
//!
//! let mut pe = Pe::parse(data).unwrap();
//! for section in &pe.sections.sections {
//!     println!("{} @ {:#x}", section.name_str(), section.virtual_address);
//! }
//! let tree = pe.to_tree();
//! println!("{tree:?}");
//! ```

pub mod coff;
pub mod data_dir;
pub mod desc;
pub mod dos;
pub mod error;
pub mod export;
pub mod format;
pub mod import;
pub mod optional;
pub mod pe;
pub mod resource;
pub mod rva;
pub mod section;
pub mod source;
pub mod stream;

pub use coff::{CoffCharacteristics, CoffHeader, MachineType};
pub use data_dir::{DataDirectory, DirectoryKind};
pub use desc::{Blob, Desc, Encoding, Endian, IntWidth, Value};
pub use dos::DosHeader;
pub use error::{Error, Result};
pub use export::{ExportDirectory, ExportEntry, ExportTable};
pub use format::Format;
pub use import::{ImportDescriptor, ImportTable, ImportThunk, ImportedDll};
pub use optional::{OptionalHeader, OptionalHeader32, OptionalHeader64};
pub use pe::{is_pe, DirectoryData, Pe};
pub use resource::{ResourceData, ResourceDirectory, ResourceId, ResourceNode, ResourceTree};
pub use rva::RvaResolver;
pub use section::{SectionCharacteristics, SectionHeader, SectionTable};
pub use source::{ByteSource, FileSource, SliceSource};
pub use stream::{GrowStream, Stream};
