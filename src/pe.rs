//! The PE document: header chain, section table, and lazy directory
//! decoding.
//!
//! Parsing trusts exactly one DOS header field, `e_lfanew`, and walks
//! signature, COFF header, optional header, then the section table.
//! Directory contents are decoded on demand against the finalized
//! section table. Decode failures inside one directory are contained
//! there: the document collects a diagnostic instead of failing as a
//! whole.

use log::{debug, warn};

use crate::coff::{CoffHeader, PE_SIGNATURE};
use crate::data_dir::{DataDirectory, DirectoryKind};
use crate::desc::{Blob, Value};
use crate::dos::DosHeader;
use crate::export::ExportTable;
use crate::import::ImportTable;
use crate::optional::OptionalHeader;
use crate::resource::{ResourceNode, ResourceTree};
use crate::rva::RvaResolver;
use crate::section::SectionTable;
use crate::source::ByteSource;
use crate::stream::Stream;
use crate::{Error, Result};

/// Decoded content of one data directory.
#[derive(Debug, Clone)]
pub enum DirectoryData {
    Exports(ExportTable),
    Imports(ImportTable),
    Resources(ResourceTree),
    /// A directory kind with no dedicated decoder: the slot plus its
    /// resolved bytes, when they land in a section.
    Raw {
        slot: DataDirectory,
        blob: Option<Blob>,
    },
}

/// A parsed PE image.
#[derive(Debug, Clone)]
pub struct Pe {
    data: Vec<u8>,
    pub dos_header: DosHeader,
    /// Bytes between the DOS header and the PE signature (the real-mode
    /// stub program, usually "This program cannot be run in DOS mode").
    pub dos_stub: Blob,
    pub coff_header: CoffHeader,
    pub optional_header: Option<OptionalHeader>,
    pub sections: SectionTable,
    /// Decode problems that were contained rather than fatal.
    pub diagnostics: Vec<String>,
}

/// Whether the buffer reaches a PE signature through `e_lfanew`. The
/// DOS magic itself is deliberately not required.
pub fn is_pe(data: &[u8]) -> bool {
    let mut s = Stream::new(data);
    let Ok(dos) = DosHeader::read(&mut s) else {
        return false;
    };
    let Ok(lfanew) = usize::try_from(dos.e_lfanew) else {
        return false;
    };
    s.seek(lfanew);
    matches!(s.read_u32_le(), Ok(sig) if sig == PE_SIGNATURE)
}

impl Pe {
    /// Parse an in-memory image.
    ///
    /// Header-chain failures are fatal. A truncated section table is
    /// not: the document comes back with zero sections and a
    /// diagnostic.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let mut s = Stream::new(&data);
        let dos_header = DosHeader::read(&mut s)?;
        let lfanew = usize::try_from(dos_header.e_lfanew)
            .map_err(|_| Error::FormatMismatch("negative e_lfanew"))?;

        let stub_end = lfanew.clamp(DosHeader::SIZE, data.len());
        let dos_stub = Blob {
            offset: DosHeader::SIZE,
            bytes: data[DosHeader::SIZE.min(stub_end)..stub_end].to_vec(),
        };

        s.seek(lfanew);
        if s.read_u32_le().map_err(|_| {
            Error::FormatMismatch("e_lfanew points outside the buffer")
        })? != PE_SIGNATURE
        {
            return Err(Error::FormatMismatch("missing PE signature"));
        }
        let coff_header = CoffHeader::read(&mut s)?;
        debug!(
            "PE signature at {lfanew:#x}, machine {:#06x}, {} sections",
            coff_header.machine, coff_header.number_of_sections
        );

        let optional_header = if coff_header.size_of_optional_header > 0 {
            let mut sub = s.sub(coff_header.size_of_optional_header as usize)?;
            Some(OptionalHeader::read(&mut sub)?)
        } else {
            None
        };

        let mut diagnostics = Vec::new();
        let sections = match SectionTable::read(&mut s, coff_header.number_of_sections as usize) {
            Ok(table) => table,
            Err(e) => {
                warn!("section table unreadable: {e}");
                diagnostics.push(format!("section table unreadable: {e}"));
                SectionTable::default()
            }
        };

        Ok(Self {
            data,
            dos_header,
            dos_stub,
            coff_header,
            optional_header,
            sections,
            diagnostics,
        })
    }

    /// Parse from any [`ByteSource`], materializing the buffer first.
    pub fn from_source<S: ByteSource>(source: &S) -> Result<Self> {
        Self::parse(source.read_all()?)
    }

    /// The raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn resolver(&self) -> RvaResolver<'_> {
        RvaResolver::new(&self.sections, &self.data)
    }

    pub fn is_pe32plus(&self) -> bool {
        self.optional_header
            .as_ref()
            .is_some_and(OptionalHeader::is_pe32plus)
    }

    /// The data-directory slot for `kind`, when the optional header
    /// carries one and it is non-empty.
    pub fn directory_slot(&self, kind: DirectoryKind) -> Option<DataDirectory> {
        self.optional_header.as_ref()?.directory(kind)
    }

    /// Decode one directory's contents. `None` when the slot is absent
    /// or its address resolves to no section.
    pub fn read_directory(&self, kind: DirectoryKind) -> Result<Option<DirectoryData>> {
        let Some(slot) = self.directory_slot(kind) else {
            return Ok(None);
        };
        let resolver = self.resolver();
        let decoded = match kind {
            DirectoryKind::Export => {
                ExportTable::decode(&resolver, slot)?.map(DirectoryData::Exports)
            }
            DirectoryKind::Import => {
                ImportTable::decode(&resolver, slot, self.is_pe32plus())?
                    .map(DirectoryData::Imports)
            }
            DirectoryKind::Resource => {
                ResourceTree::decode(&resolver, slot)?.map(DirectoryData::Resources)
            }
            _ => Some(DirectoryData::Raw {
                slot,
                blob: resolver.blob(slot.virtual_address, slot.size as usize),
            }),
        };
        Ok(decoded)
    }

    /// Decode every present directory, containing per-directory
    /// failures as diagnostics.
    pub fn decode_directories(&mut self) -> Vec<(DirectoryKind, DirectoryData)> {
        let mut out = Vec::new();
        let mut failures = Vec::new();
        for kind in DirectoryKind::all() {
            match self.read_directory(kind) {
                Ok(Some(data)) => out.push((kind, data)),
                Ok(None) => {}
                Err(e) => {
                    warn!("{} directory not decoded: {e}", kind.name());
                    failures.push(format!("{} directory not decoded: {e}", kind.name()));
                }
            }
        }
        self.diagnostics.extend(failures);
        out
    }

    /// The document as a named value tree for presentation layers.
    pub fn to_tree(&mut self) -> Value {
        let mut fields = vec![
            ("dos_header".into(), dos_tree(&self.dos_header)),
            ("dos_stub".into(), Value::Blob(self.dos_stub.clone())),
            ("coff_header".into(), coff_tree(&self.coff_header)),
        ];
        if let Some(opt) = &self.optional_header {
            fields.push(("optional_header".into(), optional_tree(opt)));
        }
        fields.push((
            "sections".into(),
            Value::Array(self.sections.sections.iter().map(section_tree).collect()),
        ));

        let directories = self.decode_directories();
        fields.push((
            "data_directories".into(),
            Value::Record(
                directories
                    .iter()
                    .map(|(kind, data)| (kind.name().to_owned(), directory_tree(data)))
                    .collect(),
            ),
        ));
        if !self.diagnostics.is_empty() {
            fields.push((
                "diagnostics".into(),
                Value::Array(
                    self.diagnostics
                        .iter()
                        .map(|d| Value::Str(d.clone()))
                        .collect(),
                ),
            ));
        }
        Value::Record(fields)
    }
}

fn uint(v: impl Into<u64>) -> Value {
    Value::UInt(v.into())
}

fn dos_tree(h: &DosHeader) -> Value {
    Value::Record(vec![
        ("e_magic".into(), uint(h.e_magic)),
        ("e_cblp".into(), uint(h.e_cblp)),
        ("e_cp".into(), uint(h.e_cp)),
        ("e_crlc".into(), uint(h.e_crlc)),
        ("e_cparhdr".into(), uint(h.e_cparhdr)),
        ("e_lfanew".into(), Value::Int(h.e_lfanew as i64)),
    ])
}

fn coff_tree(h: &CoffHeader) -> Value {
    Value::Record(vec![
        ("machine".into(), uint(h.machine)),
        ("number_of_sections".into(), uint(h.number_of_sections)),
        ("time_date_stamp".into(), uint(h.time_date_stamp)),
        ("size_of_optional_header".into(), uint(h.size_of_optional_header)),
        ("characteristics".into(), uint(h.characteristics)),
    ])
}

fn optional_tree(h: &OptionalHeader) -> Value {
    Value::Record(vec![
        ("magic".into(), uint(h.magic())),
        ("image_base".into(), uint(h.image_base())),
        ("address_of_entry_point".into(), uint(h.address_of_entry_point())),
        ("section_alignment".into(), uint(h.section_alignment())),
        ("file_alignment".into(), uint(h.file_alignment())),
        ("size_of_image".into(), uint(h.size_of_image())),
        ("size_of_headers".into(), uint(h.size_of_headers())),
        ("subsystem".into(), uint(h.subsystem())),
    ])
}

fn section_tree(h: &crate::section::SectionHeader) -> Value {
    Value::Record(vec![
        ("name".into(), Value::Str(h.name_str().to_owned())),
        ("virtual_size".into(), uint(h.virtual_size)),
        ("virtual_address".into(), uint(h.virtual_address)),
        ("size_of_raw_data".into(), uint(h.size_of_raw_data)),
        ("pointer_to_raw_data".into(), uint(h.pointer_to_raw_data)),
        ("characteristics".into(), uint(h.characteristics)),
    ])
}

fn directory_tree(data: &DirectoryData) -> Value {
    match data {
        DirectoryData::Exports(exports) => Value::Record(
            exports
                .keyed()
                .map(|(key, entry)| (key, uint(entry.rva)))
                .collect(),
        ),
        DirectoryData::Imports(imports) => Value::Record(
            imports
                .dlls
                .iter()
                .map(|dll| {
                    (
                        dll.name.clone(),
                        Value::Array(
                            dll.thunks
                                .iter()
                                .map(|t| Value::Str(t.display()))
                                .collect(),
                        ),
                    )
                })
                .collect(),
        ),
        DirectoryData::Resources(tree) => resource_dir_tree(&tree.root),
        DirectoryData::Raw { slot, blob } => {
            let mut fields = vec![
                ("virtual_address".into(), uint(slot.virtual_address)),
                ("size".into(), uint(slot.size)),
            ];
            if let Some(blob) = blob {
                fields.push(("data".into(), Value::Blob(blob.clone())));
            }
            Value::Record(fields)
        }
    }
}

fn resource_dir_tree(dir: &crate::resource::ResourceDirectory) -> Value {
    Value::Record(
        dir.entries
            .iter()
            .map(|entry| {
                let child = match &entry.node {
                    ResourceNode::Directory(sub) => resource_dir_tree(sub),
                    ResourceNode::Data(leaf) => match &leaf.data {
                        Some(blob) => Value::Blob(blob.clone()),
                        None => Value::Null,
                    },
                };
                (entry.id.display(), child)
            })
            .collect(),
    )
}
