//! End-to-end tests over synthetic images assembled with the write
//! path, so the encode and decode sides check each other.

use binform::{
    CoffHeader, DataDirectory, DirectoryData, DirectoryKind, DosHeader, ExportDirectory, Format,
    GrowStream, ImportThunk, MachineType, OptionalHeader64, Pe, SectionHeader, SliceSource, Value,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const LFANEW: i32 = 0x80;
const TEXT_VA: u32 = 0x1000;
const TEXT_RAW: u32 = 0x200;
const TEXT_SIZE: u32 = 0x200;
const MAGIC_PE32_PLUS: u16 = 0x020B;

fn dos_header() -> DosHeader {
    DosHeader {
        e_magic: 0x5A4D,
        e_lfanew: LFANEW,
        ..Default::default()
    }
}

fn optional_header(directories: Vec<DataDirectory>) -> OptionalHeader64 {
    OptionalHeader64 {
        magic: MAGIC_PE32_PLUS,
        address_of_entry_point: TEXT_VA,
        base_of_code: TEXT_VA,
        image_base: 0x1_4000_0000,
        section_alignment: 0x1000,
        file_alignment: 0x200,
        size_of_image: 0x2000,
        size_of_headers: TEXT_RAW,
        subsystem: 3,
        number_of_rva_and_sizes: directories.len() as u32,
        data_directories: directories,
        ..Default::default()
    }
}

fn text_section() -> SectionHeader {
    let mut section = SectionHeader {
        virtual_size: 0x1000,
        virtual_address: TEXT_VA,
        size_of_raw_data: TEXT_SIZE,
        pointer_to_raw_data: TEXT_RAW,
        characteristics: 0x6000_0020,
        ..Default::default()
    };
    section.name[..5].copy_from_slice(b".text");
    section
}

/// A minimal 64-bit image with one `.text` section. `fill` gets a
/// chance to write section contents before the buffer is finalized.
fn build_image(directories: Vec<DataDirectory>, fill: impl FnOnce(&mut GrowStream)) -> Vec<u8> {
    let opt = optional_header(directories);
    let mut opt_bytes = GrowStream::new();
    opt.write(&mut opt_bytes);

    let mut g = GrowStream::new();
    dos_header().write(&mut g);
    g.seek(LFANEW as usize);
    g.write_u32_le(0x0000_4550);
    CoffHeader {
        machine: MachineType::Amd64 as u16,
        number_of_sections: 1,
        size_of_optional_header: opt_bytes.len() as u16,
        characteristics: 0x0022,
        ..Default::default()
    }
    .write(&mut g);
    opt.write(&mut g);
    text_section().write(&mut g);

    fill(&mut g);

    let mut data = g.into_bytes();
    data.resize((TEXT_RAW + TEXT_SIZE) as usize, 0);
    data
}

fn empty_directories() -> Vec<DataDirectory> {
    vec![DataDirectory::default(); 16]
}

#[test]
fn minimal_pe64_decodes() {
    init_logs();
    let data = build_image(empty_directories(), |_| {});
    assert!(binform::is_pe(&data));
    assert_eq!(Format::detect(&data), Format::Pe);

    let pe = Pe::parse(data).unwrap();
    assert_eq!(pe.dos_header.e_lfanew, LFANEW);
    let opt = pe.optional_header.as_ref().unwrap();
    assert_eq!(opt.magic(), MAGIC_PE32_PLUS);
    assert!(pe.is_pe32plus());
    assert_eq!(pe.sections.len(), 1);
    assert_eq!(pe.sections.sections[0].name_str(), ".text");
    assert!(pe.diagnostics.is_empty());

    // Every directory slot is empty.
    for kind in DirectoryKind::all() {
        assert!(pe.directory_slot(kind).is_none(), "{} present", kind.name());
        assert!(pe.read_directory(kind).unwrap().is_none());
    }
}

#[test]
fn export_directory_with_ordinal_only_entries() {
    let mut directories = empty_directories();
    directories[DirectoryKind::Export.as_index()] = DataDirectory {
        virtual_address: TEXT_VA,
        size: 0x100,
    };
    let data = build_image(directories, |g| {
        g.seek(TEXT_RAW as usize);
        ExportDirectory {
            base: 1,
            number_of_functions: 2,
            number_of_names: 0,
            address_of_functions: TEXT_VA + ExportDirectory::SIZE as u32,
            ..Default::default()
        }
        .write(g);
        g.write_u32_le(TEXT_VA + 0x100);
        g.write_u32_le(TEXT_VA + 0x110);
    });

    let pe = Pe::parse(data).unwrap();
    let Some(DirectoryData::Exports(exports)) =
        pe.read_directory(DirectoryKind::Export).unwrap()
    else {
        panic!("export directory not decoded");
    };
    let keys: Vec<String> = exports.keyed().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["#1: ", "#2: "]);
}

#[test]
fn truncated_section_table_degrades_to_diagnostic() {
    init_logs();
    let mut data = build_image(empty_directories(), |_| {});
    // Cut the buffer 4 bytes short of the end of the section table.
    let table_end = LFANEW as usize + 4 + CoffHeader::SIZE + 240 + SectionHeader::SIZE;
    data.truncate(table_end - 4);

    let pe = Pe::parse(data).unwrap();
    assert_eq!(pe.sections.len(), 0);
    assert_eq!(pe.diagnostics.len(), 1);
    assert!(pe.diagnostics[0].contains("section table"));
}

#[test]
fn import_directory_end_to_end() {
    let thunk_rva = TEXT_VA + 0x80;
    let name_rva = TEXT_VA + 0xC0;
    let dll_rva = TEXT_VA + 0xE0;

    let mut directories = empty_directories();
    directories[DirectoryKind::Import.as_index()] = DataDirectory {
        virtual_address: TEXT_VA,
        size: 0x28,
    };
    let data = build_image(directories, |g| {
        g.seek(TEXT_RAW as usize);
        binform::ImportDescriptor {
            original_first_thunk: thunk_rva,
            name: dll_rva,
            first_thunk: thunk_rva,
            ..Default::default()
        }
        .write(g);
        binform::ImportDescriptor::default().write(g);

        g.seek((TEXT_RAW + 0x80) as usize);
        g.write_u64_le(name_rva as u64);
        g.write_u64_le(1u64 << 63 | 42);
        g.write_u64_le(0);

        g.seek((TEXT_RAW + 0xC0) as usize);
        g.write_u16_le(3);
        g.write_bytes(b"ExitProcess\0");
        g.seek((TEXT_RAW + 0xE0) as usize);
        g.write_bytes(b"KERNEL32.dll\0");
    });

    let pe = Pe::parse(data).unwrap();
    let Some(DirectoryData::Imports(imports)) =
        pe.read_directory(DirectoryKind::Import).unwrap()
    else {
        panic!("import directory not decoded");
    };
    assert_eq!(imports.dlls.len(), 1);
    assert_eq!(imports.dlls[0].name, "KERNEL32.dll");
    assert_eq!(
        imports.dlls[0].thunks,
        vec![
            ImportThunk::Name {
                hint: 3,
                name: "ExitProcess".into()
            },
            ImportThunk::Ordinal(42),
        ]
    );
}

#[test]
fn tree_view_names_every_layer() {
    let mut directories = empty_directories();
    directories[DirectoryKind::Export.as_index()] = DataDirectory {
        virtual_address: TEXT_VA,
        size: 0x100,
    };
    let data = build_image(directories, |g| {
        g.seek(TEXT_RAW as usize);
        ExportDirectory {
            base: 5,
            number_of_functions: 1,
            address_of_functions: TEXT_VA + ExportDirectory::SIZE as u32,
            ..Default::default()
        }
        .write(g);
        g.write_u32_le(TEXT_VA + 0x100);
    });

    let mut pe = Pe::parse(data).unwrap();
    let tree = pe.to_tree();
    assert_eq!(
        tree.field("coff_header")
            .and_then(|c| c.field("machine"))
            .and_then(Value::as_u64),
        Some(MachineType::Amd64 as u64)
    );
    let sections = tree.field("sections").and_then(Value::as_array).unwrap();
    assert_eq!(sections[0].field("name").and_then(Value::as_str), Some(".text"));

    let dirs = tree.field("data_directories").unwrap();
    let exports = dirs.field("EXPORT").unwrap();
    assert!(exports.field("#5: ").is_some());
}

#[test]
fn byte_source_roundtrip() {
    let data = build_image(empty_directories(), |_| {});
    let source = SliceSource::new(&data);
    let pe = Pe::from_source(&source).unwrap();
    assert_eq!(pe.sections.len(), 1);
    assert_eq!(pe.data(), data.as_slice());
}

#[test]
fn dos_stub_is_retained() {
    let data = build_image(empty_directories(), |g| {
        g.seek(DosHeader::SIZE);
        g.write_bytes(b"This program cannot be run in DOS mode");
    });
    let pe = Pe::parse(data).unwrap();
    assert_eq!(pe.dos_stub.offset, DosHeader::SIZE);
    assert_eq!(pe.dos_stub.len(), LFANEW as usize - DosHeader::SIZE);
    assert!(pe.dos_stub.bytes.starts_with(b"This program"));
}
