//! Executable format sniffing.
//!
//! Callers probe candidate buffers against several container formats
//! in sequence; only the PE decoder lives in this crate, the rest of
//! the detection exists so a caller can route the buffer elsewhere
//! without attempting a doomed parse.

use crate::pe::is_pe;

/// Known executable container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pe,
    Elf,
    MachO,
    Unknown,
}

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
// 32/64-bit Mach-O magics, both byte orders, plus the fat header.
const MACHO_MAGICS: [[u8; 4]; 5] = [
    [0xFE, 0xED, 0xFA, 0xCE],
    [0xCE, 0xFA, 0xED, 0xFE],
    [0xFE, 0xED, 0xFA, 0xCF],
    [0xCF, 0xFA, 0xED, 0xFE],
    [0xCA, 0xFE, 0xBA, 0xBE],
];

impl Format {
    /// Identify the container format from leading magics. PE detection
    /// requires reaching the PE signature through `e_lfanew`, not just
    /// the `MZ` prefix.
    pub fn detect(data: &[u8]) -> Self {
        if let Some(magic) = data.get(..4) {
            let magic = [magic[0], magic[1], magic[2], magic[3]];
            if magic == ELF_MAGIC {
                return Self::Elf;
            }
            if MACHO_MAGICS.contains(&magic) {
                return Self::MachO;
            }
        }
        if is_pe(data) {
            return Self::Pe;
        }
        Self::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_elf_and_macho() {
        assert_eq!(Format::detect(&[0x7F, b'E', b'L', b'F', 2, 1]), Format::Elf);
        assert_eq!(
            Format::detect(&[0xCF, 0xFA, 0xED, 0xFE, 0, 0]),
            Format::MachO
        );
    }

    #[test]
    fn mz_prefix_alone_is_not_pe() {
        let mut data = vec![0u8; 0x100];
        data[0] = 0x4D;
        data[1] = 0x5A;
        assert_eq!(Format::detect(&data), Format::Unknown);
    }

    #[test]
    fn short_buffers_are_unknown() {
        assert_eq!(Format::detect(&[]), Format::Unknown);
        assert_eq!(Format::detect(&[0x7F]), Format::Unknown);
    }
}
