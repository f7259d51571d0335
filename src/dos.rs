//! DOS header decoding.

use crate::stream::{GrowStream, Stream};
use crate::Result;

/// DOS "MZ" signature.
pub const DOS_SIGNATURE: u16 = 0x5A4D;

/// IMAGE_DOS_HEADER.
///
/// Malformed DOS headers are tolerated: nothing here is validated and
/// only `e_lfanew` (the file offset of the PE signature) is trusted by
/// the rest of the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosHeader {
    /// Magic number ("MZ" in well-formed files).
    pub e_magic: u16,
    /// Bytes on last page of file.
    pub e_cblp: u16,
    /// Pages in file.
    pub e_cp: u16,
    /// Relocations.
    pub e_crlc: u16,
    /// Size of header in paragraphs.
    pub e_cparhdr: u16,
    /// Minimum extra paragraphs needed.
    pub e_minalloc: u16,
    /// Maximum extra paragraphs needed.
    pub e_maxalloc: u16,
    /// Initial (relative) SS value.
    pub e_ss: u16,
    /// Initial SP value.
    pub e_sp: u16,
    /// Checksum.
    pub e_csum: u16,
    /// Initial IP value.
    pub e_ip: u16,
    /// Initial (relative) CS value.
    pub e_cs: u16,
    /// File address of relocation table.
    pub e_lfarlc: u16,
    /// Overlay number.
    pub e_ovno: u16,
    /// Reserved words.
    pub e_res: [u16; 4],
    /// OEM identifier.
    pub e_oemid: u16,
    /// OEM information.
    pub e_oeminfo: u16,
    /// Reserved words.
    pub e_res2: [u16; 10],
    /// File offset of the PE header.
    pub e_lfanew: i32,
}

impl DosHeader {
    /// Size of the DOS header in bytes.
    pub const SIZE: usize = 64;

    /// Decode the header at the stream cursor.
    pub fn read(s: &mut Stream<'_>) -> Result<Self> {
        let mut h = Self {
            e_magic: s.read_u16_le()?,
            e_cblp: s.read_u16_le()?,
            e_cp: s.read_u16_le()?,
            e_crlc: s.read_u16_le()?,
            e_cparhdr: s.read_u16_le()?,
            e_minalloc: s.read_u16_le()?,
            e_maxalloc: s.read_u16_le()?,
            e_ss: s.read_u16_le()?,
            e_sp: s.read_u16_le()?,
            e_csum: s.read_u16_le()?,
            e_ip: s.read_u16_le()?,
            e_cs: s.read_u16_le()?,
            e_lfarlc: s.read_u16_le()?,
            e_ovno: s.read_u16_le()?,
            ..Self::default()
        };
        for r in &mut h.e_res {
            *r = s.read_u16_le()?;
        }
        h.e_oemid = s.read_u16_le()?;
        h.e_oeminfo = s.read_u16_le()?;
        for r in &mut h.e_res2 {
            *r = s.read_u16_le()?;
        }
        h.e_lfanew = s.read_i32_le()?;
        Ok(h)
    }

    /// Encode the header at the write cursor.
    pub fn write(&self, s: &mut GrowStream) {
        s.write_u16_le(self.e_magic);
        s.write_u16_le(self.e_cblp);
        s.write_u16_le(self.e_cp);
        s.write_u16_le(self.e_crlc);
        s.write_u16_le(self.e_cparhdr);
        s.write_u16_le(self.e_minalloc);
        s.write_u16_le(self.e_maxalloc);
        s.write_u16_le(self.e_ss);
        s.write_u16_le(self.e_sp);
        s.write_u16_le(self.e_csum);
        s.write_u16_le(self.e_ip);
        s.write_u16_le(self.e_cs);
        s.write_u16_le(self.e_lfarlc);
        s.write_u16_le(self.e_ovno);
        for r in self.e_res {
            s.write_u16_le(r);
        }
        s.write_u16_le(self.e_oemid);
        s.write_u16_le(self.e_oeminfo);
        for r in self.e_res2 {
            s.write_u16_le(r);
        }
        s.write_bytes(&self.e_lfanew.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size() {
        let mut g = GrowStream::new();
        DosHeader::default().write(&mut g);
        assert_eq!(g.len(), DosHeader::SIZE);
    }

    #[test]
    fn malformed_magic_is_tolerated() {
        let data = [0u8; 64];
        let mut s = Stream::new(&data);
        let h = DosHeader::read(&mut s).unwrap();
        assert_eq!(h.e_magic, 0);
        assert_eq!(h.e_lfanew, 0);
    }

    #[test]
    fn roundtrip() {
        let mut data = [0u8; 64];
        data[0] = 0x4D;
        data[1] = 0x5A;
        data[60..64].copy_from_slice(&0x80i32.to_le_bytes());

        let mut s = Stream::new(&data);
        let h = DosHeader::read(&mut s).unwrap();
        assert_eq!(h.e_magic, DOS_SIGNATURE);
        assert_eq!(h.e_lfanew, 0x80);

        let mut g = GrowStream::new();
        h.write(&mut g);
        assert_eq!(g.bytes(), &data);
    }

    #[test]
    fn truncated_header_fails() {
        let data = [0u8; 32];
        let mut s = Stream::new(&data);
        assert!(DosHeader::read(&mut s).is_err());
    }
}
