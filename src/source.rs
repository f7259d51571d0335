//! Byte sources: the seam external backing stores plug into.
//!
//! The decoder only needs a length and random-access reads; anything
//! that can satisfy [`ByteSource`] (a file, an archive member, paged
//! debuggee memory) can feed it.

use crate::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Random-access byte capability.
pub trait ByteSource {
    /// Read bytes at `offset` into `buf`, returning the count actually
    /// read (short reads near the end are not an error).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total size of the source in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(offset, buf)?;
        if n < buf.len() {
            return Err(Error::EndOfBuffer {
                offset: offset as usize,
                needed: buf.len(),
                len: self.len() as usize,
            });
        }
        Ok(())
    }

    /// Materialize the whole source as an owned buffer.
    fn read_all(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.len() as usize];
        self.read_exact_at(0, &mut buf)?;
        Ok(buf)
    }
}

/// In-memory slice source.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl ByteSource for SliceSource<'_> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// File-on-disk source.
pub struct FileSource {
    file: std::cell::RefCell<File>,
    size: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let size = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file: std::cell::RefCell::new(file),
            size,
        })
    }
}

impl ByteSource for FileSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.read(buf)?)
    }

    fn len(&self) -> u64 {
        self.size
    }
}
