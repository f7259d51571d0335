//! Cursor-based access to in-memory byte buffers.
//!
//! `Stream` is the read-side cursor every descriptor and decoder in this
//! crate consumes. It never copies the underlying buffer; reads hand out
//! subslices. `GrowStream` is the owned write-side counterpart with
//! geometric growth.

use crate::{Error, Result};

/// A read cursor over a borrowed byte buffer.
///
/// The cursor may be seeked past the logical end (seeking is unchecked);
/// any read that would cross the end fails with [`Error::EndOfBuffer`]
/// and leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct Stream<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` in the containing file, carried so
    /// blob leaves can report addressable positions.
    origin: usize,
}

impl<'a> Stream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            origin: 0,
        }
    }

    /// A stream whose positions report as offsets into a larger file.
    pub fn with_origin(data: &'a [u8], origin: usize) -> Self {
        Self {
            data,
            pos: 0,
            origin,
        }
    }

    /// Cursor position relative to the logical start of the stream.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Absolute position of the cursor in the containing file.
    pub fn position(&self) -> usize {
        self.origin + self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the logical end. Zero when the
    /// cursor has been seeked past the end.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// The unread tail of the buffer, without consuming it.
    pub fn remainder(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Consume and return everything up to the logical end.
    pub fn take_remainder(&mut self) -> &'a [u8] {
        let rest = self.remainder();
        self.pos = self.data.len();
        rest
    }

    /// Reposition the cursor to an absolute offset within this stream.
    /// Seeking past the end is legal; the next read will fail instead.
    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    /// Advance the cursor without reading.
    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    /// Advance the cursor to the next multiple of `n` from the logical
    /// start of the stream. `n == 0` is a no-op.
    pub fn align(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let rem = self.pos % n;
        if rem != 0 {
            self.pos += n - rem;
        }
    }

    fn out_of_bounds(&self, needed: usize) -> Error {
        Error::EndOfBuffer {
            offset: self.origin + self.pos,
            needed,
            len: self.origin + self.data.len(),
        }
    }

    /// Read exactly `n` bytes, advancing the cursor.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(self.out_of_bounds(n));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Extract a sub-stream covering the next `n` bytes and advance past
    /// them. The sub-stream reports absolute positions relative to the
    /// same containing file.
    pub fn sub(&mut self, n: usize) -> Result<Stream<'a>> {
        let origin = self.position();
        let bytes = self.read_bytes(n)?;
        Ok(Stream::with_origin(bytes, origin))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        Ok(self.read_u16_le()? as i16)
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        Ok(self.read_u64_le()? as i64)
    }

    pub fn read_f32_le(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    pub fn read_f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64_le()?))
    }

    /// Read a NUL-terminated byte string, consuming the terminator.
    /// The terminator must appear before the logical end.
    pub fn read_cstr(&mut self) -> Result<&'a [u8]> {
        let tail = self.remainder();
        match tail.iter().position(|&b| b == 0) {
            Some(end) => {
                let out = &tail[..end];
                self.pos += end + 1;
                Ok(out)
            }
            None => Err(self.out_of_bounds(tail.len() + 1)),
        }
    }
}

/// Initial capacity for an empty [`GrowStream`].
const GROW_INITIAL: usize = 64;

/// An owned, growable write cursor.
///
/// The backing buffer doubles whenever a write would exceed capacity;
/// offsets issued before a growth step stay valid because only the
/// backing allocation changes, never the logical layout.
#[derive(Debug, Default)]
pub struct GrowStream {
    buf: Vec<u8>,
    pos: usize,
    /// High-water mark: logical length of the written output.
    end: usize,
}

impl GrowStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
            pos: 0,
            end: 0,
        }
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Logical length of the output written so far.
    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    pub fn skip(&mut self, n: usize) {
        self.ensure(n);
        self.pos += n;
        self.end = self.end.max(self.pos);
    }

    pub fn align(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let rem = self.pos % n;
        if rem != 0 {
            self.skip(n - rem);
        }
    }

    fn ensure(&mut self, n: usize) {
        let need = self.pos + n;
        if need > self.buf.len() {
            let mut cap = self.buf.len().max(GROW_INITIAL);
            while cap < need {
                cap *= 2;
            }
            self.buf.resize(cap, 0);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self.end = self.end.max(self.pos);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub fn write_u16_le(&mut self, v: u16) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_u16_be(&mut self, v: u16) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_u32_le(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_u32_be(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_u64_le(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_u64_be(&mut self, v: u64) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_f32_le(&mut self, v: f32) {
        self.write_u32_le(v.to_bits());
    }

    pub fn write_f64_le(&mut self, v: f64) {
        self.write_u64_le(v.to_bits());
    }

    /// Finish writing and return the logical output bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buf.truncate(self.end);
        self.buf
    }

    /// The written output so far, without consuming the stream.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.end]
    }
}
