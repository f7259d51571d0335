//! Declarative layout descriptors.
//!
//! A [`Desc`] describes the on-disk shape of one field: a fixed-width
//! integer, a string in some encoding, an array whose length is itself
//! read from the stream, a nested record, and so on. Descriptors are
//! immutable and stateless; all configuration is captured at
//! construction and decoding is a pure function of the stream cursor.
//!
//! Every descriptor honors a symmetric contract: `get` reads a
//! [`Value`] from a [`Stream`], `put` writes one back to a
//! [`GrowStream`], and `put(get(s))` reproduces the consumed bytes
//! exactly for every valid input.

use crate::stream::{GrowStream, Stream};
use crate::{Error, Result};

/// Byte order of a multi-byte field. Endianness belongs to the
/// descriptor, never to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Integer field width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W8,
    W16,
    W24,
    W32,
    W64,
}

impl IntWidth {
    pub const fn bytes(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W24 => 3,
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }
}

/// Text encoding of a string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
}

impl Encoding {
    /// Bytes per encoding unit. Length-prefixed strings count units,
    /// not bytes, so UTF-16 lengths scale by 2.
    pub const fn unit(self) -> usize {
        match self {
            Self::Utf8 => 1,
            Self::Utf16Le => 2,
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidEncoding),
            Self::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(Error::InvalidEncoding);
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| Error::InvalidEncoding)
            }
        }
    }

    pub fn encode(self, s: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => s.as_bytes().to_vec(),
            Self::Utf16Le => s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(),
        }
    }
}

/// A byte-range leaf. Carries its absolute offset so presentation
/// layers can address the underlying bytes without going back through
/// the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Absolute offset of the first byte in the containing file.
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A decoded value: the output of [`Desc::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Produced by skip/align markers, which consume bytes but carry
    /// no data.
    Null,
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Blob),
    Array(Vec<Value>),
    /// Named fields in on-disk order.
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Look up a record field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn record_fields(&self) -> Option<&[(String, Value)]> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }
}

/// A composable layout descriptor. See the module docs for the
/// `get`/`put` contract.
#[derive(Debug, Clone)]
pub enum Desc {
    /// Unsigned integer of the given width and byte order.
    UInt(IntWidth, Endian),
    /// Two's-complement signed integer.
    Int(IntWidth, Endian),
    /// IEEE754 single precision.
    F32(Endian),
    /// IEEE754 double precision.
    F64(Endian),
    /// Exactly `len` bytes decoded with `encoding`; no terminator
    /// handling.
    FixedStr { len: usize, encoding: Encoding },
    /// A length read via the nested integer descriptor, counted in
    /// encoding units, then the string bytes. `nul_terminated` trims
    /// (and on write, appends) one trailing NUL.
    PrefixStr {
        len: Box<Desc>,
        encoding: Encoding,
        nul_terminated: bool,
    },
    /// Bytes until a zero byte; byte-oriented, ASCII-safe only.
    CStr,
    /// Everything left in the stream, decoded as text.
    RemainingStr(Encoding),
    /// Exactly `len` raw bytes.
    Bytes(usize),
    /// Every byte left in the stream.
    RemainingBytes,
    /// `len` elements of the nested descriptor.
    FixedArray { elem: Box<Desc>, len: usize },
    /// An element count read via the nested integer descriptor, then
    /// that many elements.
    PrefixArray { len: Box<Desc>, elem: Box<Desc> },
    /// Elements until the stream is exhausted.
    RemainingArray { elem: Box<Desc> },
    /// Like `RemainingArray`, but each element is assigned a name from
    /// `names` (falling back to `#index`), yielding a record. This is
    /// the shape of the PE data-directory table.
    NamedArray {
        elem: Box<Desc>,
        names: Vec<&'static str>,
    },
    /// Named fields decoded in order; insertion order is on-disk order
    /// for both `get` and `put`.
    Record(Vec<(String, Desc)>),
    /// Consume `n` bytes without producing a value.
    Skip(usize),
    /// Advance to the next multiple of `n` without producing a value.
    Align(usize),
}

impl Desc {
    pub fn u8() -> Self {
        Self::UInt(IntWidth::W8, Endian::Little)
    }

    pub fn u16_le() -> Self {
        Self::UInt(IntWidth::W16, Endian::Little)
    }

    pub fn u16_be() -> Self {
        Self::UInt(IntWidth::W16, Endian::Big)
    }

    pub fn u24_le() -> Self {
        Self::UInt(IntWidth::W24, Endian::Little)
    }

    pub fn u32_le() -> Self {
        Self::UInt(IntWidth::W32, Endian::Little)
    }

    pub fn u32_be() -> Self {
        Self::UInt(IntWidth::W32, Endian::Big)
    }

    pub fn u64_le() -> Self {
        Self::UInt(IntWidth::W64, Endian::Little)
    }

    pub fn i8() -> Self {
        Self::Int(IntWidth::W8, Endian::Little)
    }

    pub fn i16_le() -> Self {
        Self::Int(IntWidth::W16, Endian::Little)
    }

    pub fn i32_le() -> Self {
        Self::Int(IntWidth::W32, Endian::Little)
    }

    pub fn i64_le() -> Self {
        Self::Int(IntWidth::W64, Endian::Little)
    }

    pub fn fixed_str(len: usize, encoding: Encoding) -> Self {
        Self::FixedStr { len, encoding }
    }

    pub fn prefix_str(len: Desc, encoding: Encoding) -> Self {
        Self::PrefixStr {
            len: Box::new(len),
            encoding,
            nul_terminated: false,
        }
    }

    pub fn prefix_str_nul(len: Desc, encoding: Encoding) -> Self {
        Self::PrefixStr {
            len: Box::new(len),
            encoding,
            nul_terminated: true,
        }
    }

    pub fn fixed_array(elem: Desc, len: usize) -> Self {
        Self::FixedArray {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn prefix_array(len: Desc, elem: Desc) -> Self {
        Self::PrefixArray {
            len: Box::new(len),
            elem: Box::new(elem),
        }
    }

    pub fn remaining_array(elem: Desc) -> Self {
        Self::RemainingArray {
            elem: Box::new(elem),
        }
    }

    pub fn named_array(elem: Desc, names: Vec<&'static str>) -> Self {
        Self::NamedArray {
            elem: Box::new(elem),
            names,
        }
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Desc)>,
        S: Into<String>,
    {
        Self::Record(fields.into_iter().map(|(n, d)| (n.into(), d)).collect())
    }

    /// Decode one value at the stream's cursor.
    pub fn get(&self, s: &mut Stream<'_>) -> Result<Value> {
        match self {
            Self::UInt(width, endian) => Ok(Value::UInt(read_uint(s, *width, *endian)?)),
            Self::Int(width, endian) => {
                let raw = read_uint(s, *width, *endian)?;
                Ok(Value::Int(sign_extend(raw, *width)))
            }
            Self::F32(endian) => {
                let raw = read_uint(s, IntWidth::W32, *endian)? as u32;
                Ok(Value::Float(f32::from_bits(raw) as f64))
            }
            Self::F64(endian) => {
                let raw = read_uint(s, IntWidth::W64, *endian)?;
                Ok(Value::Float(f64::from_bits(raw)))
            }
            Self::FixedStr { len, encoding } => {
                let bytes = s.read_bytes(*len)?;
                Ok(Value::Str(encoding.decode(bytes)?))
            }
            Self::PrefixStr {
                len,
                encoding,
                nul_terminated,
            } => {
                let count = len.get(s)?.as_u64().ok_or(Error::ValueMismatch("integer length"))?;
                // Bound the unit count before scaling so a 64-bit
                // prefix cannot overflow the byte length.
                let units = usize::try_from(count).unwrap_or(usize::MAX);
                if units > s.remaining() {
                    return Err(Error::EndOfBuffer {
                        offset: s.position(),
                        needed: units,
                        len: s.position() + s.remaining(),
                    });
                }
                let bytes = s.read_bytes(units * encoding.unit())?;
                let mut text = encoding.decode(bytes)?;
                if *nul_terminated && text.ends_with('\0') {
                    text.pop();
                }
                Ok(Value::Str(text))
            }
            Self::CStr => {
                let bytes = s.read_cstr()?;
                Ok(Value::Str(Encoding::Utf8.decode(bytes)?))
            }
            Self::RemainingStr(encoding) => {
                let bytes = s.take_remainder();
                Ok(Value::Str(encoding.decode(bytes)?))
            }
            Self::Bytes(len) => {
                let offset = s.position();
                let bytes = s.read_bytes(*len)?;
                Ok(Value::Blob(Blob {
                    offset,
                    bytes: bytes.to_vec(),
                }))
            }
            Self::RemainingBytes => {
                let offset = s.position();
                let bytes = s.take_remainder();
                Ok(Value::Blob(Blob {
                    offset,
                    bytes: bytes.to_vec(),
                }))
            }
            Self::FixedArray { elem, len } => {
                let mut out = Vec::with_capacity(*len);
                for _ in 0..*len {
                    out.push(elem.get(s)?);
                }
                Ok(Value::Array(out))
            }
            Self::PrefixArray { len, elem } => {
                let count = len.get(s)?.as_u64().ok_or(Error::ValueMismatch("integer length"))?;
                let mut out = Vec::new();
                for _ in 0..count {
                    out.push(elem.get(s)?);
                }
                Ok(Value::Array(out))
            }
            Self::RemainingArray { elem } => {
                let mut out = Vec::new();
                while s.remaining() > 0 {
                    let before = s.tell();
                    let v = elem.get(s)?;
                    // A zero-width element would loop forever.
                    if s.tell() == before {
                        break;
                    }
                    out.push(v);
                }
                Ok(Value::Array(out))
            }
            Self::NamedArray { elem, names } => {
                let mut out = Vec::new();
                let mut i = 0usize;
                while s.remaining() > 0 {
                    let before = s.tell();
                    let v = elem.get(s)?;
                    if s.tell() == before {
                        break;
                    }
                    let name = names
                        .get(i)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| format!("#{i}"));
                    out.push((name, v));
                    i += 1;
                }
                Ok(Value::Record(out))
            }
            Self::Record(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, desc) in fields {
                    let v = desc.get(s)?;
                    if !matches!(v, Value::Null) {
                        out.push((name.clone(), v));
                    }
                }
                Ok(Value::Record(out))
            }
            Self::Skip(n) => {
                s.skip(*n);
                Ok(Value::Null)
            }
            Self::Align(n) => {
                s.align(*n);
                Ok(Value::Null)
            }
        }
    }

    /// Encode one value at the write cursor. The value's shape must
    /// match the descriptor.
    pub fn put(&self, s: &mut GrowStream, v: &Value) -> Result<()> {
        match self {
            Self::UInt(width, endian) => {
                let raw = v.as_u64().ok_or(Error::ValueMismatch("unsigned integer"))?;
                write_uint(s, raw, *width, *endian);
                Ok(())
            }
            Self::Int(width, endian) => {
                let raw = v.as_i64().ok_or(Error::ValueMismatch("signed integer"))?;
                write_uint(s, raw as u64, *width, *endian);
                Ok(())
            }
            Self::F32(endian) => {
                let f = match v {
                    Value::Float(f) => *f,
                    _ => return Err(Error::ValueMismatch("float")),
                };
                write_uint(s, (f as f32).to_bits() as u64, IntWidth::W32, *endian);
                Ok(())
            }
            Self::F64(endian) => {
                let f = match v {
                    Value::Float(f) => *f,
                    _ => return Err(Error::ValueMismatch("float")),
                };
                write_uint(s, f.to_bits(), IntWidth::W64, *endian);
                Ok(())
            }
            Self::FixedStr { len, encoding } => {
                let text = v.as_str().ok_or(Error::ValueMismatch("string"))?;
                let mut bytes = encoding.encode(text);
                if bytes.len() > *len {
                    return Err(Error::ValueMismatch("string fitting fixed length"));
                }
                bytes.resize(*len, 0);
                s.write_bytes(&bytes);
                Ok(())
            }
            Self::PrefixStr {
                len,
                encoding,
                nul_terminated,
            } => {
                let text = v.as_str().ok_or(Error::ValueMismatch("string"))?;
                let mut owned;
                let text = if *nul_terminated {
                    owned = text.to_string();
                    owned.push('\0');
                    owned.as_str()
                } else {
                    text
                };
                let bytes = encoding.encode(text);
                let units = bytes.len() / encoding.unit();
                len.put(s, &Value::UInt(units as u64))?;
                s.write_bytes(&bytes);
                Ok(())
            }
            Self::CStr => {
                let text = v.as_str().ok_or(Error::ValueMismatch("string"))?;
                s.write_bytes(text.as_bytes());
                s.write_u8(0);
                Ok(())
            }
            Self::RemainingStr(encoding) => {
                let text = v.as_str().ok_or(Error::ValueMismatch("string"))?;
                s.write_bytes(&encoding.encode(text));
                Ok(())
            }
            Self::Bytes(len) => {
                let blob = v.as_blob().ok_or(Error::ValueMismatch("blob"))?;
                if blob.len() != *len {
                    return Err(Error::ValueMismatch("blob of fixed length"));
                }
                s.write_bytes(&blob.bytes);
                Ok(())
            }
            Self::RemainingBytes => {
                let blob = v.as_blob().ok_or(Error::ValueMismatch("blob"))?;
                s.write_bytes(&blob.bytes);
                Ok(())
            }
            Self::FixedArray { elem, len } => {
                let items = v.as_array().ok_or(Error::ValueMismatch("array"))?;
                if items.len() != *len {
                    return Err(Error::ValueMismatch("array of fixed length"));
                }
                for item in items {
                    elem.put(s, item)?;
                }
                Ok(())
            }
            Self::PrefixArray { len, elem } => {
                let items = v.as_array().ok_or(Error::ValueMismatch("array"))?;
                len.put(s, &Value::UInt(items.len() as u64))?;
                for item in items {
                    elem.put(s, item)?;
                }
                Ok(())
            }
            Self::RemainingArray { elem } => {
                let items = v.as_array().ok_or(Error::ValueMismatch("array"))?;
                for item in items {
                    elem.put(s, item)?;
                }
                Ok(())
            }
            Self::NamedArray { elem, .. } => {
                let fields = v.record_fields().ok_or(Error::ValueMismatch("record"))?;
                for (_, item) in fields {
                    elem.put(s, item)?;
                }
                Ok(())
            }
            Self::Record(fields) => {
                for (name, desc) in fields {
                    match desc {
                        // Markers carry no value in the record.
                        Self::Skip(_) | Self::Align(_) => desc.put(s, &Value::Null)?,
                        _ => {
                            let item = v
                                .field(name)
                                .ok_or(Error::ValueMismatch("record with all fields"))?;
                            desc.put(s, item)?;
                        }
                    }
                }
                Ok(())
            }
            Self::Skip(n) => {
                s.skip(*n);
                Ok(())
            }
            Self::Align(n) => {
                s.align(*n);
                Ok(())
            }
        }
    }
}

fn read_uint(s: &mut Stream<'_>, width: IntWidth, endian: Endian) -> Result<u64> {
    let bytes = s.read_bytes(width.bytes())?;
    let mut out = 0u64;
    match endian {
        Endian::Little => {
            for (i, &b) in bytes.iter().enumerate() {
                out |= (b as u64) << (8 * i);
            }
        }
        Endian::Big => {
            for &b in bytes {
                out = (out << 8) | b as u64;
            }
        }
    }
    Ok(out)
}

fn write_uint(s: &mut GrowStream, v: u64, width: IntWidth, endian: Endian) {
    let n = width.bytes();
    let mut bytes = [0u8; 8];
    match endian {
        Endian::Little => {
            for (i, b) in bytes.iter_mut().enumerate().take(n) {
                *b = (v >> (8 * i)) as u8;
            }
        }
        Endian::Big => {
            for (i, b) in bytes.iter_mut().enumerate().take(n) {
                *b = (v >> (8 * (n - 1 - i))) as u8;
            }
        }
    }
    s.write_bytes(&bytes[..n]);
}

fn sign_extend(raw: u64, width: IntWidth) -> i64 {
    let bits = width.bytes() as u32 * 8;
    if bits == 64 {
        return raw as i64;
    }
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}
