//! Tag-length-value payload encoding.
//!
//! Every field in a packet payload is a record of the form
//!
//! ```text
//! tag (2 ASCII bytes) · length (u16 LE) · value (length bytes)
//! ```
//!
//! Records follow each other with no padding. Tags may repeat; a lookup returns the
//! first record with a matching tag and a compatible size. Lists are modelled by
//! nesting: the value of a list record is itself a sequence of records.
//!
//! ## Encoding
//!
//! The free `encode_*` functions write one record at the start of a buffer and
//! return its total length. [`TlvWriter`] keeps a cursor over a buffer and adds
//! support for nested records through [`TlvWriter::begin`] and [`TlvWriter::end`].
//!
//! ## Decoding
//!
//! The `decode_*` functions scan linearly. An absent tag yields [`Error::NotFound`],
//! a record header or value running past the end yields [`Error::OutOfBounds`].
//! Nothing is ever read outside the given slice.

use crate::error::{Error, Result};

/// A two-byte ASCII tag.
pub type Tag = [u8; 2];

/// Size of a record header: tag plus length.
pub const RECORD_HEADER_LEN: usize = 4;

/// Largest value a single record can carry.
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

/// One decoded record borrowing its value from the scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// Record tag
    pub tag: Tag,
    /// Record value
    pub value: &'a [u8],
}

/// Iterator over the records of a buffer, see [`records`].
#[derive(Debug, Clone)]
pub struct Records<'a> {
    rest: &'a [u8],
    failed: bool,
}

/// Iterates over every record in `buf` in order.
///
/// A malformed trailing record yields one `Err(Error::OutOfBounds)` and ends the
/// iteration.
pub fn records(buf: &[u8]) -> Records<'_> {
    Records {
        rest: buf,
        failed: false,
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        let Some((header, body)) = self.rest.split_first_chunk::<RECORD_HEADER_LEN>() else {
            self.failed = true;
            return Some(Err(Error::OutOfBounds));
        };
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;
        if body.len() < len {
            self.failed = true;
            return Some(Err(Error::OutOfBounds));
        }
        let (value, rest) = body.split_at(len);
        self.rest = rest;
        Some(Ok(Record {
            tag: [header[0], header[1]],
            value,
        }))
    }
}

/// Returns the value of the first `tag` record whose length satisfies `fits`.
fn find(buf: &[u8], tag: Tag, fits: impl Fn(usize) -> bool) -> Result<&[u8]> {
    for record in records(buf) {
        let record = record?;
        if record.tag == tag && fits(record.value.len()) {
            return Ok(record.value);
        }
    }
    Err(Error::NotFound)
}

fn find_fixed<const N: usize>(buf: &[u8], tag: Tag) -> Result<[u8; N]> {
    let value = find(buf, tag, |len| len == N)?;
    value.try_into().map_err(|_| Error::OutOfBounds)
}

/// Decodes the first `u8` record tagged `tag`.
pub fn decode_u8(buf: &[u8], tag: Tag) -> Result<u8> {
    find_fixed::<1>(buf, tag).map(|b| b[0])
}

/// Decodes the first `u16` record tagged `tag`.
pub fn decode_u16(buf: &[u8], tag: Tag) -> Result<u16> {
    find_fixed(buf, tag).map(u16::from_le_bytes)
}

/// Decodes the first `u64` record tagged `tag`.
pub fn decode_u64(buf: &[u8], tag: Tag) -> Result<u64> {
    find_fixed(buf, tag).map(u64::from_le_bytes)
}

/// Decodes the first `f32` record tagged `tag`.
pub fn decode_f32(buf: &[u8], tag: Tag) -> Result<f32> {
    find_fixed(buf, tag).map(f32::from_le_bytes)
}

/// Decodes the first string record tagged `tag`.
///
/// The value is borrowed from `buf`; no terminator is expected.
pub fn decode_str(buf: &[u8], tag: Tag) -> Result<&str> {
    let value = decode_raw(buf, tag)?;
    core::str::from_utf8(value).map_err(|_| Error::InvalidUtf8)
}

/// Decodes the first raw record tagged `tag`, of any length.
pub fn decode_raw(buf: &[u8], tag: Tag) -> Result<&[u8]> {
    find(buf, tag, |_| true)
}

/// Like [`decode_raw`] but rejects values longer than `max` bytes.
///
/// # Returns
/// - `Ok(&[u8])`: The value
/// - `Err(Error::ValueTooLarge)`: The stored value is longer than `max`
pub fn decode_raw_bounded(buf: &[u8], tag: Tag, max: usize) -> Result<&[u8]> {
    let value = decode_raw(buf, tag)?;
    if value.len() > max {
        return Err(Error::ValueTooLarge {
            len: value.len(),
            max,
        });
    }
    Ok(value)
}

/// Encodes a raw record at the start of `out`.
///
/// # Arguments
/// - `&mut [u8]` : The output buffer
/// - `Tag` : The record tag
/// - `&[u8]` : The value
///
/// # Returns
/// Total record length, or [`Error::BufferTooSmall`] if `out` cannot hold it.
pub fn encode_raw(out: &mut [u8], tag: Tag, value: &[u8]) -> Result<usize> {
    if value.len() > MAX_VALUE_LEN {
        return Err(Error::ValueTooLarge {
            len: value.len(),
            max: MAX_VALUE_LEN,
        });
    }
    let total = RECORD_HEADER_LEN + value.len();
    let dst = out.get_mut(..total).ok_or(Error::BufferTooSmall)?;
    dst[..2].copy_from_slice(&tag);
    dst[2..4].copy_from_slice(&(value.len() as u16).to_le_bytes());
    dst[4..].copy_from_slice(value);
    Ok(total)
}

/// Encodes a `u8` record.
pub fn encode_u8(out: &mut [u8], tag: Tag, value: u8) -> Result<usize> {
    encode_raw(out, tag, &[value])
}

/// Encodes a `u16` record.
pub fn encode_u16(out: &mut [u8], tag: Tag, value: u16) -> Result<usize> {
    encode_raw(out, tag, &value.to_le_bytes())
}

/// Encodes a `u64` record.
pub fn encode_u64(out: &mut [u8], tag: Tag, value: u64) -> Result<usize> {
    encode_raw(out, tag, &value.to_le_bytes())
}

/// Encodes an `f32` record.
pub fn encode_f32(out: &mut [u8], tag: Tag, value: f32) -> Result<usize> {
    encode_raw(out, tag, &value.to_le_bytes())
}

/// Encodes a string record, without terminator.
pub fn encode_str(out: &mut [u8], tag: Tag, value: &str) -> Result<usize> {
    encode_raw(out, tag, value.as_bytes())
}

/// Position of an open nested record, returned by [`TlvWriter::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Mark(usize);

impl Mark {
    /// Writer position before the nested record's header.
    pub fn position(&self) -> usize {
        self.0
    }
}

/// Location of a reserved `u8` value, returned by [`TlvWriter::reserve_u8`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Slot(usize);

/// Sequential record writer over a borrowed buffer.
#[derive(Debug)]
pub struct TlvWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> TlvWriter<'a> {
    /// Creates a writer positioned at the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The records written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Consumes the writer, returning the number of bytes written.
    pub fn finish(self) -> usize {
        self.pos
    }

    /// Appends a raw record.
    pub fn raw(&mut self, tag: Tag, value: &[u8]) -> Result<()> {
        self.pos += encode_raw(&mut self.buf[self.pos..], tag, value)?;
        Ok(())
    }

    /// Appends a `u8` record.
    pub fn u8(&mut self, tag: Tag, value: u8) -> Result<()> {
        self.raw(tag, &[value])
    }

    /// Appends a `u16` record.
    pub fn u16(&mut self, tag: Tag, value: u16) -> Result<()> {
        self.raw(tag, &value.to_le_bytes())
    }

    /// Appends a `u64` record.
    pub fn u64(&mut self, tag: Tag, value: u64) -> Result<()> {
        self.raw(tag, &value.to_le_bytes())
    }

    /// Appends an `f32` record.
    pub fn f32(&mut self, tag: Tag, value: f32) -> Result<()> {
        self.raw(tag, &value.to_le_bytes())
    }

    /// Appends a string record.
    pub fn str(&mut self, tag: Tag, value: &str) -> Result<()> {
        self.raw(tag, value.as_bytes())
    }

    /// Appends a `u8` record with a placeholder value to be set with [`Self::fill_u8`].
    pub fn reserve_u8(&mut self, tag: Tag) -> Result<Slot> {
        self.u8(tag, 0)?;
        Ok(Slot(self.pos - 1))
    }

    /// Sets the value of a reserved `u8` record.
    pub fn fill_u8(&mut self, slot: Slot, value: u8) {
        if let Some(byte) = self.buf[..self.pos].get_mut(slot.0) {
            *byte = value;
        }
    }

    /// Opens a nested record. Everything written until the matching [`Self::end`]
    /// becomes its value.
    pub fn begin(&mut self, tag: Tag) -> Result<Mark> {
        let mark = Mark(self.pos);
        self.raw(tag, &[])?;
        Ok(mark)
    }

    /// Closes a nested record opened with [`Self::begin`], patching its length.
    pub fn end(&mut self, mark: Mark) -> Result<()> {
        let value_start = mark.0 + RECORD_HEADER_LEN;
        if value_start > self.pos {
            return Err(Error::OutOfBounds);
        }
        let len = self.pos - value_start;
        if len > MAX_VALUE_LEN {
            return Err(Error::ValueTooLarge {
                len,
                max: MAX_VALUE_LEN,
            });
        }
        self.buf[mark.0 + 2..value_start].copy_from_slice(&(len as u16).to_le_bytes());
        Ok(())
    }

    /// Discards everything written after `pos`.
    pub fn truncate(&mut self, pos: usize) {
        self.pos = self.pos.min(pos);
    }
}
