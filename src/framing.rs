//! Byte stuffing and frame boundary discovery.
//!
//! A frame on the wire is the start marker `AA 55`, the stuffed packet, and the end
//! marker `55 AA`. Inside the markers every literal `0xAA` or `0x55` is immediately
//! followed by an inserted stuff byte `0x00`, so a marker pair can never appear by
//! accident in the packet body.
//!
//! ## Functions
//!
//! - [`stuff`]: Inserts stuff bytes after marker bytes
//! - [`unstuff`]: Removes them again, rejecting unescaped marker pairs
//! - [`find_start`]: Locates the first start marker
//! - [`find_end`]: Locates the genuine end marker, skipping stuffed pairs
//! - [`StuffWriter`]: Incremental stuffing into a caller supplied buffer
//!
//! ## Limitations
//!
//! - A `0x00` following any byte other than `0xAA`/`0x55` is ordinary data.
//! - A lone marker byte not followed by a stuff byte is passed through by [`unstuff`];
//!   only a full marker pair is treated as corruption.

use crate::consts::{END_MARK_1, END_MARK_2, START_MARK_1, START_MARK_2, START_MARKER, STUFF_BYTE};
use crate::error::{Error, Result};

/// Whether `byte` is one of the reserved marker byte values (`0xAA` or `0x55`).
#[inline]
pub fn is_marker_byte(byte: u8) -> bool {
    byte == START_MARK_1 || byte == START_MARK_2
}

/// Number of bytes `input` occupies once stuffed.
pub fn stuffed_len(input: &[u8]) -> usize {
    input.len() + input.iter().filter(|&&b| is_marker_byte(b)).count()
}

/// Stuffs `input` into `output`.
///
/// # Arguments
/// - `&[u8]` : The raw bytes
/// - `&mut [u8]` : The output buffer
///
/// # Returns
/// The length of the stuffed data, or [`Error::BufferTooSmall`].
pub fn stuff(input: &[u8], output: &mut [u8]) -> Result<usize> {
    let mut writer = StuffWriter::new(output);
    writer.write(input)?;
    Ok(writer.len())
}

/// Reverses [`stuff`].
///
/// A `0x00` immediately following `0xAA` or `0x55` is dropped. An unescaped `AA 55`
/// or `55 AA` pair means a marker leaked into the body and yields [`Error::Corrupt`].
///
/// # Arguments
/// - `&[u8]` : The stuffed bytes found between the markers
/// - `&mut [u8]` : The output buffer
///
/// # Returns
/// The length of the unstuffed data.
pub fn unstuff(input: &[u8], output: &mut [u8]) -> Result<usize> {
    let mut out = 0;
    let mut i = 0;
    while i < input.len() {
        let byte = input[i];
        i += 1;
        if is_marker_byte(byte) {
            match input.get(i) {
                Some(&STUFF_BYTE) => i += 1,
                Some(&next) if is_marker_byte(next) && next != byte => return Err(Error::Corrupt),
                _ => {}
            }
        }
        let slot = output.get_mut(out).ok_or(Error::BufferTooSmall)?;
        *slot = byte;
        out += 1;
    }
    Ok(out)
}

/// Scans for the start marker `AA 55`.
///
/// # Returns
/// The position immediately after the marker, or `None` if the buffer holds none.
pub fn find_start(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| w == START_MARKER)
        .map(|pos| pos + START_MARKER.len())
}

/// Scans a frame body for the end marker `55 AA`.
///
/// `buf` should start right after the start marker. A marker byte followed by the
/// stuff byte advances the scan by two, so an end marker made of stuffed data is
/// never matched and a genuine end marker right after stuffed data is still found.
///
/// # Returns
/// - `Ok(pos)`: Index of the first end marker byte
/// - `Err(Error::Incomplete)`: No end marker yet
/// - `Err(Error::Corrupt)`: An unescaped start marker appeared inside the body
pub fn find_end(buf: &[u8]) -> Result<usize> {
    let mut i = 0;
    while i + 1 < buf.len() {
        match (buf[i], buf[i + 1]) {
            (byte, STUFF_BYTE) if is_marker_byte(byte) => i += 2,
            (END_MARK_1, END_MARK_2) => return Ok(i),
            (START_MARK_1, START_MARK_2) => return Err(Error::Corrupt),
            _ => i += 1,
        }
    }
    Err(Error::Incomplete)
}

/// Writes stuffed bytes into a borrowed buffer as they are produced.
///
/// Used by the packet builder to stuff header, payload and CRC without an
/// intermediate copy.
#[derive(Debug)]
pub struct StuffWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> StuffWriter<'a> {
    /// Creates a writer positioned at the start of `out`.
    pub fn new(out: &'a mut [u8]) -> Self {
        Self { out, pos: 0 }
    }

    /// Writes one byte, followed by a stuff byte if it is a marker byte.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        self.raw(byte)?;
        if is_marker_byte(byte) {
            self.raw(STUFF_BYTE)?;
        }
        Ok(())
    }

    /// Stuffs and writes every byte of `bytes`.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        bytes.iter().try_for_each(|&b| self.push(b))
    }

    /// Writes `bytes` verbatim. Used for the markers.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        bytes.iter().try_for_each(|&b| self.raw(b))
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    fn raw(&mut self, byte: u8) -> Result<()> {
        let slot = self.out.get_mut(self.pos).ok_or(Error::BufferTooSmall)?;
        *slot = byte;
        self.pos += 1;
        Ok(())
    }
}
