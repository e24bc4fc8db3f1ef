//! Packet header, CRC and frame wrap/unwrap.
//!
//! A packet is an 8-byte little-endian header, the payload, and a CRC-32 over header
//! and payload. On the wire the packet is stuffed and wrapped in the start and end
//! markers:
//!
//! ```text
//! AA 55 · stuff(version · type · packet_id · response_id · payload_len · payload · crc) · 55 AA
//! ```
//!
//! [`build`] produces such a frame in one pass. [`parse`] validates a received frame,
//! checking in order: minimum length, protocol version, declared payload length, and
//! CRC.

use crate::consts::{CRC_LEN, END_MARKER, HEADER_LEN, MAX_PAYLOAD_LEN, PROTOCOL_VERSION, START_MARKER};
use crate::crc::{crc32, crc32_digest};
use crate::error::{Error, Result};
use crate::framing::{find_end, find_start, unstuff, StuffWriter};

/// The kind of a packet, stored in the second header byte.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Request from the host
    HostRequest,
    /// Response from the host
    HostResponse,
    /// Error report from the host
    HostError,
    /// Request originated by the node
    SlaveRequest,
    /// Response from the node
    SlaveResponse,
    /// Error report from the node
    SlaveError,
    /// Unrecognised type byte
    Unknown(u8),
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => PacketType::HostRequest,
            0x01 => PacketType::HostResponse,
            0x0F => PacketType::HostError,
            0x10 => PacketType::SlaveRequest,
            0x11 => PacketType::SlaveResponse,
            0x1F => PacketType::SlaveError,
            other => PacketType::Unknown(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        match value {
            PacketType::HostRequest => 0x00,
            PacketType::HostResponse => 0x01,
            PacketType::HostError => 0x0F,
            PacketType::SlaveRequest => 0x10,
            PacketType::SlaveResponse => 0x11,
            PacketType::SlaveError => 0x1F,
            PacketType::Unknown(other) => other,
        }
    }
}

/// Fixed packet header.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Protocol version
    pub version: u8,
    /// Packet kind
    pub packet_type: PacketType,
    /// Sender assigned id
    pub packet_id: u16,
    /// Id of the packet being answered, 0 if none
    pub response_id: u16,
    /// Unstuffed payload length
    pub payload_len: u16,
}

impl PacketHeader {
    /// Creates a header for the current protocol version.
    pub fn new(packet_type: PacketType, packet_id: u16, response_id: u16, payload_len: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_type,
            packet_id,
            response_id,
            payload_len,
        }
    }

    /// Serialises the header.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let id = self.packet_id.to_le_bytes();
        let rid = self.response_id.to_le_bytes();
        let len = self.payload_len.to_le_bytes();
        [
            self.version,
            self.packet_type.into(),
            id[0],
            id[1],
            rid[0],
            rid[1],
            len[0],
            len[1],
        ]
    }

    /// Deserialises a header without validating it.
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        Self {
            version: bytes[0],
            packet_type: bytes[1].into(),
            packet_id: u16::from_le_bytes([bytes[2], bytes[3]]),
            response_id: u16::from_le_bytes([bytes[4], bytes[5]]),
            payload_len: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}

/// A validated packet whose payload borrows the parse scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packet<'a> {
    /// Packet header
    pub header: PacketHeader,
    /// Payload bytes
    pub payload: &'a [u8],
}

/// Builds a complete frame into `out`.
///
/// # Arguments
/// - `PacketType` : The packet kind
/// - `u16` : The packet id
/// - `u16` : The response id (0 if not a response)
/// - `&[u8]` : The payload
/// - `&mut [u8]` : The output buffer
///
/// # Returns
/// - `Ok(usize)`: Length of the frame, markers included
/// - `Err(Error::PayloadTooLarge)`: The payload exceeds [`MAX_PAYLOAD_LEN`]
/// - `Err(Error::BufferTooSmall)`: `out` cannot hold the stuffed frame
pub fn build(
    packet_type: PacketType,
    packet_id: u16,
    response_id: u16,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge {
            size: payload.len(),
        });
    }
    let header = PacketHeader::new(packet_type, packet_id, response_id, payload.len() as u16).to_bytes();

    let mut digest = crc32_digest();
    digest.update(&header);
    digest.update(payload);
    let crc = digest.finalize().to_le_bytes();

    let mut writer = StuffWriter::new(out);
    writer.write_raw(&START_MARKER)?;
    writer.write(&header)?;
    writer.write(payload)?;
    writer.write(&crc)?;
    writer.write_raw(&END_MARKER)?;
    Ok(writer.len())
}

/// Locates the frame in `bytes` and unstuffs its body into `scratch`.
fn unstuff_frame(bytes: &[u8], scratch: &mut [u8]) -> Result<usize> {
    let start = find_start(bytes).ok_or(Error::Incomplete)?;
    let body = &bytes[start..];
    let end = find_end(body)?;
    unstuff(&body[..end], scratch)
}

/// Parses and validates a frame.
///
/// `bytes` must contain a frame including both markers; anything before the start
/// marker or after the end marker is ignored. The packet is unstuffed into
/// `scratch`, which must be at least [`MAX_PACKET_LEN`](crate::consts::MAX_PACKET_LEN)
/// bytes long to accept every valid packet.
///
/// # Returns
/// - `Ok(Packet)`: The header and a payload borrowed from `scratch`
/// - `Err(Error::Incomplete)` / `Err(Error::Corrupt)`: Frame boundaries are invalid
/// - `Err(Error::TooShort)`: Fewer bytes than a header and a CRC
/// - `Err(Error::VersionMismatch)`: Unsupported protocol version
/// - `Err(Error::LengthMismatch)`: Declared payload length disagrees with the frame
/// - `Err(Error::CrcMismatch)`: Checksum failure
pub fn parse<'a>(bytes: &[u8], scratch: &'a mut [u8]) -> Result<Packet<'a>> {
    let len = unstuff_frame(bytes, scratch)?;
    let scratch: &'a [u8] = scratch;
    let packet = &scratch[..len];

    if len < HEADER_LEN + CRC_LEN {
        return Err(Error::TooShort { len });
    }
    let (head, rest) = packet.split_at(HEADER_LEN);
    let header = PacketHeader::from_bytes(head.try_into().map_err(|_| Error::TooShort { len })?);

    if header.version != PROTOCOL_VERSION {
        return Err(Error::VersionMismatch {
            found: header.version,
        });
    }

    let actual = rest.len() - CRC_LEN;
    if header.payload_len as usize != actual {
        return Err(Error::LengthMismatch {
            declared: header.payload_len as usize,
            actual,
        });
    }

    let (covered, stored) = packet.split_at(len - CRC_LEN);
    let found = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let expected = crc32(covered);
    if expected != found {
        return Err(Error::CrcMismatch { expected, found });
    }

    Ok(Packet {
        header,
        payload: &rest[..actual],
    })
}

/// Best-effort extraction of the packet id from a frame that failed [`parse`].
///
/// Only the stuffed bytes that can hold the header are examined, so corruption
/// further into the frame does not prevent recovery.
pub fn recover_packet_id(bytes: &[u8], scratch: &mut [u8]) -> Option<u16> {
    let start = find_start(bytes)?;
    let body = &bytes[start..];
    let body = match find_end(body) {
        Ok(end) => &body[..end],
        Err(_) => body,
    };
    let head = &body[..body.len().min(2 * HEADER_LEN)];
    let len = unstuff(head, scratch).ok()?;
    if len < 4 {
        return None;
    }
    Some(u16::from_le_bytes([scratch[2], scratch[3]]))
}
