//! Constants used across the protocol implementation.
//!
//! This module defines the protocol-wide constants used for framing, header
//! layout, buffer sizing, TLV tags and device defaults.
//!
//! ## Key Concepts
//!
//! - **Markers**: Two-byte start and end sequences delimiting a frame on the wire.
//! - **Stuffing**: A `0x00` inserted after every literal marker byte between the markers.
//! - **Headers**: Fixed 8-byte little-endian header followed by the payload and a CRC-32.
//! - **Tags**: Two ASCII bytes naming every TLV field. Single-letter tags are padded with
//!   a trailing space.
//! - **Buffer Sizing**: Derived from the largest payload a single frame may carry.
//!
//! These values should be used wherever framing or buffer logic is implemented to ensure
//! consistent message boundaries on both ends of the link.

use crate::tlv::Tag;

/// Protocol version carried in every packet header.
pub const PROTOCOL_VERSION: u8 = 0x02;

/// First byte of the start marker.
pub const START_MARK_1: u8 = 0xAA;
/// Second byte of the start marker.
pub const START_MARK_2: u8 = 0x55;
/// First byte of the end marker.
pub const END_MARK_1: u8 = 0x55;
/// Second byte of the end marker.
pub const END_MARK_2: u8 = 0xAA;

/// Start of frame marker: `AA 55`.
pub const START_MARKER: [u8; 2] = [START_MARK_1, START_MARK_2];
/// End of frame marker: `55 AA`.
pub const END_MARKER: [u8; 2] = [END_MARK_1, END_MARK_2];
/// Length (in bytes) of either marker.
pub const MARKER_LEN: usize = 2;

/// Byte inserted after every literal marker byte inside a frame.
pub const STUFF_BYTE: u8 = 0x00;

/// Length (in bytes) of the fixed packet header.
///
/// `version(1) · type(1) · packet_id(2) · response_id(2) · payload_length(2)`
pub const HEADER_LEN: usize = 8;

/// Length (in bytes) of the trailing CRC-32.
pub const CRC_LEN: usize = 4;

/// Maximum payload size (in bytes) carried by a single packet.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// Largest unstuffed packet: header, payload and CRC.
pub const MAX_PACKET_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN + CRC_LEN;

/// Largest frame on the wire, assuming every packet byte needs stuffing.
pub const MAX_FRAME_LEN: usize = 2 * MARKER_LEN + 2 * MAX_PACKET_LEN;

/// Size of the interrupt-side reception buffer, markers included.
///
/// Host requests are small; a frame that does not complete within this many bytes
/// is discarded as line noise.
pub const RX_BUFFER_LEN: usize = 1024;

/// First packet id used for packets originated by the node.
pub const SLAVE_PACKET_ID_START: u16 = 0x8000;

/// Capacity of the temperature history ring buffer.
pub const LOG_CAPACITY: usize = 100;

/// Default look-back window (in seconds) of a log query without a start time.
pub const LOG_DEFAULT_WINDOW_SECS: u64 = 24 * 3600;

/// Number of alarm channels. Channel 0 drives the buzzer, channel 1 the indicator LED.
pub const ALARM_CHANNELS: usize = 2;

/// Default lower alarm threshold in degrees Celsius.
pub const ALARM_DEFAULT_LOW: f32 = -40.0;

/// Default upper alarm threshold in degrees Celsius.
pub const ALARM_DEFAULT_HIGH: f32 = 80.0;

/// Duration (in milliseconds) of a buzzer beep triggered by a command or an alarm.
pub const BEEP_DURATION_MS: u32 = 1000;

/// Instruction name.
pub const TAG_INSTRUCTION: Tag = *b"IN";
/// Request or response data.
pub const TAG_DATA: Tag = *b"DA";
/// Response status code.
pub const TAG_STATUS: Tag = *b"ST";
/// Error code of an error packet.
pub const TAG_ERROR_CODE: Tag = *b"EC";
/// Human readable error description of an error packet.
pub const TAG_ERROR_DESC: Tag = *b"ED";
/// Temperature in degrees Celsius. The trailing space is part of the tag.
pub const TAG_TEMPERATURE: Tag = *b"T ";
/// RTC year (0-99).
pub const TAG_YEAR: Tag = *b"YY";
/// RTC month (1-12). Shares its tag with [`TAG_MINUTE`].
pub const TAG_MONTH: Tag = *b"MM";
/// RTC day of month (1-31).
pub const TAG_DAY: Tag = *b"DD";
/// RTC weekday (1-7).
pub const TAG_WEEKDAY: Tag = *b"WK";
/// RTC hour (0-23).
pub const TAG_HOUR: Tag = *b"HH";
/// RTC minute (0-59). Shares its tag with [`TAG_MONTH`].
pub const TAG_MINUTE: Tag = *b"MM";
/// RTC second (0-59).
pub const TAG_SECOND: Tag = *b"SS";
/// List of alarm items.
pub const TAG_ALARM_LIST: Tag = *b"AL";
/// One list item, used by both the alarm and the log lists.
pub const TAG_ITEM: Tag = *b"IT";
/// Alarm channel id.
pub const TAG_ALARM_ID: Tag = *b"ID";
/// Lower alarm threshold.
pub const TAG_ALARM_LOW: Tag = *b"L ";
/// Upper alarm threshold.
pub const TAG_ALARM_HIGH: Tag = *b"H ";
/// List of log items.
pub const TAG_LOG_LIST: Tag = *b"LG";
/// Timestamp of a log item.
pub const TAG_TIMESTAMP: Tag = *b"TS";
/// Start of a log query range.
pub const TAG_TIME_START: Tag = *b"T1";
/// End of a log query range.
pub const TAG_TIME_END: Tag = *b"T2";
/// Maximum number of items returned by a log query.
pub const TAG_MAX_COUNT: Tag = *b"MX";
