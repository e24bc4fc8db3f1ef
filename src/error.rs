//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing, encoding or decoding packets and TLV fields.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No complete frame yet. Not a failure, keep reading.
    #[error("frame incomplete")]
    Incomplete,

    /// An unescaped marker pair was found where the stuffing rules allow none.
    #[error("frame corrupt: unescaped marker inside frame")]
    Corrupt,

    /// The unstuffed frame is shorter than a header and a CRC.
    #[error("frame too short: {len} bytes")]
    TooShort {
        /// Unstuffed length
        len: usize,
    },

    /// Unsupported protocol version.
    #[error("protocol version mismatch: got {found:#x}")]
    VersionMismatch {
        /// Version byte found in the header
        found: u8,
    },

    /// Declared payload length disagrees with the frame.
    #[error("length mismatch: header declares {declared} payload bytes, frame holds {actual}")]
    LengthMismatch {
        /// Payload length from the header
        declared: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// CRC mismatch.
    #[error("crc mismatch: expected {expected:#x}, got {found:#x}")]
    CrcMismatch {
        /// CRC computed over header and payload
        expected: u32,
        /// CRC stored in the frame
        found: u32,
    },

    /// Destination buffer is too small.
    #[error("buffer too small")]
    BufferTooSmall,

    /// Payload exceeds what a single packet may carry.
    #[error("payload too large: {size} bytes")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
    },

    /// The requested TLV tag is not present.
    #[error("tag not found")]
    NotFound,

    /// A TLV record runs past the end of its buffer.
    #[error("tlv record out of bounds")]
    OutOfBounds,

    /// A string field is not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// A raw field is longer than the caller allows.
    #[error("value too large: {len} bytes (max {max})")]
    ValueTooLarge {
        /// Stored length
        len: usize,
        /// Caller supplied maximum
        max: usize,
    },
}

impl Error {
    /// Whether this error means a delineated frame failed validation.
    ///
    /// These are reported to the host as a `Corrupt` error packet.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corrupt
                | Error::TooShort { .. }
                | Error::VersionMismatch { .. }
                | Error::LengthMismatch { .. }
                | Error::CrcMismatch { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;
