use crc::{CRC_32_ISO_HDLC, Crc, Digest};

/// The one CRC used on both ends of the link: CRC-32/ISO-HDLC (zlib, Ethernet).
pub(crate) static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub(crate) fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

pub(crate) fn crc32_digest() -> Digest<'static, u32> {
    CRC32.digest()
}
