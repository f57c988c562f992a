//! Entry-record binary layout and header read/write helpers.
//!
//! Every record is written exactly once at an 8-byte-aligned arena offset
//! and never modified afterwards:
//!
//! ```text
//! [klen: u16 LE][vlen: u16 LE][hash: u32 LE][key: klen bytes][value: vlen bytes][pad to 8]
//! ```
//!
//! All integers are little-endian. The full 32-bit hash is stored so that
//! lookup paths can cross-check a candidate without recomputing it.

use byteorder::{ByteOrder, LittleEndian};

/// Fixed header size preceding the key bytes.
pub const HEADER_BYTES: usize = 8;

/// Rounds `n` up to the next 8-byte boundary.
#[inline]
pub fn round_up_8(n: usize) -> usize {
    (n + 7) & !7
}

/// Total padded arena footprint of a record.
#[inline]
pub fn record_size(klen: usize, vlen: usize) -> usize {
    round_up_8(HEADER_BYTES + klen + vlen)
}

/// Decoded view of a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub klen: u16,
    pub vlen: u16,
    pub hash: u32,
}

/// Encodes `hdr` into the first [`HEADER_BYTES`] of `buf`.
pub fn write_header(buf: &mut [u8], hdr: EntryHeader) {
    LittleEndian::write_u16(&mut buf[0..2], hdr.klen);
    LittleEndian::write_u16(&mut buf[2..4], hdr.vlen);
    LittleEndian::write_u32(&mut buf[4..8], hdr.hash);
}

/// Decodes a header from the first [`HEADER_BYTES`] of `buf`.
pub fn read_header(buf: &[u8]) -> EntryHeader {
    EntryHeader {
        klen: LittleEndian::read_u16(&buf[0..2]),
        vlen: LittleEndian::read_u16(&buf[2..4]),
        hash: LittleEndian::read_u32(&buf[4..8]),
    }
}
