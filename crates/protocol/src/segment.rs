//! On-disk segment file format
//!
//! A segment is a `.mdf` data file plus a sibling `.idx` index file. The
//! data file opens with a 32-byte header followed by encoded frames; the
//! index file is a packed array of 16-byte entries, one per
//! `index_interval` frames, the first pointing just past the data header.

use crate::error::DecodeError;

/// Magic bytes "MDFI" (little-endian u32) at the start of every data file
pub const SEGMENT_MAGIC: u32 = 0x4D44_4649;

/// Serialized size of [`SegmentHeader`]
pub const SEGMENT_HEADER_LEN: usize = 32;

/// Serialized size of [`IndexEntry`]
pub const INDEX_ENTRY_LEN: usize = 16;

/// 32-byte segment data-file header
///
/// `end_ts_ns` and `frame_count` are rewritten in place as the segment
/// grows and finalized when it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub magic: u32,
    pub version: u16,
    pub reserved: u16,
    pub start_ts_ns: u64,
    pub end_ts_ns: u64,
    pub symbol_count: u32,
    pub frame_count: u32,
}

impl SegmentHeader {
    /// Header for a freshly opened segment starting at `start_ts_ns`
    pub fn new(start_ts_ns: u64) -> Self {
        Self {
            magic: SEGMENT_MAGIC,
            version: crate::frame::FRAME_VERSION,
            reserved: 0,
            start_ts_ns,
            end_ts_ns: start_ts_ns,
            symbol_count: 0,
            frame_count: 0,
        }
    }

    /// True when `ts_ns` falls within `[start_ts_ns, end_ts_ns]`
    #[inline]
    pub fn contains(&self, ts_ns: u64) -> bool {
        self.start_ts_ns <= ts_ns && ts_ns <= self.end_ts_ns
    }

    /// Serialize to the fixed 32-byte layout
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_LEN] {
        let mut out = [0u8; SEGMENT_HEADER_LEN];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.reserved.to_le_bytes());
        out[8..16].copy_from_slice(&self.start_ts_ns.to_le_bytes());
        out[16..24].copy_from_slice(&self.end_ts_ns.to_le_bytes());
        out[24..28].copy_from_slice(&self.symbol_count.to_le_bytes());
        out[28..32].copy_from_slice(&self.frame_count.to_le_bytes());
        out
    }

    /// Parse and validate a header read from disk
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < SEGMENT_HEADER_LEN {
            return Err(DecodeError::NeedMoreBytes {
                have: data.len(),
                need: SEGMENT_HEADER_LEN,
            });
        }

        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if magic != SEGMENT_MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }

        let version = u16::from_le_bytes(data[4..6].try_into().unwrap());
        if version != crate::frame::FRAME_VERSION {
            return Err(DecodeError::BadVersion(version));
        }

        Ok(Self {
            magic,
            version,
            reserved: u16::from_le_bytes(data[6..8].try_into().unwrap()),
            start_ts_ns: u64::from_le_bytes(data[8..16].try_into().unwrap()),
            end_ts_ns: u64::from_le_bytes(data[16..24].try_into().unwrap()),
            symbol_count: u32::from_le_bytes(data[24..28].try_into().unwrap()),
            frame_count: u32::from_le_bytes(data[28..32].try_into().unwrap()),
        })
    }
}

/// One sparse-index entry: first timestamp at/after a data-file offset
///
/// For entries i < j the invariant `ts[i] <= ts[j] && offset[i] < offset[j]`
/// holds; adjacent equal timestamps are legal and seek code must tolerate
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub first_ts_ns: u64,
    pub file_offset: u64,
}

impl IndexEntry {
    pub fn to_bytes(&self) -> [u8; INDEX_ENTRY_LEN] {
        let mut out = [0u8; INDEX_ENTRY_LEN];
        out[0..8].copy_from_slice(&self.first_ts_ns.to_le_bytes());
        out[8..16].copy_from_slice(&self.file_offset.to_le_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < INDEX_ENTRY_LEN {
            return Err(DecodeError::NeedMoreBytes {
                have: data.len(),
                need: INDEX_ENTRY_LEN,
            });
        }
        Ok(Self {
            first_ts_ns: u64::from_le_bytes(data[0..8].try_into().unwrap()),
            file_offset: u64::from_le_bytes(data[8..16].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut header = SegmentHeader::new(1_000);
        header.end_ts_ns = 2_000;
        header.symbol_count = 3;
        header.frame_count = 42;

        let decoded = SegmentHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = SegmentHeader::new(0).to_bytes();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            SegmentHeader::from_bytes(&bytes),
            Err(DecodeError::BadMagic(_))
        ));
    }

    #[test]
    fn header_short_input_is_need_more() {
        let bytes = SegmentHeader::new(0).to_bytes();
        let err = SegmentHeader::from_bytes(&bytes[..10]).unwrap_err();
        assert!(err.is_need_more());
    }

    #[test]
    fn header_containment_is_inclusive() {
        let mut header = SegmentHeader::new(100);
        header.end_ts_ns = 200;

        assert!(header.contains(100));
        assert!(header.contains(150));
        assert!(header.contains(200));
        assert!(!header.contains(99));
        assert!(!header.contains(201));
    }

    #[test]
    fn index_entry_roundtrip() {
        let entry = IndexEntry {
            first_ts_ns: u64::MAX,
            file_offset: 32,
        };
        let decoded = IndexEntry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(decoded, entry);
    }
}
