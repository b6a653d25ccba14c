//! Decode error taxonomy
//!
//! Callers must be able to tell "feed me more bytes" apart from "this
//! input is corrupt": a stream reader retries the former and resynchronizes
//! (or gives up) on the latter.

use thiserror::Error;

/// Errors produced when decoding a frame from bytes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ends before the header or declared body is complete
    #[error("need more bytes: have {have}, need {need}")]
    NeedMoreBytes { have: usize, need: usize },

    /// Header magic does not match the wire format
    #[error("bad magic: 0x{0:08X}")]
    BadMagic(u32),

    /// Unsupported wire format version
    #[error("unsupported version: {0}")]
    BadVersion(u16),

    /// Message type tag is not part of the protocol
    #[error("unknown message type: {0}")]
    UnknownMsgType(u16),

    /// Declared body length disagrees with the variant's fixed size
    #[error("body length mismatch for msg_type {msg_type}: declared {declared}, expected {expected}")]
    LengthMismatch {
        msg_type: u16,
        declared: u32,
        expected: u32,
    },

    /// CRC32 of the body does not match the header
    #[error("crc mismatch: header 0x{header:08X}, computed 0x{computed:08X}")]
    CrcMismatch { header: u32, computed: u32 },
}

impl DecodeError {
    /// True when the input was merely truncated, not corrupt
    #[inline]
    pub fn is_need_more(&self) -> bool {
        matches!(self, Self::NeedMoreBytes { .. })
    }
}
