//! Spine - Protocol
//!
//! Wire framing for market-data frames and the on-disk segment format.
//!
//! # Overview
//!
//! Every record that crosses a socket or lands on disk is a `Frame`:
//! a 16-byte little-endian header followed by a fixed-size typed body,
//! with a CRC32 over the body bytes carried in the header.
//!
//! ```text
//! [16-byte FrameHeader][body_len bytes of body]
//! ```
//!
//! Prices are signed 64-bit integers scaled by 1e8; sizes are unsigned
//! 64-bit integers scaled by 1e8. All timestamps are nanoseconds since
//! the Unix epoch.
//!
//! # Design Principles
//!
//! - **Deterministic**: encoding a frame always produces the same bytes
//! - **Allocation-free decode**: bodies are `Copy` structs read field by
//!   field; the only allocation is the returned `Frame`
//! - **Explicit corruption taxonomy**: truncated input is distinguishable
//!   from corrupt input (see [`DecodeError::is_need_more`])

mod codec;
mod error;
mod frame;
mod segment;

pub use codec::{decode_frame, decode_header, encode_frame, encoded_len};
pub use error::DecodeError;
pub use frame::{
    BookAction, ControlAckBody, Frame, FrameBody, FrameHeader, HeartbeatBody, L1Body, L2Body,
    MessageType, Side, TradeBody, FRAME_HEADER_LEN, FRAME_MAGIC, FRAME_VERSION,
};
pub use segment::{IndexEntry, SegmentHeader, INDEX_ENTRY_LEN, SEGMENT_HEADER_LEN, SEGMENT_MAGIC};

/// Fixed-point scale applied to prices (1e8)
pub const PRICE_SCALE: i64 = 100_000_000;

/// Fixed-point scale applied to sizes (1e8)
pub const SIZE_SCALE: u64 = 100_000_000;

/// Ack code: request accepted
pub const ACK_OK: u32 = 200;

/// Ack code: malformed or unsupported request
pub const ACK_BAD_REQUEST: u32 = 400;

/// Ack code: missing or failed authentication
pub const ACK_UNAUTHORIZED: u32 = 401;
