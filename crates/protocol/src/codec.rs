//! Frame encoder/decoder
//!
//! Bodies are packed little-endian, field by field. The encoder writes the
//! body into a stack scratch buffer, computes the CRC32 over exactly
//! `body_len` bytes and prefixes the finished header.

use bytes::{BufMut, BytesMut};

use crate::error::DecodeError;
use crate::frame::{
    ControlAckBody, Frame, FrameBody, FrameHeader, HeartbeatBody, L1Body, L2Body, MessageType,
    TradeBody, FRAME_HEADER_LEN, FRAME_MAGIC, FRAME_VERSION,
};

/// Largest body across all variants (L1)
const MAX_BODY_LEN: usize = L1Body::LEN as usize;

/// Total encoded size of a frame
#[inline]
pub fn encoded_len(frame: &Frame) -> usize {
    FRAME_HEADER_LEN + frame.body_len() as usize
}

/// Encode a frame, appending header + body to `buf`
pub fn encode_frame(frame: &Frame, buf: &mut BytesMut) {
    let mut scratch = [0u8; MAX_BODY_LEN];
    let body_len = write_body(&frame.body, &mut scratch);
    let crc = crc32fast::hash(&scratch[..body_len]);

    buf.reserve(FRAME_HEADER_LEN + body_len);
    buf.put_u32_le(FRAME_MAGIC);
    buf.put_u16_le(FRAME_VERSION);
    buf.put_u16_le(frame.message_type() as u16);
    buf.put_u32_le(body_len as u32);
    buf.put_u32_le(crc);
    buf.put_slice(&scratch[..body_len]);
}

/// Decode and validate the 16-byte header at the start of `data`
///
/// Checks magic, version, message type and declared body length, but not
/// the CRC (the body may not be present yet).
pub fn decode_header(data: &[u8]) -> Result<FrameHeader, DecodeError> {
    if data.len() < FRAME_HEADER_LEN {
        return Err(DecodeError::NeedMoreBytes {
            have: data.len(),
            need: FRAME_HEADER_LEN,
        });
    }

    let header = FrameHeader {
        magic: read_u32(data, 0),
        version: read_u16(data, 4),
        msg_type: read_u16(data, 6),
        body_len: read_u32(data, 8),
        crc32: read_u32(data, 12),
    };

    if header.magic != FRAME_MAGIC {
        return Err(DecodeError::BadMagic(header.magic));
    }
    if header.version != FRAME_VERSION {
        return Err(DecodeError::BadVersion(header.version));
    }

    let msg_type =
        MessageType::from_u16(header.msg_type).ok_or(DecodeError::UnknownMsgType(header.msg_type))?;
    if header.body_len != msg_type.body_len() {
        return Err(DecodeError::LengthMismatch {
            msg_type: header.msg_type,
            declared: header.body_len,
            expected: msg_type.body_len(),
        });
    }

    Ok(header)
}

/// Decode a complete frame from the start of `data`
///
/// Trailing bytes beyond the frame are ignored; callers advance their
/// cursor by [`encoded_len`].
pub fn decode_frame(data: &[u8]) -> Result<Frame, DecodeError> {
    let header = decode_header(data)?;

    let total = FRAME_HEADER_LEN + header.body_len as usize;
    if data.len() < total {
        return Err(DecodeError::NeedMoreBytes {
            have: data.len(),
            need: total,
        });
    }

    let body_bytes = &data[FRAME_HEADER_LEN..total];
    let computed = crc32fast::hash(body_bytes);
    if computed != header.crc32 {
        return Err(DecodeError::CrcMismatch {
            header: header.crc32,
            computed,
        });
    }

    let msg_type = MessageType::from_u16(header.msg_type)
        .ok_or(DecodeError::UnknownMsgType(header.msg_type))?;

    // Safe to index freely below: body_len was validated against the
    // variant's fixed size in decode_header.
    let body = match msg_type {
        MessageType::L1 => FrameBody::L1(L1Body {
            ts_ns: read_u64(body_bytes, 0),
            symbol_id: read_u32(body_bytes, 8),
            bid_px: read_i64(body_bytes, 12),
            bid_sz: read_u64(body_bytes, 20),
            ask_px: read_i64(body_bytes, 28),
            ask_sz: read_u64(body_bytes, 36),
            seq: read_u64(body_bytes, 44),
        }),
        MessageType::L2 => FrameBody::L2(L2Body {
            ts_ns: read_u64(body_bytes, 0),
            symbol_id: read_u32(body_bytes, 8),
            side: body_bytes[12],
            action: body_bytes[13],
            level: read_u16(body_bytes, 14),
            price: read_i64(body_bytes, 16),
            size: read_u64(body_bytes, 24),
            seq: read_u64(body_bytes, 32),
        }),
        MessageType::Trade => FrameBody::Trade(TradeBody {
            ts_ns: read_u64(body_bytes, 0),
            symbol_id: read_u32(body_bytes, 8),
            price: read_i64(body_bytes, 12),
            size: read_u64(body_bytes, 20),
            aggressor: body_bytes[28],
            seq: read_u64(body_bytes, 29),
        }),
        MessageType::Heartbeat => FrameBody::Heartbeat(HeartbeatBody {
            ts_ns: read_u64(body_bytes, 0),
        }),
        MessageType::ControlAck => FrameBody::ControlAck(ControlAckBody {
            code: read_u32(body_bytes, 0),
            reserved: read_u32(body_bytes, 4),
        }),
    };

    Ok(Frame::new(body))
}

fn write_body(body: &FrameBody, out: &mut [u8; MAX_BODY_LEN]) -> usize {
    match body {
        FrameBody::L1(b) => {
            out[0..8].copy_from_slice(&b.ts_ns.to_le_bytes());
            out[8..12].copy_from_slice(&b.symbol_id.to_le_bytes());
            out[12..20].copy_from_slice(&b.bid_px.to_le_bytes());
            out[20..28].copy_from_slice(&b.bid_sz.to_le_bytes());
            out[28..36].copy_from_slice(&b.ask_px.to_le_bytes());
            out[36..44].copy_from_slice(&b.ask_sz.to_le_bytes());
            out[44..52].copy_from_slice(&b.seq.to_le_bytes());
            L1Body::LEN as usize
        }
        FrameBody::L2(b) => {
            out[0..8].copy_from_slice(&b.ts_ns.to_le_bytes());
            out[8..12].copy_from_slice(&b.symbol_id.to_le_bytes());
            out[12] = b.side;
            out[13] = b.action;
            out[14..16].copy_from_slice(&b.level.to_le_bytes());
            out[16..24].copy_from_slice(&b.price.to_le_bytes());
            out[24..32].copy_from_slice(&b.size.to_le_bytes());
            out[32..40].copy_from_slice(&b.seq.to_le_bytes());
            L2Body::LEN as usize
        }
        FrameBody::Trade(b) => {
            out[0..8].copy_from_slice(&b.ts_ns.to_le_bytes());
            out[8..12].copy_from_slice(&b.symbol_id.to_le_bytes());
            out[12..20].copy_from_slice(&b.price.to_le_bytes());
            out[20..28].copy_from_slice(&b.size.to_le_bytes());
            out[28] = b.aggressor;
            out[29..37].copy_from_slice(&b.seq.to_le_bytes());
            TradeBody::LEN as usize
        }
        FrameBody::Heartbeat(b) => {
            out[0..8].copy_from_slice(&b.ts_ns.to_le_bytes());
            HeartbeatBody::LEN as usize
        }
        FrameBody::ControlAck(b) => {
            out[0..4].copy_from_slice(&b.code.to_le_bytes());
            out[4..8].copy_from_slice(&b.reserved.to_le_bytes());
            ControlAckBody::LEN as usize
        }
    }
}

#[inline]
fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(data[at..at + 2].try_into().unwrap())
}

#[inline]
fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(data[at..at + 4].try_into().unwrap())
}

#[inline]
fn read_u64(data: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(data[at..at + 8].try_into().unwrap())
}

#[inline]
fn read_i64(data: &[u8], at: usize) -> i64 {
    i64::from_le_bytes(data[at..at + 8].try_into().unwrap())
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;
