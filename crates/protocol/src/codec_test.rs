use bytes::BytesMut;

use super::*;
use crate::frame::{
    ControlAckBody, Frame, HeartbeatBody, L1Body, L2Body, MessageType, TradeBody,
    FRAME_HEADER_LEN, FRAME_MAGIC, FRAME_VERSION,
};

fn sample_l1() -> Frame {
    Frame::from(L1Body {
        ts_ns: 1_000_000_000,
        symbol_id: 1,
        bid_px: 1_000_000_000,
        bid_sz: 100_000_000,
        ask_px: 1_001_000_000,
        ask_sz: 200_000_000,
        seq: 1,
    })
}

fn sample_l2() -> Frame {
    Frame::from(L2Body {
        ts_ns: 42,
        symbol_id: 7,
        side: 1,
        action: 2,
        level: 3,
        price: -12_345,
        size: 0,
        seq: 99,
    })
}

fn sample_trade() -> Frame {
    Frame::from(TradeBody {
        ts_ns: 9_999,
        symbol_id: 2,
        price: 5_000_000_000,
        size: 150_000_000,
        aggressor: TradeBody::AGGRESSOR_SELL,
        seq: 1234,
    })
}

fn encode(frame: &Frame) -> BytesMut {
    let mut buf = BytesMut::new();
    encode_frame(frame, &mut buf);
    buf
}

#[test]
fn roundtrip_all_variants() {
    let frames = [
        sample_l1(),
        sample_l2(),
        sample_trade(),
        Frame::from(HeartbeatBody { ts_ns: 123 }),
        Frame::from(ControlAckBody::new(200)),
    ];

    for frame in frames {
        let buf = encode(&frame);
        assert_eq!(buf.len(), encoded_len(&frame));

        let decoded = decode_frame(&buf).unwrap();
        assert_eq!(decoded, frame);
    }
}

#[test]
fn header_fields_are_correct() {
    let frame = sample_trade();
    let buf = encode(&frame);

    let header = decode_header(&buf).unwrap();
    assert_eq!(header.magic, FRAME_MAGIC);
    assert_eq!(header.version, FRAME_VERSION);
    assert_eq!(header.msg_type, MessageType::Trade as u16);
    assert_eq!(header.body_len, TradeBody::LEN);
    assert_eq!(
        header.crc32,
        crc32fast::hash(&buf[FRAME_HEADER_LEN..])
    );
}

#[test]
fn body_sizes_match_wire_spec() {
    assert_eq!(L1Body::LEN, 52);
    assert_eq!(L2Body::LEN, 40);
    assert_eq!(TradeBody::LEN, 37);
    assert_eq!(HeartbeatBody::LEN, 8);
    assert_eq!(ControlAckBody::LEN, 8);
    assert_eq!(FRAME_HEADER_LEN, 16);
}

#[test]
fn every_body_bit_flip_fails_crc() {
    let frame = sample_l2();
    let buf = encode(&frame);

    for byte in FRAME_HEADER_LEN..buf.len() {
        for bit in 0..8 {
            let mut corrupted = buf.clone();
            corrupted[byte] ^= 1 << bit;

            match decode_frame(&corrupted) {
                Err(DecodeError::CrcMismatch { .. }) => {}
                other => panic!(
                    "flip at byte {byte} bit {bit} should fail CRC, got {other:?}"
                ),
            }
        }
    }
}

#[test]
fn truncated_header_is_need_more() {
    let buf = encode(&sample_l1());

    for len in 0..FRAME_HEADER_LEN {
        let err = decode_frame(&buf[..len]).unwrap_err();
        assert!(err.is_need_more(), "len {len}: {err:?}");
    }
}

#[test]
fn truncated_body_is_need_more() {
    let frame = sample_trade();
    let buf = encode(&frame);

    for len in FRAME_HEADER_LEN..buf.len() {
        let err = decode_frame(&buf[..len]).unwrap_err();
        assert!(err.is_need_more(), "len {len}: {err:?}");
        assert_eq!(
            err,
            DecodeError::NeedMoreBytes {
                have: len,
                need: buf.len(),
            }
        );
    }
}

#[test]
fn bad_magic_is_corrupt() {
    let mut buf = encode(&sample_l1());
    buf[0] = 0x00;

    assert!(matches!(
        decode_frame(&buf),
        Err(DecodeError::BadMagic(_))
    ));
}

#[test]
fn bad_version_is_corrupt() {
    let mut buf = encode(&sample_l1());
    buf[4] = 9;

    assert!(matches!(
        decode_frame(&buf),
        Err(DecodeError::BadVersion(9))
    ));
}

#[test]
fn unknown_msg_type_is_corrupt() {
    let mut buf = encode(&sample_l1());
    buf[6] = 0xEE;
    buf[7] = 0xEE;

    assert!(matches!(
        decode_frame(&buf),
        Err(DecodeError::UnknownMsgType(0xEEEE))
    ));
}

#[test]
fn body_len_mismatch_is_corrupt_not_need_more() {
    let mut buf = encode(&sample_l2());
    // Declare a body one byte longer than the L2 fixed size
    let wrong = L2Body::LEN + 1;
    buf[8..12].copy_from_slice(&wrong.to_le_bytes());

    let err = decode_frame(&buf).unwrap_err();
    assert!(!err.is_need_more());
    assert_eq!(
        err,
        DecodeError::LengthMismatch {
            msg_type: MessageType::L2 as u16,
            declared: wrong,
            expected: L2Body::LEN,
        }
    );
}

#[test]
fn trailing_bytes_are_ignored() {
    let frame = sample_l1();
    let mut buf = encode(&frame);
    buf.extend_from_slice(b"garbage after the frame");

    assert_eq!(decode_frame(&buf).unwrap(), frame);
}

#[test]
fn crc_matches_reference_vector() {
    // IEEE reflected CRC32 of "123456789" is the classic check value
    assert_eq!(crc32fast::hash(b"123456789"), 0xCBF4_3926);
}

#[test]
fn encode_appends_to_existing_buffer() {
    let a = sample_l1();
    let b = sample_trade();

    let mut buf = BytesMut::new();
    encode_frame(&a, &mut buf);
    encode_frame(&b, &mut buf);

    let first = decode_frame(&buf).unwrap();
    assert_eq!(first, a);
    let second = decode_frame(&buf[encoded_len(&a)..]).unwrap();
    assert_eq!(second, b);
}
