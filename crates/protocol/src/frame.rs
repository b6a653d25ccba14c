//! Frame header and body definitions
//!
//! The header layout is fixed at 16 bytes; each body variant has a fixed
//! byte size that `FrameHeader::body_len` must agree with exactly.

/// Magic bytes "MDAF" (little-endian u32) at the start of every frame
pub const FRAME_MAGIC: u32 = 0x4D44_4146;

/// Current wire format version
pub const FRAME_VERSION: u16 = 1;

/// Serialized size of [`FrameHeader`]
pub const FRAME_HEADER_LEN: usize = 16;

/// Message type tags carried in `FrameHeader::msg_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// Top-of-book quote
    L1 = 1,
    /// Per-level depth update
    L2 = 2,
    /// Executed trade
    Trade = 3,
    /// Server keep-alive
    Heartbeat = 4,
    /// Control protocol acknowledgement
    ControlAck = 5,
}

impl MessageType {
    /// Map a raw tag to a message type, if known
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            3 => Some(Self::Trade),
            4 => Some(Self::Heartbeat),
            5 => Some(Self::ControlAck),
            _ => None,
        }
    }

    /// Fixed body size for this message type
    pub fn body_len(self) -> u32 {
        match self {
            Self::L1 => L1Body::LEN,
            Self::L2 => L2Body::LEN,
            Self::Trade => TradeBody::LEN,
            Self::Heartbeat => HeartbeatBody::LEN,
            Self::ControlAck => ControlAckBody::LEN,
        }
    }

    /// Short lowercase name used in topic strings
    pub fn topic_tag(self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::Trade => "trade",
            Self::Heartbeat => "heartbeat",
            Self::ControlAck => "control",
        }
    }
}

/// 16-byte frame header
///
/// `crc32` covers exactly `body_len` body bytes (IEEE polynomial,
/// reflected, init and final XOR 0xFFFFFFFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u16,
    pub msg_type: u16,
    pub body_len: u32,
    pub crc32: u32,
}

/// Book side for L2 updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Side {
    Bid = 0,
    Ask = 1,
}

impl Side {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Bid),
            1 => Some(Self::Ask),
            _ => None,
        }
    }
}

/// Action applied to a book level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BookAction {
    Insert = 0,
    Update = 1,
    Delete = 2,
}

impl BookAction {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Insert),
            1 => Some(Self::Update),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Top-of-book quote body (msg_type 1, 52 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct L1Body {
    pub ts_ns: u64,
    pub symbol_id: u32,
    pub bid_px: i64,
    pub bid_sz: u64,
    pub ask_px: i64,
    pub ask_sz: u64,
    pub seq: u64,
}

impl L1Body {
    pub const LEN: u32 = 52;
}

/// Depth update body (msg_type 2, 40 bytes)
///
/// `size` of zero is valid for deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct L2Body {
    pub ts_ns: u64,
    pub symbol_id: u32,
    pub side: u8,
    pub action: u8,
    pub level: u16,
    pub price: i64,
    pub size: u64,
    pub seq: u64,
}

impl L2Body {
    pub const LEN: u32 = 40;
}

/// Trade body (msg_type 3, 37 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TradeBody {
    pub ts_ns: u64,
    pub symbol_id: u32,
    pub price: i64,
    pub size: u64,
    /// 0 = buy, 1 = sell, 255 = unknown
    pub aggressor: u8,
    pub seq: u64,
}

impl TradeBody {
    pub const LEN: u32 = 37;

    pub const AGGRESSOR_BUY: u8 = 0;
    pub const AGGRESSOR_SELL: u8 = 1;
    pub const AGGRESSOR_UNKNOWN: u8 = 255;
}

/// Heartbeat body (msg_type 4, 8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatBody {
    pub ts_ns: u64,
}

impl HeartbeatBody {
    pub const LEN: u32 = 8;
}

/// Control acknowledgement body (msg_type 5, 8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlAckBody {
    pub code: u32,
    pub reserved: u32,
}

impl ControlAckBody {
    pub const LEN: u32 = 8;

    pub fn new(code: u32) -> Self {
        Self { code, reserved: 0 }
    }
}

/// Typed frame body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBody {
    L1(L1Body),
    L2(L2Body),
    Trade(TradeBody),
    Heartbeat(HeartbeatBody),
    ControlAck(ControlAckBody),
}

impl FrameBody {
    /// Message type tag for this body variant
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::L1(_) => MessageType::L1,
            Self::L2(_) => MessageType::L2,
            Self::Trade(_) => MessageType::Trade,
            Self::Heartbeat(_) => MessageType::Heartbeat,
            Self::ControlAck(_) => MessageType::ControlAck,
        }
    }

    /// Event timestamp, if the variant carries one (control acks do not)
    pub fn ts_ns(&self) -> Option<u64> {
        match self {
            Self::L1(b) => Some(b.ts_ns),
            Self::L2(b) => Some(b.ts_ns),
            Self::Trade(b) => Some(b.ts_ns),
            Self::Heartbeat(b) => Some(b.ts_ns),
            Self::ControlAck(_) => None,
        }
    }

    /// Symbol id for market-data variants
    pub fn symbol_id(&self) -> Option<u32> {
        match self {
            Self::L1(b) => Some(b.symbol_id),
            Self::L2(b) => Some(b.symbol_id),
            Self::Trade(b) => Some(b.symbol_id),
            Self::Heartbeat(_) | Self::ControlAck(_) => None,
        }
    }
}

/// One encoded, CRC-protected record on the wire or on disk
///
/// Frames are small `Copy` values; the pipeline passes them through queues
/// by value and only serializes at the publisher/recorder boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub body: FrameBody,
}

impl Frame {
    pub fn new(body: FrameBody) -> Self {
        Self { body }
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    #[inline]
    pub fn body_len(&self) -> u32 {
        self.body.message_type().body_len()
    }

    #[inline]
    pub fn ts_ns(&self) -> Option<u64> {
        self.body.ts_ns()
    }

    #[inline]
    pub fn symbol_id(&self) -> Option<u32> {
        self.body.symbol_id()
    }
}

impl From<L1Body> for Frame {
    fn from(body: L1Body) -> Self {
        Self::new(FrameBody::L1(body))
    }
}

impl From<L2Body> for Frame {
    fn from(body: L2Body) -> Self {
        Self::new(FrameBody::L2(body))
    }
}

impl From<TradeBody> for Frame {
    fn from(body: TradeBody) -> Self {
        Self::new(FrameBody::Trade(body))
    }
}

impl From<HeartbeatBody> for Frame {
    fn from(body: HeartbeatBody) -> Self {
        Self::new(FrameBody::Heartbeat(body))
    }
}

impl From<ControlAckBody> for Frame {
    fn from(body: ControlAckBody) -> Self {
        Self::new(FrameBody::ControlAck(body))
    }
}
