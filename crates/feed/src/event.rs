//! Raw event contract
//!
//! Events carry floating-point prices and sizes exactly as a source
//! delivers them; the normalizer converts to fixed point before anything
//! else touches them. Sequence numbers are per-symbol and strictly
//! increasing within one source.

use spine_protocol::{BookAction, Side, TradeBody};

/// Trade aggressor side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggressor {
    Buy,
    Sell,
    Unknown,
}

impl Aggressor {
    /// Wire encoding used in `TradeBody::aggressor`
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Buy => TradeBody::AGGRESSOR_BUY,
            Self::Sell => TradeBody::AGGRESSOR_SELL,
            Self::Unknown => TradeBody::AGGRESSOR_UNKNOWN,
        }
    }
}

/// Top-of-book quote as produced by a source
#[derive(Debug, Clone, PartialEq)]
pub struct RawL1 {
    pub symbol: String,
    pub ts_ns: u64,
    pub seq: u64,
    pub bid_price: f64,
    pub bid_size: f64,
    pub ask_price: f64,
    pub ask_size: f64,
}

/// Single book-level change as produced by a source
#[derive(Debug, Clone, PartialEq)]
pub struct RawL2 {
    pub symbol: String,
    pub ts_ns: u64,
    pub seq: u64,
    pub side: Side,
    pub action: BookAction,
    pub level: u16,
    pub price: f64,
    pub size: f64,
}

/// Executed trade as produced by a source
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrade {
    pub symbol: String,
    pub ts_ns: u64,
    pub seq: u64,
    pub price: f64,
    pub size: f64,
    pub aggressor: Aggressor,
}

/// Discriminated event record produced by feeds
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    L1(RawL1),
    L2(RawL2),
    Trade(RawTrade),
}

impl RawEvent {
    pub fn symbol(&self) -> &str {
        match self {
            Self::L1(e) => &e.symbol,
            Self::L2(e) => &e.symbol,
            Self::Trade(e) => &e.symbol,
        }
    }

    pub fn ts_ns(&self) -> u64 {
        match self {
            Self::L1(e) => e.ts_ns,
            Self::L2(e) => e.ts_ns,
            Self::Trade(e) => e.ts_ns,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Self::L1(e) => e.seq,
            Self::L2(e) => e.seq,
            Self::Trade(e) => e.seq,
        }
    }
}
