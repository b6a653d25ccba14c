//! Spine - Pipeline
//!
//! The bounded queues between pipeline stages, live-topic derivation, and
//! the distributor task that fans normalized frames out to the publisher
//! and the recorder queue.
//!
//! ```text
//! feed -> raw queue -> normalizer pool -> fan-out queue
//!             -> distributor -> { publisher.publish(topic, frame),
//!                                 recorder queue (try_send, drop+count) }
//! ```
//!
//! The live path never blocks on the recorder: when the recorder queue is
//! full the frame has already been published and the copy meant for disk
//! is dropped and counted.

mod distributor;

pub use distributor::{Distributor, DistributorConfig};

use crossfire::{AsyncRx, MAsyncRx, MAsyncTx};
use spine_feed::RawEvent;
use spine_protocol::Frame;
use spine_registry::SymbolRegistry;

/// Default capacity for each pipeline queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

/// Raw events: many producers (feeds), many consumers (normalizer workers)
pub fn raw_queue(capacity: usize) -> (MAsyncTx<RawEvent>, MAsyncRx<RawEvent>) {
    crossfire::mpmc::bounded_async(capacity)
}

/// Normalized frames: many producers (workers), one consumer (distributor)
pub fn fanout_queue(capacity: usize) -> (MAsyncTx<Frame>, AsyncRx<Frame>) {
    crossfire::mpsc::bounded_async(capacity)
}

/// Recorder input: one producer (distributor), one consumer (recorder)
pub fn recorder_queue(capacity: usize) -> (MAsyncTx<Frame>, AsyncRx<Frame>) {
    crossfire::mpsc::bounded_async(capacity)
}

/// Derive the live topic `<msgtype>.<symbol>` for a frame
///
/// Symbols missing from the registry render as `UNKNOWN`; subscribers can
/// still see (and alert on) traffic for ids they cannot resolve.
pub fn derive_topic(frame: &Frame, registry: &SymbolRegistry) -> String {
    let tag = frame.message_type().topic_tag();
    match frame.symbol_id().and_then(|id| registry.by_id(id)) {
        Some(symbol) => format!("{tag}.{symbol}"),
        None => format!("{tag}.UNKNOWN"),
    }
}
