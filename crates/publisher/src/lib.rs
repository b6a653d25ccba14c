//! Spine - Publisher
//!
//! Authenticated TCP pub/sub fan-out for encoded market-data frames.
//!
//! # Protocol
//!
//! Clients send newline-delimited JSON control messages; the server answers
//! with binary `ControlAck` frames and then pushes matching data frames:
//!
//! ```text
//! -> {"op":"auth","token":"devtoken"}\n
//! <- ControlAck(200)
//! -> {"op":"subscribe","topics":["l1.BTCUSDT","trade.*"],"lossless":false}\n
//! <- ControlAck(200)
//! <- Heartbeat / matching frames ...
//! ```
//!
//! # Design
//!
//! - Per-client state machine `UNAUTH -> AUTH -> (subscribed…) -> CLOSED`
//! - `publish` encodes a frame once and enqueues `Bytes` clones onto each
//!   matching client's bounded outbound queue (`try_send`, never blocking)
//! - A dedicated writer task per client drains that queue in bulk, so a
//!   slow socket only ever stalls its own client
//! - Queue overflow drops the frame and counts it: against
//!   `publisher_frames_dropped_backpressure` when the client holds a
//!   lossless subscription, `publisher_frames_dropped_queue_full` otherwise

mod client;
mod control;
mod error;
mod server;
mod subscription;

pub use error::PublisherError;
pub use server::{Publisher, PublisherConfig, PublisherServer, ServerHandle};
pub use subscription::Subscription;

use spine_protocol::Frame;

/// Capability interface handed to frame producers (distributor, replayer)
///
/// Only the publisher implements it in production; tests substitute
/// recording sinks.
pub trait PublishSink: Send + Sync {
    /// Fan a frame out to every authenticated subscriber matching `topic`
    ///
    /// Returns the number of clients the frame was enqueued for.
    fn publish(&self, topic: &str, frame: &Frame) -> usize;

    /// Announce a virtual topic prefix (e.g. `replay.<session>`)
    fn register_virtual_prefix(&self, prefix: &str);

    /// Retract a previously announced prefix
    fn unregister_virtual_prefix(&self, prefix: &str);
}
