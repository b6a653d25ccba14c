//! Spine - Feed
//!
//! The `RawEvent` contract every source must produce, the `FeedSource`
//! adapter trait, and the built-in mock feed used for development and
//! soak testing.
//!
//! Sources enqueue events onto the bounded raw queue with `try_send` and
//! count drops; a slow pipeline never blocks a source.

mod event;
mod mock;

pub use event::{Aggressor, RawEvent, RawL1, RawL2, RawTrade};
pub use mock::{MockFeed, MockFeedConfig, MockFeedStats, RateControl};

use crossfire::MAsyncTx;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Producer side of the raw event queue
pub type RawEventTx = MAsyncTx<RawEvent>;

/// A running feed source, stoppable and joinable
pub struct FeedHandle {
    name: &'static str,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl FeedHandle {
    pub fn new(name: &'static str, token: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { name, token, join }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the source to stop and wait for its task to finish
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!(feed = self.name, error = %e, "feed task ended abnormally");
        }
    }
}

/// Contract implemented by every event source
///
/// External adapters (exchange connections, capture files) implement this
/// and are wired in by the composition root exactly like the mock feed.
pub trait FeedSource: Send + 'static {
    /// Stable name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Start producing events until the returned handle is stopped
    fn start(self: Box<Self>) -> FeedHandle;
}
