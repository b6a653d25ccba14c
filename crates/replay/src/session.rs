//! Per-session state and the playback task
//!
//! Control operations communicate with the playback task through atomics
//! and a pending-seek slot; the task owns the segment cursor and the token
//! bucket exclusively. Sessions remove themselves from the table when
//! playback completes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spine_metrics::{Counter, Gauge};
use spine_publisher::{PublishSink, Subscription};
use spine_registry::SymbolRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pacer::TokenBucket;
use crate::reader::SegmentReader;

/// Poll cadence while paused
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Retry cadence while waiting for tokens
const THROTTLE_SLEEP: Duration = Duration::from_micros(100);

/// Symbol fallback when an id is not in the registry
const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Snapshot of one session for `info()`
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: String,
    pub from_ts_ns: u64,
    pub to_ts_ns: u64,
    pub current_ts_ns: u64,
    pub rate: f64,
    pub running: bool,
    pub paused: bool,
    pub frames_sent: u64,
    pub topics: Vec<String>,
}

/// State shared between the control surface and the playback task
pub(crate) struct SessionShared {
    id: String,
    from_ts_ns: u64,
    to_ts_ns: u64,
    rate: f64,
    topics: Vec<String>,
    patterns: Vec<Subscription>,
    running: AtomicBool,
    paused: AtomicBool,
    /// Resume happened while paused; playback must restart the pacer clock
    clock_stale: AtomicBool,
    current_ts_ns: AtomicU64,
    frames_sent: AtomicU64,
    pending_seek: Mutex<Option<u64>>,
}

impl SessionShared {
    pub(crate) fn new(
        id: String,
        from_ts_ns: u64,
        to_ts_ns: u64,
        rate: f64,
        topics: Vec<String>,
        patterns: Vec<Subscription>,
    ) -> Self {
        Self {
            id,
            from_ts_ns,
            to_ts_ns,
            rate,
            topics,
            patterns,
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            clock_stale: AtomicBool::new(false),
            current_ts_ns: AtomicU64::new(from_ts_ns),
            frames_sent: AtomicU64::new(0),
            pending_seek: Mutex::new(None),
        }
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        let was = self.paused.swap(paused, Ordering::Relaxed);
        if was && !paused {
            self.clock_stale.store(true, Ordering::Relaxed);
        }
    }

    pub(crate) fn range(&self) -> (u64, u64) {
        (self.from_ts_ns, self.to_ts_ns)
    }

    pub(crate) fn request_seek(&self, ts_ns: u64) {
        *self.pending_seek.lock() = Some(ts_ns);
    }

    pub(crate) fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            from_ts_ns: self.from_ts_ns,
            to_ts_ns: self.to_ts_ns,
            current_ts_ns: self.current_ts_ns.load(Ordering::Relaxed),
            rate: self.rate,
            running: self.running.load(Ordering::Relaxed),
            paused: self.paused.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            topics: self.topics.clone(),
        }
    }
}

/// A live session in the replayer's table
pub(crate) struct SessionEntry {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) token: CancellationToken,
    pub(crate) join: JoinHandle<()>,
}

/// The playback task for one session
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_playback(
    shared: Arc<SessionShared>,
    mut reader: SegmentReader,
    publisher: Arc<dyn PublishSink>,
    registry: Arc<SymbolRegistry>,
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    frames_counter: Arc<Counter>,
    active_gauge: Arc<Gauge>,
    token: CancellationToken,
) {
    tracing::debug!(session = %shared.id, "playback task started");

    let mut bucket = TokenBucket::new(shared.rate, Instant::now());
    let mut prev_ts: Option<u64> = None;
    // A frame that failed to pay its token cost waits here
    let mut pending: Option<(spine_protocol::Frame, u64)> = None;

    let end_reason = loop {
        if token.is_cancelled() {
            break "stopped";
        }

        if shared.paused.load(Ordering::Relaxed) {
            tokio::select! {
                _ = tokio::time::sleep(PAUSE_POLL) => {}
                _ = token.cancelled() => break "stopped",
            }
            continue;
        }

        if shared.clock_stale.swap(false, Ordering::Relaxed) {
            bucket.reset_clock(Instant::now());
        }

        if let Some(target) = shared.pending_seek.lock().take() {
            match reader.seek_to(target) {
                Ok(_) => {
                    prev_ts = None;
                    pending = None;
                    shared.current_ts_ns.store(target, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!(session = %shared.id, error = %e, "seek failed");
                    break "seek failure";
                }
            }
        }

        let (frame, ts_ns) = match pending.take() {
            Some(held) => held,
            None => match reader.read_next() {
                Some(frame) => match frame.ts_ns() {
                    Some(ts) => (frame, ts),
                    None => continue, // control frame in the log; skip
                },
                None => break "end of data",
            },
        };

        if ts_ns > shared.to_ts_ns {
            break "end of range";
        }

        // Frames recorded before the requested start can precede the seek
        // point (sparse index); skip them without pacing
        if ts_ns < shared.from_ts_ns {
            continue;
        }

        if let Some(prev) = prev_ts {
            let cost = TokenBucket::cost_of_gap(ts_ns.saturating_sub(prev));
            if !bucket.try_consume(cost, Instant::now()) {
                pending = Some((frame, ts_ns));
                tokio::select! {
                    _ = tokio::time::sleep(THROTTLE_SLEEP) => {}
                    _ = token.cancelled() => break "stopped",
                }
                continue;
            }
        }
        prev_ts = Some(ts_ns);
        shared.current_ts_ns.store(ts_ns, Ordering::Relaxed);

        let symbol = frame
            .symbol_id()
            .and_then(|id| registry.by_id(id))
            .unwrap_or_else(|| UNKNOWN_SYMBOL.to_owned());
        let topic = format!(
            "replay.{}.{}.{}",
            shared.id,
            frame.message_type().topic_tag(),
            symbol
        );

        if shared.patterns.iter().any(|p| p.matches(&topic)) {
            publisher.publish(&topic, &frame);
            shared.frames_sent.fetch_add(1, Ordering::Relaxed);
            frames_counter.inc();
        }
    };

    // Teardown: self-destruct unless stop() already removed the entry
    shared.running.store(false, Ordering::Relaxed);
    publisher.unregister_virtual_prefix(&format!("replay.{}", shared.id));
    {
        let mut table = sessions.lock();
        table.remove(&shared.id);
        active_gauge.set(table.len() as f64);
    }

    tracing::info!(
        session = %shared.id,
        reason = end_reason,
        frames = shared.frames_sent.load(Ordering::Relaxed),
        "replay session finished"
    );
}
