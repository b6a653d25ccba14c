//! Spine - Replay
//!
//! Re-emits recorded segments through the publisher at a configurable
//! speed. Each replay session owns a segment cursor and a playback task;
//! frames are paced by their recorded inter-arrival gaps scaled by the
//! session's rate multiplier, published under
//! `replay.<session>.<msgtype>.<symbol>` topics.
//!
//! # Session lifecycle
//!
//! ```text
//! start(from, to, topics, rate) -> id
//!     pause(id) / resume(id) / seek(id, ts)
//! stop(id)            cancels + joins the playback task
//! (completion)        sessions self-destruct at end of data or `to`
//! ```
//!
//! Validation failures (bad range, bad rate, no covering segment, session
//! limit) are reported synchronously from `start`; playback failures end
//! the session gracefully.

mod pacer;
mod reader;
mod session;

pub use pacer::TokenBucket;
pub use reader::{find_segment_containing, SegmentReader};
pub use session::SessionInfo;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use spine_metrics::MetricsCollector;
use spine_publisher::{PublishSink, Subscription};
use spine_registry::SymbolRegistry;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use session::{SessionEntry, SessionShared};

/// Active session ceiling
pub const MAX_CONCURRENT_SESSIONS: usize = 10;

/// Rate multiplier ceiling
pub const MAX_RATE_MULTIPLIER: f64 = 100.0;

/// Replay errors
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("invalid range: from {from} must precede to {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("invalid rate {0}: must be in (0, {MAX_RATE_MULTIPLIER}]")]
    InvalidRate(f64),

    #[error("no topics specified")]
    NoTopics,

    #[error("session limit of {max} reached")]
    SessionLimit { max: usize },

    #[error("no segment covers timestamp {ts_ns}")]
    NoSegment { ts_ns: u64 },

    #[error("unknown session {id}")]
    SessionNotFound { id: String },

    #[error("seek target {ts_ns} outside session range [{from}, {to}]")]
    SeekOutOfRange { ts_ns: u64, from: u64, to: u64 },

    #[error("cannot scan data directory {path}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt segment {path}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: spine_protocol::DecodeError,
    },

    #[error("unusable topic pattern {pattern:?}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ReplayError {
    fn open(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Open {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True for errors the caller caused (as opposed to storage faults)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::InvalidRate(_)
                | Self::NoTopics
                | Self::SessionLimit { .. }
                | Self::NoSegment { .. }
                | Self::SeekOutOfRange { .. }
                | Self::BadPattern { .. }
        )
    }
}

/// Replay session manager
pub struct Replayer {
    data_dir: PathBuf,
    publisher: Arc<dyn PublishSink>,
    registry: Arc<SymbolRegistry>,
    metrics_frames: Arc<spine_metrics::Counter>,
    metrics_sessions: Arc<spine_metrics::Counter>,
    metrics_active: Arc<spine_metrics::Gauge>,
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl Replayer {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        publisher: Arc<dyn PublishSink>,
        registry: Arc<SymbolRegistry>,
        metrics: &MetricsCollector,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            publisher,
            registry,
            metrics_frames: metrics.counter("replayer_frames_sent_total"),
            metrics_sessions: metrics.counter("replayer_sessions_started_total"),
            metrics_active: metrics.gauge("replayer_active_sessions"),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a session and return its opaque id
    pub fn start(
        &self,
        from_ts_ns: u64,
        to_ts_ns: u64,
        topics: &[String],
        rate: f64,
    ) -> Result<String, ReplayError> {
        if from_ts_ns >= to_ts_ns {
            return Err(ReplayError::InvalidRange {
                from: from_ts_ns,
                to: to_ts_ns,
            });
        }
        if !(rate > 0.0 && rate <= MAX_RATE_MULTIPLIER) {
            return Err(ReplayError::InvalidRate(rate));
        }
        if topics.is_empty() {
            return Err(ReplayError::NoTopics);
        }
        if self.sessions.lock().len() >= MAX_CONCURRENT_SESSIONS {
            return Err(ReplayError::SessionLimit {
                max: MAX_CONCURRENT_SESSIONS,
            });
        }

        let mut patterns = Vec::with_capacity(topics.len());
        for topic in topics {
            patterns.push(Subscription::new(topic, false).map_err(|source| {
                ReplayError::BadPattern {
                    pattern: topic.clone(),
                    source,
                }
            })?);
        }

        // True containment discovery, then seek to the requested start
        let segment_path = find_segment_containing(&self.data_dir, from_ts_ns)?;
        let mut reader = SegmentReader::open(&segment_path)?;
        reader.seek_to(from_ts_ns)?;

        let id = generate_session_id();
        let shared = Arc::new(SessionShared::new(
            id.clone(),
            from_ts_ns,
            to_ts_ns,
            rate,
            topics.to_vec(),
            patterns,
        ));

        let prefix = format!("replay.{id}");
        self.publisher.register_virtual_prefix(&prefix);

        let token = CancellationToken::new();
        let join = tokio::spawn(session::run_playback(
            Arc::clone(&shared),
            reader,
            Arc::clone(&self.publisher),
            Arc::clone(&self.registry),
            Arc::clone(&self.sessions),
            Arc::clone(&self.metrics_frames),
            Arc::clone(&self.metrics_active),
            token.clone(),
        ));

        {
            let mut sessions = self.sessions.lock();
            sessions.insert(
                id.clone(),
                SessionEntry {
                    shared,
                    token,
                    join,
                },
            );
            self.metrics_active.set(sessions.len() as f64);
        }
        self.metrics_sessions.inc();

        tracing::info!(
            session = %id,
            from = from_ts_ns,
            to = to_ts_ns,
            rate,
            segment = %segment_path.display(),
            "replay session started"
        );
        Ok(id)
    }

    /// Pause playback between frames
    pub fn pause(&self, id: &str) -> Result<(), ReplayError> {
        let sessions = self.sessions.lock();
        let entry = sessions
            .get(id)
            .ok_or_else(|| ReplayError::SessionNotFound { id: id.to_owned() })?;
        entry.shared.set_paused(true);
        tracing::info!(session = id, "replay session paused");
        Ok(())
    }

    /// Resume playback; the pacing clock restarts so the pause does not
    /// bank tokens
    pub fn resume(&self, id: &str) -> Result<(), ReplayError> {
        let sessions = self.sessions.lock();
        let entry = sessions
            .get(id)
            .ok_or_else(|| ReplayError::SessionNotFound { id: id.to_owned() })?;
        entry.shared.set_paused(false);
        tracing::info!(session = id, "replay session resumed");
        Ok(())
    }

    /// Move the cursor to `ts_ns` within the session's range
    ///
    /// The token bucket is deliberately left alone so pacing stays stable
    /// across seeks.
    pub fn seek(&self, id: &str, ts_ns: u64) -> Result<(), ReplayError> {
        let sessions = self.sessions.lock();
        let entry = sessions
            .get(id)
            .ok_or_else(|| ReplayError::SessionNotFound { id: id.to_owned() })?;

        let (from, to) = entry.shared.range();
        if ts_ns < from || ts_ns > to {
            return Err(ReplayError::SeekOutOfRange { ts_ns, from, to });
        }
        entry.shared.request_seek(ts_ns);
        tracing::info!(session = id, ts_ns, "replay seek requested");
        Ok(())
    }

    /// Cancel the session and join its playback task
    pub async fn stop(&self, id: &str) -> Result<(), ReplayError> {
        let entry = {
            let mut sessions = self.sessions.lock();
            let entry = sessions
                .remove(id)
                .ok_or_else(|| ReplayError::SessionNotFound { id: id.to_owned() })?;
            self.metrics_active.set(sessions.len() as f64);
            entry
        };

        entry.token.cancel();
        let _ = entry.join.await;
        tracing::info!(session = id, "replay session stopped");
        Ok(())
    }

    /// Ids of live sessions
    pub fn list(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Detailed snapshot of live sessions
    pub fn info(&self) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .values()
            .map(|entry| entry.shared.info())
            .collect()
    }

    /// Stop every session (shutdown path)
    pub async fn shutdown(&self) {
        let ids = self.list();
        for id in ids {
            let _ = self.stop(&id).await;
        }
    }
}

fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    format!("rpl_{:08x}", rng.gen::<u32>())
}

#[cfg(test)]
#[path = "replay_test.rs"]
mod tests;
