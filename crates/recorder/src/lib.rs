//! Spine - Recorder
//!
//! Journals the frame stream into rolled segment files with a sparse time
//! index and bounded-latency durability.
//!
//! # Overview
//!
//! A single worker task bulk-drains the recorder queue and appends frames
//! to the currently open segment. The segment rolls when the next append
//! would exceed the configured byte threshold. A dirty flag plus an
//! `fsync_interval` timer bound how long acknowledged data can sit in OS
//! buffers; `stop()` forces a final flush.
//!
//! All segment state is owned exclusively by the worker task; other tasks
//! interact only through the input queue, the stats handle and the
//! `force_roll` flag.

mod segment_writer;

pub use segment_writer::SegmentWriter;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossfire::AsyncRx;
use spine_metrics::{Counter, MetricsCollector};
use spine_protocol::Frame;
use spine_registry::SymbolRegistry;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Frames drained per batch
const BATCH_SIZE: usize = 100;

/// Idle poll interval
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Header rewrite cadence in frames
const HEADER_REWRITE_INTERVAL: u32 = 1_000;

/// Recorder errors
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to create data directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("segment already exists: {path}")]
    SegmentExists { path: PathBuf },

    #[error("write failed on {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timestamp {ts_ns} is not representable as a date")]
    BadTimestamp { ts_ns: u64 },
}

impl RecorderError {
    fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Segment root directory (created if absent)
    pub dir: PathBuf,
    /// Roll threshold for the data file, header included
    pub roll_bytes: u64,
    /// Frames per sparse-index entry
    pub index_interval: u32,
    /// Maximum time dirty data may stay unflushed
    pub fsync_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            roll_bytes: 2 * 1024 * 1024 * 1024,
            index_interval: 10_000,
            fsync_interval: Duration::from_millis(50),
        }
    }
}

/// Cumulative recorder statistics
#[derive(Debug, Default)]
pub struct RecorderStats {
    pub frames_written: AtomicU64,
    pub bytes_written: AtomicU64,
    pub fsyncs: AtomicU64,
    pub files_rolled: AtomicU64,
    pub write_errors: AtomicU64,
    pub is_recording: AtomicBool,
}

/// Running recorder
pub struct Recorder {
    token: CancellationToken,
    join: JoinHandle<()>,
    stats: Arc<RecorderStats>,
    force_roll: Arc<AtomicBool>,
}

impl Recorder {
    /// Validate the data directory and spawn the worker task
    ///
    /// Failing to create the directory aborts startup; everything after
    /// that recovers locally.
    pub fn spawn(
        config: RecorderConfig,
        input: AsyncRx<Frame>,
        registry: Arc<SymbolRegistry>,
        metrics: &MetricsCollector,
    ) -> Result<Self, RecorderError> {
        std::fs::create_dir_all(&config.dir).map_err(|source| RecorderError::CreateDir {
            path: config.dir.clone(),
            source,
        })?;

        let token = CancellationToken::new();
        let stats = Arc::new(RecorderStats::default());
        let force_roll = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            config,
            input,
            registry,
            stats: Arc::clone(&stats),
            force_roll: Arc::clone(&force_roll),
            frames_counter: metrics.counter("recorder_frames_total"),
            fsyncs_counter: metrics.counter("recorder_fsyncs_total"),
            rolls_counter: metrics.counter("recorder_rolls_total"),
            errors_counter: metrics.counter("recorder_write_errors_total"),
            token: token.clone(),
        };

        stats.is_recording.store(true, Ordering::Relaxed);
        let join = tokio::spawn(worker.run());

        Ok(Self {
            token,
            join,
            stats,
            force_roll,
        })
    }

    /// Stats handle, valid for the recorder's lifetime
    pub fn stats(&self) -> Arc<RecorderStats> {
        Arc::clone(&self.stats)
    }

    /// Make the next append roll to a fresh segment
    pub fn force_roll(&self) {
        self.force_roll.store(true, Ordering::Relaxed);
    }

    /// Stop the worker: drains what is already queued, flushes, closes
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.join.await;
        self.stats.is_recording.store(false, Ordering::Relaxed);
        tracing::info!(
            frames = self.stats.frames_written.load(Ordering::Relaxed),
            bytes = self.stats.bytes_written.load(Ordering::Relaxed),
            rolls = self.stats.files_rolled.load(Ordering::Relaxed),
            "recorder stopped"
        );
    }
}

struct Worker {
    config: RecorderConfig,
    input: AsyncRx<Frame>,
    registry: Arc<SymbolRegistry>,
    stats: Arc<RecorderStats>,
    force_roll: Arc<AtomicBool>,
    frames_counter: Arc<Counter>,
    fsyncs_counter: Arc<Counter>,
    rolls_counter: Arc<Counter>,
    errors_counter: Arc<Counter>,
    token: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        tracing::info!(dir = %self.config.dir.display(), "recorder started");

        let mut writer: Option<SegmentWriter> = None;
        let mut dirty = false;
        let mut last_fsync = Instant::now();
        let mut batch: Vec<Frame> = Vec::with_capacity(BATCH_SIZE);

        loop {
            let cancelled = self.token.is_cancelled();

            batch.clear();
            while batch.len() < BATCH_SIZE {
                match self.input.try_recv() {
                    Ok(frame) => batch.push(frame),
                    Err(_) => break,
                }
            }

            if batch.is_empty() {
                if cancelled {
                    break;
                }
                self.maybe_fsync(&mut writer, &mut dirty, &mut last_fsync);
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = self.token.cancelled() => {}
                }
                continue;
            }

            for frame in batch.drain(..) {
                self.write_one(&frame, &mut writer, &mut dirty);
            }
            self.maybe_fsync(&mut writer, &mut dirty, &mut last_fsync);
        }

        // Final flush and close
        if let Some(mut w) = writer.take() {
            if dirty {
                if let Err(e) = w.sync() {
                    tracing::error!(error = %e, "final sync failed");
                } else {
                    self.fsyncs_counter.inc();
                    self.stats.fsyncs.fetch_add(1, Ordering::Relaxed);
                }
            }
            if let Err(e) = w.finalize(self.registry.len() as u32) {
                tracing::error!(error = %e, "segment finalize failed");
            }
        }
    }

    fn write_one(&mut self, frame: &Frame, writer: &mut Option<SegmentWriter>, dirty: &mut bool) {
        // Control frames never reach the recorder queue; if one does there
        // is no timestamp to file it under
        let Some(ts_ns) = frame.ts_ns() else {
            self.errors_counter.inc();
            self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let additional = SegmentWriter::appended_len(frame);

        let forced = self.force_roll.swap(false, Ordering::Relaxed);
        let needs_roll = match writer.as_ref() {
            None => true,
            Some(w) => forced || w.would_exceed(additional, self.config.roll_bytes),
        };

        if needs_roll {
            if let Some(w) = writer.take() {
                let frames_in_segment = w.frame_count();
                if let Err(e) = w.finalize(self.registry.len() as u32) {
                    tracing::error!(error = %e, "segment finalize failed");
                    self.errors_counter.inc();
                    self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                }
                self.rolls_counter.inc();
                self.stats.files_rolled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(frames = frames_in_segment, "rolled segment");
            }

            match SegmentWriter::create(&self.config.dir, ts_ns) {
                Ok(w) => *writer = Some(w),
                Err(e) => {
                    tracing::error!(error = %e, "cannot open segment, dropping frame");
                    self.errors_counter.inc();
                    self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }

        let Some(w) = writer.as_mut() else { return };

        match w.append(frame, ts_ns, self.config.index_interval) {
            Ok(appended) => {
                *dirty = true;
                self.frames_counter.inc();
                self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_written.fetch_add(appended, Ordering::Relaxed);

                if w.frame_count() % HEADER_REWRITE_INTERVAL == 0 {
                    if let Err(e) = w.update_header(self.registry.len() as u32) {
                        tracing::error!(error = %e, "header rewrite failed");
                    }
                }
            }
            Err(e) => {
                // Leave the segment closed; the next frame attempts a
                // fresh roll
                tracing::error!(error = %e, "frame write failed, closing segment");
                self.errors_counter.inc();
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                *writer = None;
            }
        }
    }

    fn maybe_fsync(
        &self,
        writer: &mut Option<SegmentWriter>,
        dirty: &mut bool,
        last_fsync: &mut Instant,
    ) {
        if !*dirty || last_fsync.elapsed() < self.config.fsync_interval {
            return;
        }
        let Some(w) = writer.as_mut() else {
            *dirty = false;
            return;
        };

        match w.sync() {
            Ok(()) => {
                *dirty = false;
                *last_fsync = Instant::now();
                self.fsyncs_counter.inc();
                self.stats.fsyncs.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(error = %e, "fsync failed, closing segment");
                self.errors_counter.inc();
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                *writer = None;
                *dirty = false;
            }
        }
    }
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod tests;
