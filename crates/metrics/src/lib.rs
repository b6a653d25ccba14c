//! Spine - Metrics
//!
//! Internal metrics collection and export for observability.
//!
//! # Overview
//!
//! This crate provides:
//! - Atomic `Counter` / `Gauge` handles for hot-path instrumentation
//! - `Histogram` with atomic buckets and percentile summaries
//! - A `MetricsCollector` registry with Prometheus-text and JSON export
//!
//! # Design Principles
//!
//! - **Lock-free hot path**: all updates are atomic operations
//! - **No globals**: the collector is an explicit value handed to every
//!   component at construction; the exporter is the only reader
//! - **Handle pattern**: components resolve `Arc<Counter>` handles once at
//!   startup and never touch the name registry again
//!
//! # Example
//!
//! ```
//! use spine_metrics::MetricsCollector;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(MetricsCollector::new());
//! let frames = metrics.counter("frames_total");
//!
//! frames.inc();
//! frames.add(41);
//! assert_eq!(frames.get(), 42);
//! assert!(metrics.render_prometheus().contains("frames_total 42"));
//! ```

mod collector;
mod histogram;

pub use collector::MetricsCollector;
pub use histogram::{Histogram, HistogramSummary, DEFAULT_LATENCY_BUCKETS_NS};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic counter wrapper for convenient metric operations
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Create a new counter initialized to 0
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increment the counter by `val` (relaxed ordering for performance)
    #[inline]
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Increment the counter by 1
    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    /// Get the current value (relaxed ordering)
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Atomic gauge storing an `f64` as raw bits
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn set(&self, val: f64) {
        self.0.store(val.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// RAII timer recording elapsed nanoseconds into a histogram on drop
///
/// ```
/// use spine_metrics::MetricsCollector;
///
/// let metrics = MetricsCollector::new();
/// let latency = metrics.histogram("normalize_event_ns");
/// {
///     let _timer = latency.start_timer();
///     // measured work
/// }
/// assert_eq!(latency.summary().count, 1);
/// ```
pub struct HistogramTimer<'a> {
    histogram: &'a Histogram,
    start: Instant,
    cancelled: bool,
}

impl<'a> HistogramTimer<'a> {
    fn new(histogram: &'a Histogram) -> Self {
        Self {
            histogram,
            start: Instant::now(),
            cancelled: false,
        }
    }

    /// Discard the measurement
    pub fn cancel(mut self) {
        self.cancelled = true;
    }
}

impl Drop for HistogramTimer<'_> {
    fn drop(&mut self) {
        if !self.cancelled {
            self.histogram.record(self.start.elapsed().as_nanos() as u64);
        }
    }
}

impl Histogram {
    /// Start a timer that records into this histogram when dropped
    pub fn start_timer(&self) -> HistogramTimer<'_> {
        HistogramTimer::new(self)
    }
}
