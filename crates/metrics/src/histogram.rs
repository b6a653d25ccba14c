//! Atomic-bucket latency histogram
//!
//! A value lands in the smallest bucket whose upper bound it does not
//! exceed; values above the last bound land in the overflow bucket.
//! Percentiles are estimated from cumulative bucket counts, reported as the
//! matching bucket's upper bound (the observed max for the overflow bucket).

use std::sync::atomic::{AtomicU64, Ordering};

/// Default latency bucket upper bounds in nanoseconds (100 µs .. 50 ms)
pub const DEFAULT_LATENCY_BUCKETS_NS: [u64; 7] = [
    100_000, 500_000, 1_000_000, 2_000_000, 5_000_000, 10_000_000, 50_000_000,
];

/// Fixed-bucket histogram safe for concurrent recording
#[derive(Debug)]
pub struct Histogram {
    /// Ascending upper bounds; counts has one extra slot for overflow
    bounds: Vec<u64>,
    counts: Vec<AtomicU64>,
    total: AtomicU64,
    max: AtomicU64,
}

/// Point-in-time percentile summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistogramSummary {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
    pub max: u64,
    pub count: u64,
}

impl Histogram {
    /// Create a histogram with the given ascending bucket bounds
    pub fn new(bounds: &[u64]) -> Self {
        debug_assert!(bounds.windows(2).all(|w| w[0] < w[1]));

        let mut counts = Vec::with_capacity(bounds.len() + 1);
        counts.resize_with(bounds.len() + 1, AtomicU64::default);

        Self {
            bounds: bounds.to_vec(),
            counts,
            total: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record a single observation
    pub fn record(&self, value: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut current_max = self.max.load(Ordering::Relaxed);
        while value > current_max {
            match self.max.compare_exchange_weak(
                current_max,
                value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_max = observed,
            }
        }

        // Smallest bound the value does not exceed; past the end is the
        // overflow slot.
        let idx = self.bounds.partition_point(|&bound| bound < value);
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Number of recorded observations
    pub fn count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Percentile summary estimated from bucket counts
    pub fn summary(&self) -> HistogramSummary {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return HistogramSummary::default();
        }

        let max = self.max.load(Ordering::Relaxed);

        let mut cumulative = Vec::with_capacity(self.counts.len());
        let mut running = 0u64;
        for count in &self.counts {
            running += count.load(Ordering::Relaxed);
            cumulative.push(running);
        }

        let percentile = |p: f64| -> u64 {
            let target = ((total as f64) * p / 100.0).ceil().max(1.0) as u64;
            for (i, &cum) in cumulative.iter().enumerate() {
                if cum >= target {
                    return if i < self.bounds.len() { self.bounds[i] } else { max };
                }
            }
            max
        };

        HistogramSummary {
            p50: percentile(50.0),
            p95: percentile(95.0),
            p99: percentile(99.0),
            p999: percentile(99.9),
            max,
            count: total,
        }
    }

    /// Reset all buckets and the max tracker
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    fn bucket_counts(&self) -> Vec<u64> {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}
