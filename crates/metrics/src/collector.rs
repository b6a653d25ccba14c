//! Metrics registry and exporters
//!
//! The collector is an explicit value shared by `Arc`; components resolve
//! their counter/gauge/histogram handles once at construction so the name
//! registry lock never sits on the hot path.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;

use crate::histogram::{Histogram, DEFAULT_LATENCY_BUCKETS_NS};
use crate::{Counter, Gauge};

/// Registry of named counters, gauges and histograms
///
/// `BTreeMap` keeps export output deterministically ordered.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
    gauges: RwLock<BTreeMap<String, Arc<Gauge>>>,
    histograms: RwLock<BTreeMap<String, Arc<Histogram>>>,
    histogram_buckets_ns: Vec<u64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_buckets(&DEFAULT_LATENCY_BUCKETS_NS)
    }

    /// Collector whose histograms use the given bucket bounds
    pub fn with_buckets(histogram_buckets_ns: &[u64]) -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
            histograms: RwLock::new(BTreeMap::new()),
            histogram_buckets_ns: histogram_buckets_ns.to_vec(),
        }
    }

    /// Get or register the counter named `name`
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(counter) = self.counters.read().get(name) {
            return Arc::clone(counter);
        }
        Arc::clone(
            self.counters
                .write()
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Counter::new())),
        )
    }

    /// Get or register the gauge named `name`
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        if let Some(gauge) = self.gauges.read().get(name) {
            return Arc::clone(gauge);
        }
        Arc::clone(
            self.gauges
                .write()
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Gauge::new())),
        )
    }

    /// Get or register the histogram named `name`
    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        if let Some(histogram) = self.histograms.read().get(name) {
            return Arc::clone(histogram);
        }
        Arc::clone(
            self.histograms
                .write()
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Histogram::new(&self.histogram_buckets_ns))),
        )
    }

    /// Convenience: bump a counter without keeping the handle
    pub fn increment(&self, name: &str, delta: u64) {
        self.counter(name).add(delta);
    }

    /// Current value of a counter (0 if never registered)
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters.read().get(name).map_or(0, |c| c.get())
    }

    /// Current value of a gauge (0.0 if never registered)
    pub fn gauge_value(&self, name: &str) -> f64 {
        self.gauges.read().get(name).map_or(0.0, |g| g.get())
    }

    /// Prometheus text exposition of every registered metric
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();

        for (name, counter) in self.counters.read().iter() {
            out.push_str(&format!("# TYPE {name} counter\n"));
            out.push_str(&format!("{name} {}\n", counter.get()));
        }

        for (name, gauge) in self.gauges.read().iter() {
            out.push_str(&format!("# TYPE {name} gauge\n"));
            out.push_str(&format!("{name} {}\n", gauge.get()));
        }

        for (name, histogram) in self.histograms.read().iter() {
            let summary = histogram.summary();
            out.push_str(&format!("# TYPE {name} summary\n"));
            out.push_str(&format!("{name}_p50 {}\n", summary.p50));
            out.push_str(&format!("{name}_p95 {}\n", summary.p95));
            out.push_str(&format!("{name}_p99 {}\n", summary.p99));
            out.push_str(&format!("{name}_p999 {}\n", summary.p999));
            out.push_str(&format!("{name}_max {}\n", summary.max));
            out.push_str(&format!("{name}_count {}\n", summary.count));
        }

        out
    }

    /// JSON document with counters, gauges and histogram summaries
    pub fn render_json(&self) -> String {
        let counters: BTreeMap<_, _> = self
            .counters
            .read()
            .iter()
            .map(|(name, counter)| (name.clone(), counter.get()))
            .collect();

        let gauges: BTreeMap<_, _> = self
            .gauges
            .read()
            .iter()
            .map(|(name, gauge)| (name.clone(), gauge.get()))
            .collect();

        let histograms: BTreeMap<_, _> = self
            .histograms
            .read()
            .iter()
            .map(|(name, histogram)| {
                let summary = histogram.summary();
                (
                    name.clone(),
                    json!({
                        "p50": summary.p50,
                        "p95": summary.p95,
                        "p99": summary.p99,
                        "p999": summary.p999,
                        "max": summary.max,
                        "count": summary.count,
                    }),
                )
            })
            .collect();

        json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
        .to_string()
    }
}

#[cfg(test)]
#[path = "collector_test.rs"]
mod tests;
