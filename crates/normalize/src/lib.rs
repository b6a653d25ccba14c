//! Spine - Normalizer
//!
//! A pool of workers draining the raw event queue, converting floating
//! point prices/sizes to 1e8 fixed point, resolving symbols to dense ids,
//! and pushing typed frames onto the fan-out queue.
//!
//! Workers drain in batches of ~100 and sleep ~100 µs when the queue is
//! empty. A bad event is counted and dropped; a worker never stalls the
//! pipeline on one event. Frame ordering across workers is not guaranteed
//! (not even per symbol with more than one worker) — consumers rely on the
//! per-symbol sequence numbers stamped by the source.

use std::sync::Arc;
use std::time::Duration;

use crossfire::{MAsyncRx, MAsyncTx, TrySendError};
use spine_feed::RawEvent;
use spine_metrics::MetricsCollector;
use spine_protocol::{Frame, L1Body, L2Body, TradeBody, PRICE_SCALE, SIZE_SCALE};
use spine_registry::SymbolRegistry;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Events drained per batch
const BATCH_SIZE: usize = 100;

/// Idle poll interval
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Why a raw event was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("empty symbol")]
    EmptySymbol,

    #[error("non-finite {field}")]
    NonFinite { field: &'static str },

    #[error("negative {field}")]
    Negative { field: &'static str },
}

/// Normalizer pool configuration
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub workers: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Running normalizer pool
pub struct Normalizer {
    token: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Normalizer {
    /// Spawn `config.workers` worker tasks
    pub fn spawn(
        config: NormalizerConfig,
        input: MAsyncRx<RawEvent>,
        output: MAsyncTx<Frame>,
        registry: Arc<SymbolRegistry>,
        metrics: &MetricsCollector,
    ) -> Self {
        let token = CancellationToken::new();
        let worker_count = config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let ctx = WorkerContext {
                input: input.clone(),
                output: output.clone(),
                registry: Arc::clone(&registry),
                events: metrics.counter("normalizer_events_total"),
                frames: metrics.counter("normalizer_frames_total"),
                errors: metrics.counter("normalizer_errors_total"),
                output_drops: metrics.counter("normalizer_output_drops_total"),
                latency: metrics.histogram("normalize_event_ns"),
                token: token.clone(),
            };
            workers.push(tokio::spawn(ctx.run(worker_id)));
        }

        tracing::info!(workers = worker_count, "normalizer started");
        Self { token, workers }
    }

    /// Signal all workers and wait for them to finish
    pub async fn stop(self) {
        self.token.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
        tracing::info!("normalizer stopped");
    }
}

struct WorkerContext {
    input: MAsyncRx<RawEvent>,
    output: MAsyncTx<Frame>,
    registry: Arc<SymbolRegistry>,
    events: Arc<spine_metrics::Counter>,
    frames: Arc<spine_metrics::Counter>,
    errors: Arc<spine_metrics::Counter>,
    output_drops: Arc<spine_metrics::Counter>,
    latency: Arc<spine_metrics::Histogram>,
    token: CancellationToken,
}

impl WorkerContext {
    async fn run(self, worker_id: usize) {
        tracing::debug!(worker_id, "normalizer worker starting");

        let mut batch = Vec::with_capacity(BATCH_SIZE);
        loop {
            if self.token.is_cancelled() {
                break;
            }

            batch.clear();
            while batch.len() < BATCH_SIZE {
                match self.input.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(_) => break,
                }
            }

            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = self.token.cancelled() => break,
                }
                continue;
            }

            for event in batch.drain(..) {
                self.events.inc();
                let timer = self.latency.start_timer();

                match normalize_event(&event, &self.registry) {
                    Ok(frame) => {
                        drop(timer);
                        match self.output.try_send(frame) {
                            Ok(()) => self.frames.inc(),
                            Err(TrySendError::Full(_)) => self.output_drops.inc(),
                            Err(TrySendError::Disconnected(_)) => return,
                        }
                    }
                    Err(e) => {
                        drop(timer);
                        self.errors.inc();
                        tracing::warn!(
                            worker_id,
                            symbol = event.symbol(),
                            error = %e,
                            "dropping bad raw event"
                        );
                    }
                }
            }
        }

        tracing::debug!(worker_id, "normalizer worker stopping");
    }
}

/// Convert one raw event into a frame
///
/// Validation rejects events the fixed-point conversion cannot represent
/// honestly; the caller counts and drops them.
pub fn normalize_event(
    event: &RawEvent,
    registry: &SymbolRegistry,
) -> Result<Frame, NormalizeError> {
    if event.symbol().is_empty() {
        return Err(NormalizeError::EmptySymbol);
    }
    let symbol_id = registry.get_or_add(event.symbol());

    match event {
        RawEvent::L1(quote) => Ok(Frame::from(L1Body {
            ts_ns: quote.ts_ns,
            symbol_id,
            bid_px: scale_price(quote.bid_price, "bid_price")?,
            bid_sz: scale_size(quote.bid_size, "bid_size")?,
            ask_px: scale_price(quote.ask_price, "ask_price")?,
            ask_sz: scale_size(quote.ask_size, "ask_size")?,
            seq: quote.seq,
        })),
        RawEvent::L2(depth) => Ok(Frame::from(L2Body {
            ts_ns: depth.ts_ns,
            symbol_id,
            side: depth.side as u8,
            action: depth.action as u8,
            level: depth.level,
            price: scale_price(depth.price, "price")?,
            size: scale_size(depth.size, "size")?,
            seq: depth.seq,
        })),
        RawEvent::Trade(trade) => Ok(Frame::from(TradeBody {
            ts_ns: trade.ts_ns,
            symbol_id,
            price: scale_price(trade.price, "price")?,
            size: scale_size(trade.size, "size")?,
            aggressor: trade.aggressor.to_wire(),
            seq: trade.seq,
        })),
    }
}

/// Price to 1e8 fixed point, nearest integer
fn scale_price(value: f64, field: &'static str) -> Result<i64, NormalizeError> {
    if !value.is_finite() {
        return Err(NormalizeError::NonFinite { field });
    }
    Ok((value * PRICE_SCALE as f64).round() as i64)
}

/// Size to 1e8 fixed point, nearest integer; sizes cannot be negative
fn scale_size(value: f64, field: &'static str) -> Result<u64, NormalizeError> {
    if !value.is_finite() {
        return Err(NormalizeError::NonFinite { field });
    }
    if value < 0.0 {
        return Err(NormalizeError::Negative { field });
    }
    Ok((value * SIZE_SCALE as f64).round() as u64)
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
