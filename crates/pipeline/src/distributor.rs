//! Distributor: fan-out queue -> publisher + recorder queue
//!
//! A single task so the publisher sees frames in fan-out order. The
//! recorder copy is best-effort: a full recorder queue drops and counts,
//! it never backpressures the live path.

use std::sync::Arc;
use std::time::Duration;

use crossfire::{AsyncRx, MAsyncTx, TrySendError};
use spine_metrics::{Counter, MetricsCollector};
use spine_protocol::Frame;
use spine_publisher::PublishSink;
use spine_registry::SymbolRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::derive_topic;

/// Frames drained per batch
const BATCH_SIZE: usize = 100;

/// Idle poll interval
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Distributor configuration
#[derive(Debug, Clone, Default)]
pub struct DistributorConfig {}

/// Running distributor task
pub struct Distributor {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Distributor {
    /// Spawn the distributor
    pub fn spawn(
        _config: DistributorConfig,
        input: AsyncRx<Frame>,
        publisher: Arc<dyn PublishSink>,
        recorder_tx: MAsyncTx<Frame>,
        registry: Arc<SymbolRegistry>,
        metrics: &MetricsCollector,
    ) -> Self {
        let token = CancellationToken::new();
        let task = Task {
            input,
            publisher,
            recorder_tx,
            registry,
            frames: metrics.counter("distributor_frames_total"),
            recorder_drops: metrics.counter("distributor_recorder_drops_total"),
            token: token.clone(),
        };
        let join = tokio::spawn(task.run());
        Self { token, join }
    }

    /// Stop the task after it drains what is already queued
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.join.await;
        tracing::info!("distributor stopped");
    }
}

struct Task {
    input: AsyncRx<Frame>,
    publisher: Arc<dyn PublishSink>,
    recorder_tx: MAsyncTx<Frame>,
    registry: Arc<SymbolRegistry>,
    frames: Arc<Counter>,
    recorder_drops: Arc<Counter>,
    token: CancellationToken,
}

impl Task {
    async fn run(self) {
        tracing::info!("distributor started");
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
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = self.token.cancelled() => {}
                }
                continue;
            }

            for frame in batch.drain(..) {
                let topic = derive_topic(&frame, &self.registry);
                self.publisher.publish(&topic, &frame);

                match self.recorder_tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => self.recorder_drops.inc(),
                    Err(TrySendError::Disconnected(_)) => {}
                }
                self.frames.inc();
            }
        }
    }
}

#[cfg(test)]
#[path = "distributor_test.rs"]
mod tests;
