//! Composition root
//!
//! Ownership is strictly directed: `Core` owns every component, components
//! receive capability handles (publisher sink, recorder queue, registry,
//! metrics collector) and never a handle back to their caller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use spine_config::Config;
use spine_feed::{FeedHandle, FeedSource, MockFeed, MockFeedConfig, RateControl};
use spine_metrics::MetricsCollector;
use spine_normalize::{Normalizer, NormalizerConfig};
use spine_pipeline::{
    fanout_queue, raw_queue, recorder_queue, Distributor, DistributorConfig,
    DEFAULT_QUEUE_CAPACITY,
};
use spine_publisher::{PublishSink, Publisher, PublisherConfig, PublisherServer, ServerHandle};
use spine_recorder::{Recorder, RecorderConfig};
use spine_registry::SymbolRegistry;
use spine_replay::{Replayer, SessionInfo};

/// The assembled pipeline
pub struct Core {
    metrics: Arc<MetricsCollector>,
    registry: Arc<SymbolRegistry>,
    publisher: Publisher,
    server: ServerHandle,
    normalizer: Normalizer,
    distributor: Distributor,
    recorder: Recorder,
    replayer: Arc<Replayer>,
    feeds: Vec<FeedHandle>,
    feed_rates: Option<Arc<RateControl>>,
}

impl Core {
    /// Construct and start every component in dependency order
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricsCollector::with_buckets(
            &config.metrics.histogram_buckets_ns,
        ));
        let registry = Arc::new(SymbolRegistry::new());
        for symbol in &config.feeds.default_symbols {
            registry.get_or_add(symbol);
        }

        let (raw_tx, raw_rx) = raw_queue(DEFAULT_QUEUE_CAPACITY);
        let (fan_tx, fan_rx) = fanout_queue(DEFAULT_QUEUE_CAPACITY);
        let (rec_tx, rec_rx) = recorder_queue(DEFAULT_QUEUE_CAPACITY);

        let normalizer = Normalizer::spawn(
            NormalizerConfig {
                workers: config.pipeline.normalizer_threads,
            },
            raw_rx,
            fan_tx,
            Arc::clone(&registry),
            &metrics,
        );

        let server = PublisherServer::bind(
            PublisherConfig {
                address: "0.0.0.0".into(),
                port: config.network.pubsub_port,
                auth_token: config.security.token.clone(),
                client_queue_capacity: 10_000,
                heartbeat_interval: Duration::from_secs(1),
            },
            &metrics,
        )
        .await
        .context("publisher failed to bind")?;
        let publisher = server.handle();
        let server = server.spawn();

        let recorder = Recorder::spawn(
            RecorderConfig {
                dir: PathBuf::from(&config.storage.dir),
                roll_bytes: config.storage.roll_bytes,
                index_interval: config.storage.index_interval,
                fsync_interval: Duration::from_millis(config.pipeline.recorder_fsync_ms),
            },
            rec_rx,
            Arc::clone(&registry),
            &metrics,
        )
        .context("recorder failed to start")?;

        let distributor = Distributor::spawn(
            DistributorConfig::default(),
            fan_rx,
            Arc::new(publisher.clone()) as Arc<dyn PublishSink>,
            rec_tx,
            Arc::clone(&registry),
            &metrics,
        );

        let replayer = Arc::new(Replayer::new(
            config.storage.dir.clone(),
            Arc::new(publisher.clone()) as Arc<dyn PublishSink>,
            Arc::clone(&registry),
            &metrics,
        ));

        let mut feeds = Vec::new();
        let mut feed_rates = None;
        if config.feeds.mock_enabled {
            let feed = MockFeed::new(
                MockFeedConfig {
                    symbols: config.feeds.default_symbols.clone(),
                    ..Default::default()
                },
                raw_tx.clone(),
                &metrics,
            );
            feed_rates = Some(feed.rate_control());
            feeds.push(Box::new(feed).start());
        }
        if config.feeds.binance_enabled {
            // The exchange adapter lives outside the core; it would plug in
            // through the same FeedSource contract as the mock
            tracing::warn!("binance feed requested but no adapter is wired into this build");
        }

        tracing::info!(
            pubsub_port = config.network.pubsub_port,
            storage = %config.storage.dir,
            feeds = feeds.len(),
            "core started"
        );

        Ok(Self {
            metrics,
            registry,
            publisher,
            server,
            normalizer,
            distributor,
            recorder,
            replayer,
            feeds,
            feed_rates,
        })
    }

    /// Stop everything in reverse dependency order, draining each stage
    pub async fn stop(self) {
        for feed in self.feeds {
            feed.stop().await;
        }
        self.normalizer.stop().await;
        self.distributor.stop().await;
        self.recorder.stop().await;
        self.replayer.shutdown().await;
        self.server.stop().await;
        tracing::info!("core stopped");
    }

    // --- Control-surface interface -------------------------------------
    //
    // The out-of-process control server (HTTP/WS) invokes exactly these.

    /// Registered symbols, id order
    pub fn symbols(&self) -> Vec<(u32, String)> {
        self.registry.snapshot()
    }

    /// Remote addresses of connected subscribers
    pub fn active_clients(&self) -> Vec<String> {
        self.publisher.active_clients()
    }

    /// Prometheus text exposition
    pub fn metrics_prometheus(&self) -> String {
        self.metrics.render_prometheus()
    }

    /// JSON metrics document
    pub fn metrics_json(&self) -> String {
        self.metrics.render_json()
    }

    /// Adjust mock feed rates (no-op when the mock is disabled)
    pub fn set_feed_rates(&self, l1_per_sec: u32, l2_per_sec: u32, trades_per_sec: u32) {
        if let Some(rates) = &self.feed_rates {
            rates.set(l1_per_sec, l2_per_sec, trades_per_sec);
        }
    }

    /// Start a replay session
    pub fn replay_start(
        &self,
        from_ts_ns: u64,
        to_ts_ns: u64,
        topics: &[String],
        rate: f64,
    ) -> Result<String, spine_replay::ReplayError> {
        self.replayer.start(from_ts_ns, to_ts_ns, topics, rate)
    }

    pub fn replay_pause(&self, id: &str) -> Result<(), spine_replay::ReplayError> {
        self.replayer.pause(id)
    }

    pub fn replay_resume(&self, id: &str) -> Result<(), spine_replay::ReplayError> {
        self.replayer.resume(id)
    }

    pub fn replay_seek(&self, id: &str, ts_ns: u64) -> Result<(), spine_replay::ReplayError> {
        self.replayer.seek(id, ts_ns)
    }

    pub async fn replay_stop(&self, id: &str) -> Result<(), spine_replay::ReplayError> {
        self.replayer.stop(id).await
    }

    pub fn replay_sessions(&self) -> Vec<SessionInfo> {
        self.replayer.info()
    }
}

#[cfg(test)]
#[path = "core_test.rs"]
mod tests;
