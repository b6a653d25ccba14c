use std::sync::Arc;

use parking_lot::Mutex;
use spine_metrics::MetricsCollector;
use spine_protocol::{Frame, TradeBody};
use spine_publisher::PublishSink;
use spine_registry::SymbolRegistry;

use super::*;

#[derive(Default)]
struct CollectingSink {
    published: Mutex<Vec<(String, Frame)>>,
}

impl PublishSink for CollectingSink {
    fn publish(&self, topic: &str, frame: &Frame) -> usize {
        self.published.lock().push((topic.to_owned(), *frame));
        1
    }

    fn register_virtual_prefix(&self, _prefix: &str) {}
    fn unregister_virtual_prefix(&self, _prefix: &str) {}
}

fn trade(symbol_id: u32, seq: u64) -> Frame {
    Frame::from(TradeBody {
        ts_ns: seq,
        symbol_id,
        price: 1,
        size: 1,
        aggressor: 0,
        seq,
    })
}

#[tokio::test]
async fn publishes_and_forwards_to_recorder() {
    let metrics = MetricsCollector::new();
    let registry = Arc::new(SymbolRegistry::new());
    let id = registry.get_or_add("BTCUSDT");
    let sink = Arc::new(CollectingSink::default());

    let (fan_tx, fan_rx) = crate::fanout_queue(1_000);
    let (rec_tx, rec_rx) = crate::recorder_queue(1_000);

    let distributor = Distributor::spawn(
        DistributorConfig::default(),
        fan_rx,
        Arc::clone(&sink) as Arc<dyn PublishSink>,
        rec_tx,
        Arc::clone(&registry),
        &metrics,
    );

    for seq in 0..10 {
        fan_tx.try_send(trade(id, seq)).unwrap();
    }
    distributor.stop().await;

    let published = sink.published.lock();
    assert_eq!(published.len(), 10);
    assert!(published
        .iter()
        .all(|(topic, _)| topic == "trade.BTCUSDT"));

    let mut recorded = 0;
    while rec_rx.try_recv().is_ok() {
        recorded += 1;
    }
    assert_eq!(recorded, 10);
    assert_eq!(metrics.counter_value("distributor_frames_total"), 10);
    assert_eq!(metrics.counter_value("distributor_recorder_drops_total"), 0);
}

#[tokio::test]
async fn full_recorder_queue_drops_without_blocking_the_live_path() {
    let metrics = MetricsCollector::new();
    let registry = Arc::new(SymbolRegistry::new());
    let id = registry.get_or_add("BTCUSDT");
    let sink = Arc::new(CollectingSink::default());

    let (fan_tx, fan_rx) = crate::fanout_queue(1_000);
    // Recorder queue holds exactly two frames and nothing drains it
    let (rec_tx, _rec_rx) = crate::recorder_queue(2);

    let distributor = Distributor::spawn(
        DistributorConfig::default(),
        fan_rx,
        Arc::clone(&sink) as Arc<dyn PublishSink>,
        rec_tx,
        registry,
        &metrics,
    );

    for seq in 0..10 {
        fan_tx.try_send(trade(id, seq)).unwrap();
    }
    distributor.stop().await;

    // Every frame reached the publisher even though the recorder lost 8
    assert_eq!(sink.published.lock().len(), 10);
    assert_eq!(metrics.counter_value("distributor_recorder_drops_total"), 8);
}
