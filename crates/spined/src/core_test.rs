use std::time::Duration;

use spine_config::Config;
use tempfile::TempDir;

use super::*;

fn test_config(dir: &TempDir) -> Config {
    Config::from_toml(&format!(
        r#"
[network]
pubsub_port = 0

[storage]
dir = "{}"
roll_bytes = 10000000

[pipeline]
normalizer_threads = 2
publisher_lanes = 2

[feeds]
default_symbols = ["BTCUSDT", "ETHUSDT"]
mock_enabled = true
"#,
        dir.path().display()
    ))
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn core_starts_pipes_data_and_stops() {
    let dir = TempDir::new().unwrap();
    let core = Core::start(test_config(&dir)).await.unwrap();

    // Preloaded symbols are visible through the control surface
    let symbols = core.symbols();
    assert_eq!(symbols[0], (1, "BTCUSDT".to_string()));
    assert_eq!(symbols[1], (2, "ETHUSDT".to_string()));

    // Give the mock feed time to push events through the pipeline
    tokio::time::sleep(Duration::from_millis(300)).await;

    let prometheus = core.metrics_prometheus();
    assert!(prometheus.contains("normalizer_frames_total"));
    assert!(prometheus.contains("recorder_frames_total"));

    let json: serde_json::Value = serde_json::from_str(&core.metrics_json()).unwrap();
    assert!(json["counters"]["feed_events_total"].as_u64().unwrap() > 0);

    // No subscribers yet
    assert!(core.active_clients().is_empty());

    // Replay validation errors surface synchronously through the facade
    assert!(core.replay_start(10, 5, &["*".to_string()], 1.0).is_err());
    assert!(core.replay_sessions().is_empty());

    core.set_feed_rates(0, 0, 0);
    core.stop().await;

    // The recorder left at least one finalized segment behind
    let segments: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "mdf"))
        .collect();
    assert!(!segments.is_empty(), "mock traffic should have been recorded");
}
