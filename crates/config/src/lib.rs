//! Spine - Configuration
//!
//! TOML configuration with per-section defaults. Every field has a sensible
//! default, so an empty (or absent) file yields a working development setup:
//!
//! ```toml
//! [network]
//! pubsub_port = 9100
//!
//! [storage]
//! dir = "./data"
//! roll_bytes = 2147483648
//! index_interval = 10000
//! ```

mod error;

pub use error::ConfigError;

use std::path::Path;

use serde::Deserialize;

/// TCP listen ports
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Publisher (pub/sub) listener port
    pub pubsub_port: u16,
    /// Control-surface HTTP port (served by an external collaborator)
    pub ctrl_http_port: u16,
    /// Metrics WebSocket port (served by an external collaborator)
    pub ws_metrics_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            pubsub_port: 9100,
            ctrl_http_port: 8080,
            ws_metrics_port: 8080,
        }
    }
}

/// Authentication settings for the publisher control protocol
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared secret checked by the publisher `auth` op
    pub token: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token: "devtoken".into(),
        }
    }
}

/// Segment storage settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for segment files
    pub dir: String,
    /// Segment size threshold that triggers a roll
    pub roll_bytes: u64,
    /// Frames per sparse-index entry
    pub index_interval: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: "./data".into(),
            roll_bytes: 2 * 1024 * 1024 * 1024,
            index_interval: 10_000,
        }
    }
}

/// Histogram bucket configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Upper bounds of the latency histogram buckets, ascending
    pub histogram_buckets_ns: Vec<u64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            histogram_buckets_ns: vec![
                100_000, 500_000, 1_000_000, 2_000_000, 5_000_000, 10_000_000,
            ],
        }
    }
}

/// Pipeline sizing knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads for the async runtime serving publisher I/O
    pub publisher_lanes: usize,
    /// Maximum interval the recorder may leave dirty data unflushed (ms)
    pub recorder_fsync_ms: u64,
    /// Normalizer worker count
    pub normalizer_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            publisher_lanes: 8,
            recorder_fsync_ms: 50,
            normalizer_threads: 4,
        }
    }
}

/// Feed construction flags
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    /// Symbols preloaded into the registry and driven by the mock feed
    pub default_symbols: Vec<String>,
    /// Construct the built-in mock feed
    pub mock_enabled: bool,
    /// Construct the Binance adapter (external; not part of the core)
    pub binance_enabled: bool,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            default_symbols: vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()],
            mock_enabled: true,
            binance_enabled: false,
        }
    }
}

/// Logging settings applied by the binary at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "spine_publisher=debug,info"
    pub level: String,
    /// Emit JSON-structured log lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
    pub pipeline: PipelineConfig,
    pub feeds: FeedsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::from)
    }

    /// Load from a file; an absent file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.network.pubsub_port, 9100);
        assert_eq!(config.security.token, "devtoken");
        assert_eq!(config.storage.roll_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.storage.index_interval, 10_000);
        assert_eq!(config.pipeline.normalizer_threads, 4);
        assert_eq!(config.pipeline.recorder_fsync_ms, 50);
        assert!(config.feeds.mock_enabled);
        assert!(!config.feeds.binance_enabled);
        assert_eq!(config.feeds.default_symbols.len(), 3);
    }

    #[test]
    fn parse_empty_document() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.network.pubsub_port, 9100);
    }

    #[test]
    fn parse_partial_document_keeps_defaults() {
        let config = Config::from_toml(
            r#"
[storage]
roll_bytes = 1000000

[security]
token = "s3cret"
"#,
        )
        .unwrap();

        assert_eq!(config.storage.roll_bytes, 1_000_000);
        assert_eq!(config.storage.index_interval, 10_000);
        assert_eq!(config.security.token, "s3cret");
        assert_eq!(config.network.pubsub_port, 9100);
    }

    #[test]
    fn parse_full_document() {
        let config = Config::from_toml(
            r#"
[network]
pubsub_port = 9200
ctrl_http_port = 8090
ws_metrics_port = 8091

[storage]
dir = "/var/lib/spine"
roll_bytes = 536870912
index_interval = 1000

[pipeline]
publisher_lanes = 4
recorder_fsync_ms = 25
normalizer_threads = 2

[feeds]
default_symbols = ["BTCUSDT"]
mock_enabled = false
binance_enabled = true

[logging]
level = "debug"
json = true
"#,
        )
        .unwrap();

        assert_eq!(config.network.pubsub_port, 9200);
        assert_eq!(config.storage.dir, "/var/lib/spine");
        assert_eq!(config.storage.index_interval, 1_000);
        assert_eq!(config.pipeline.publisher_lanes, 4);
        assert_eq!(config.feeds.default_symbols, vec!["BTCUSDT"]);
        assert!(!config.feeds.mock_enabled);
        assert!(config.feeds.binance_enabled);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(Config::from_toml("network = ").is_err());
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let config = Config::load("/definitely/not/here.toml").unwrap();
        assert_eq!(config.network.pubsub_port, 9100);
    }
}
