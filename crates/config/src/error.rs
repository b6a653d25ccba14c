//! Configuration error types

use thiserror::Error;

/// Errors loading or parsing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File exists but could not be read
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid TOML or has wrong field types
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
