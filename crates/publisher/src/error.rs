//! Publisher error types

use thiserror::Error;

/// Errors surfaced by the publisher server
#[derive(Debug, Error)]
pub enum PublisherError {
    /// Could not bind or accept on the configured port
    #[error("listener error on {addr}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure on an individual client socket
    #[error("client I/O error: {0}")]
    ClientIo(#[from] std::io::Error),
}
