//! Error types for moos-client.

use thiserror::Error;

/// Main error type for all MOOS client operations.
#[derive(Debug, Error)]
pub enum MoosError {
    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket-level failure to reach the broker.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Broker reachable but no Welcome arrived within the polling window.
    #[error("handshake timed out waiting for welcome")]
    HandshakeTimeout,

    /// Broker answered the handshake with a Poison message.
    #[error("handshake rejected by broker: {0}")]
    HandshakeRejected(String),

    /// Malformed field length or unknown tag byte during decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// A compressed frame was received; decompression is not implemented.
    #[error("received a compressed frame, compression is not supported")]
    UnsupportedCompression,

    /// Caller supplied an empty wildcard pattern.
    #[error("invalid wildcard pattern: {0}")]
    InvalidPattern(&'static str),

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using MoosError.
pub type Result<T> = std::result::Result<T, MoosError>;
