//! Client error types.

use framechat_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Client errors.
///
/// Session-level failures (`Protocol`, `Read`, `Write`) are terminal: the
/// connection is closed and remaining queued frames are dropped. Callers
/// decide what to do with the reason; the library never retries.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting (or resolving) the peer failed.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The connect attempt did not complete within the configured bound.
    #[error("connecting to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// A received frame header failed validation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Reading from the channel failed.
    #[error("read failed: {0}")]
    Read(std::io::Error),

    /// Writing to the channel failed.
    #[error("write failed: {0}")]
    Write(std::io::Error),

    /// Operation attempted before connect or after close.
    #[error("not connected")]
    NotConnected,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,
}
