//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use bytes::Bytes;
use framechat_protocol::Frame;
use std::sync::Arc;

/// High-level client for a framechat session.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Connects to the peer.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Frames a message body and enqueues it for transmission.
    ///
    /// Fails with a protocol error if the body exceeds the frame size
    /// limit; over-long input is rejected, never truncated.
    pub fn send(&self, body: impl Into<Bytes>) -> Result<(), ClientError> {
        let frame = Frame::new(body)?;
        self.conn.enqueue(frame)
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        self.conn.close();
    }

    /// Returns whether the session is live.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Subscribes to decoded inbound message bodies.
    pub fn subscribe_messages(&self) -> tokio::sync::broadcast::Receiver<Bytes> {
        self.conn.subscribe_messages()
    }

    /// Returns the underlying connection (for the background I/O loops).
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }
}
