//! # framechat-client
//!
//! Async client library for framechat.
//!
//! A [`Client`] owns one duplex TCP connection to a single peer. Outbound
//! frames are handed to a queue drained by a dedicated write task, inbound
//! frames are decoded by a read task and delivered to subscribers. Every
//! connection error is terminal for the session: the channel is closed and
//! never retried.

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
