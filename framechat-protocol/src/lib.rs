//! # framechat-protocol
//!
//! Wire protocol implementation for framechat.
//!
//! This crate provides:
//! - Length-prefixed framing with a fixed-width ASCII decimal header
//! - Frame encoding and header decoding with strict bounds checking
//! - Protocol constants shared by both ends of a connection

pub mod error;
pub mod frame;

pub use error::ProtocolError;
pub use frame::{decode_header, Frame};

/// Size of the frame length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Maximum frame body size in bytes.
pub const MAX_BODY_LEN: usize = 512;

/// Default port for framechat servers.
pub const DEFAULT_PORT: u16 = 8088;
