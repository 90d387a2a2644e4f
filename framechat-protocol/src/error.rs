//! Protocol error types.

use crate::HEADER_LEN;
use thiserror::Error;

/// Protocol-level errors that can occur during frame encoding or decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The length header contained a byte outside `'0'..='9'`.
    #[error("malformed frame header: {0:?}")]
    MalformedHeader([u8; HEADER_LEN]),

    /// The body length exceeds the protocol maximum.
    ///
    /// Raised both when constructing an outbound frame and when a received
    /// header announces an oversized body. Oversized frames are rejected,
    /// never truncated: once framing is lost there is no way to resync the
    /// byte stream.
    #[error("frame body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },
}
