//! Length-prefixed frame format.
//!
//! Frame layout (4 byte header + body):
//!
//! ```text
//! +----------------+---------------------+
//! | header         | body                |
//! | 4 ASCII digits | header-many bytes   |
//! | zero-padded    | raw, no terminator  |
//! +----------------+---------------------+
//! ```
//!
//! The header is the body length as zero-padded ASCII decimal, no sign and
//! no delimiter. `"hello"` encodes as `"0005hello"`. Both ends must agree
//! on [`HEADER_LEN`] and [`MAX_BODY_LEN`] to interoperate.

use crate::error::ProtocolError;
use crate::{HEADER_LEN, MAX_BODY_LEN};
use bytes::{BufMut, Bytes, BytesMut};

/// A single framed message.
///
/// A frame owns its body exclusively; cloning (e.g. to enqueue it for
/// transmission) yields an independent immutable copy, so a sender can
/// never mutate bytes already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    body: Bytes,
}

impl Frame {
    /// Creates a frame with the given body.
    ///
    /// Fails with [`ProtocolError::BodyTooLarge`] if the body exceeds
    /// [`MAX_BODY_LEN`]; the length invariant is established here so that
    /// [`encode`](Self::encode) cannot fail.
    pub fn new(body: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let body = body.into();
        if body.len() > MAX_BODY_LEN {
            return Err(ProtocolError::BodyTooLarge {
                size: body.len(),
                max: MAX_BODY_LEN,
            });
        }
        Ok(Self { body })
    }

    /// The frame body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// Encodes the frame into its wire representation.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.body.len());
        buf.put_slice(&encode_header(self.body.len()));
        buf.put_slice(&self.body);
        buf
    }
}

/// Encodes a body length as a zero-padded ASCII decimal header.
///
/// `len` is at most [`MAX_BODY_LEN`], which fits the header width; the
/// `Frame` constructor enforces that bound.
fn encode_header(len: usize) -> [u8; HEADER_LEN] {
    let mut header = [b'0'; HEADER_LEN];
    let mut n = len;
    for slot in header.iter_mut().rev() {
        *slot = b'0' + (n % 10) as u8;
        n /= 10;
    }
    header
}

/// Decodes a length header, returning the announced body length.
///
/// This is the only validation gate on peer-controlled input: any
/// non-digit byte fails with [`ProtocolError::MalformedHeader`], and a
/// length above [`MAX_BODY_LEN`] fails with
/// [`ProtocolError::BodyTooLarge`] before a single body byte is read.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<usize, ProtocolError> {
    let mut len = 0usize;
    for &byte in header {
        if !byte.is_ascii_digit() {
            return Err(ProtocolError::MalformedHeader(*header));
        }
        len = len * 10 + (byte - b'0') as usize;
    }
    if len > MAX_BODY_LEN {
        return Err(ProtocolError::BodyTooLarge {
            size: len,
            max: MAX_BODY_LEN,
        });
    }
    Ok(len)
}
