//! Frame encoding
//!
//! Frame layout: [Length(4 LE)][Type(1)][Payload(Length - 1)]
//!
//! Payloads are protobuf messages, handled by `prost` in [`super::mysqlx`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{code, XError};

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

/// Largest frame accepted from the server
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Encode a complete frame
pub fn encode_frame(msg_type: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 1 + payload.len());
    buf.put_u32_le(payload.len() as u32 + 1);
    buf.put_u8(msg_type);
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Decode the length prefix, returning the size of type byte + payload
pub fn decode_header(header: [u8; HEADER_LEN]) -> Result<usize, XError> {
    let len = u32::from_le_bytes(header) as usize;
    if len == 0 {
        return Err(malformed("frame without message type"));
    }
    if len > MAX_FRAME_LEN {
        return Err(malformed(format!("frame of {} bytes exceeds limit", len)));
    }
    Ok(len)
}

pub fn malformed(detail: impl std::fmt::Display) -> XError {
    XError::new(
        code::CR_MALFORMED_PACKET,
        format!("Lost connection to MySQL server, malformed packet: {}", detail),
    )
}
