use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: payload length (4 bytes, big-endian).
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 4-byte length prefix can describe.
const WIRE_MAX_PAYLOAD: usize = u32::MAX as usize;

/// One decoded unit from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, non-empty payload.
    Frame(Bytes),
    /// A zero-length frame (or a clean close at a frame boundary).
    EndOfStream,
}

/// Encode a payload into the wire format.
///
/// ```text
/// ┌──────────────────┬───────────────────────┐
/// │ Length (4B BE)   │ Payload (Length bytes)│
/// └──────────────────┴───────────────────────┘
/// ```
///
/// Empty payloads are rejected because a zero length means end-of-stream;
/// use [`encode_end_of_stream`] to write that sentinel on purpose.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > WIRE_MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: WIRE_MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Encode the zero-length end-of-stream sentinel.
pub fn encode_end_of_stream(dst: &mut BytesMut) {
    dst.put_u32(0);
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. A zero-length header
/// consumes only the header and yields [`Decoded::EndOfStream`]; any bytes
/// after it are left in place.
pub fn decode_frame(src: &mut BytesMut, max_payload: Option<usize>) -> Result<Option<Decoded>> {
    let Some(payload_len) = peek_len(src) else {
        return Ok(None);
    };

    if payload_len == 0 {
        src.advance(HEADER_SIZE);
        return Ok(Some(Decoded::EndOfStream));
    }

    if let Some(max) = max_payload {
        if payload_len > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max,
            });
        }
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(Decoded::Frame(src.split_to(payload_len).freeze())))
}

/// Total bytes the frame at the head of `src` occupies, if the header is complete.
pub(crate) fn expected_len(src: &[u8]) -> Option<usize> {
    peek_len(src).map(|len| HEADER_SIZE + len)
}

fn peek_len(src: &[u8]) -> Option<usize> {
    let header: [u8; HEADER_SIZE] = src.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(header) as usize)
}

/// Configuration for the frame reader and writer.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. `None` accepts anything the 4-byte
    /// length can express.
    pub max_payload_size: Option<usize>,
    /// Read timeout for blocking operations. `None` blocks indefinitely.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations. `None` blocks indefinitely.
    pub write_timeout: Option<std::time::Duration>,
}
