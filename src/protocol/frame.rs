//! Frame encoding and decoding.
//!
//! Implements the 9-byte frame header:
//! ```text
//! ┌───────┬────────────────┬────────────────┐
//! │ Magic │ Correlation ID │ Payload length │
//! │ 1 byte│ 4 bytes u32 LE │ 4 bytes u32 LE │
//! └───────┴────────────────┴────────────────┘
//! ```
//! The payload length always equals the exact byte length of the payload;
//! a reader must consume exactly that many bytes before parsing further.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, RoomzinError};

/// Magic byte opening every frame.
pub const MAGIC: u8 = 0xFF;

/// Frame header size in bytes (fixed, exactly 9).
pub const FRAME_HEADER_SIZE: usize = 9;

/// Status string for a successful response.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Status string for a failed response.
pub const STATUS_ERROR: &str = "ERROR";

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Correlation id pairing this frame with a pending request.
    pub correlation_id: u32,
    /// Exact byte length of the payload that follows.
    pub payload_length: u32,
}

impl FrameHeader {
    /// Decode a header from the first 9 bytes of a buffer.
    ///
    /// # Example
    ///
    /// ```
    /// use roomzin_client::protocol::FrameHeader;
    ///
    /// let bytes = [0xFF, 42, 0, 0, 0, 5, 0, 0, 0];
    /// let header = FrameHeader::decode(&bytes).unwrap();
    /// assert_eq!(header.correlation_id, 42);
    /// assert_eq!(header.payload_length, 5);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(RoomzinError::Protocol(format!(
                "short frame: header needs {FRAME_HEADER_SIZE} bytes, have {}",
                buf.len()
            )));
        }
        if buf[0] != MAGIC {
            return Err(RoomzinError::Protocol(format!(
                "bad magic byte: got 0x{:02x}",
                buf[0]
            )));
        }
        Ok(Self {
            correlation_id: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
            payload_length: u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]),
        })
    }
}

/// Build a complete frame ready to write to the server.
///
/// Always produces `9 + payload.len()` bytes; the capacity is computed up
/// front so the buffer never reallocates.
///
/// # Example
///
/// ```
/// use roomzin_client::protocol::{encode_frame, FrameHeader};
///
/// let frame = encode_frame(7, b"hello");
/// assert_eq!(frame.len(), 9 + 5);
/// let header = FrameHeader::decode(&frame).unwrap();
/// assert_eq!(header.correlation_id, 7);
/// ```
pub fn encode_frame(correlation_id: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u8(MAGIC);
    buf.put_u32_le(correlation_id);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Read one full frame from the transport.
///
/// Reads the fixed header, validates the magic byte, then reads exactly the
/// declared payload length. A stream that ends early yields a protocol
/// error, not a partial frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<(FrameHeader, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let mut fixed = [0u8; FRAME_HEADER_SIZE];
    read_full(reader, &mut fixed).await?;
    let header = FrameHeader::decode(&fixed)?;

    let mut payload = BytesMut::zeroed(header.payload_length as usize);
    read_full(reader, &mut payload).await?;
    Ok((header, payload.freeze()))
}

/// Read exactly `buf.len()` bytes, mapping early EOF to a protocol error.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(RoomzinError::Protocol(
            "short frame: stream ended before reading required bytes".to_string(),
        )),
        Err(e) => Err(RoomzinError::Io(e)),
    }
}

/// Parsed head of a response payload: status string plus the field region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Response status, `SUCCESS` or `ERROR`.
    pub status: String,
    /// Number of fields that follow.
    pub field_count: u16,
    /// Offset of the first field within the payload.
    pub fields_at: usize,
}

/// Decode the status/field-count prefix of a response payload.
///
/// Payload layout: `status_len(1) | status | field_count(2, LE) | fields...`
pub fn decode_response_head(payload: &[u8]) -> Result<ResponseHead> {
    if payload.is_empty() {
        return Err(RoomzinError::Protocol(
            "short frame: no status length".to_string(),
        ));
    }
    let status_len = payload[0] as usize;
    if payload.len() < 1 + status_len + 2 {
        return Err(RoomzinError::Protocol(
            "short frame: missing status or field count".to_string(),
        ));
    }
    let status = String::from_utf8(payload[1..1 + status_len].to_vec())
        .map_err(|_| RoomzinError::Protocol("status is not valid UTF-8".to_string()))?;
    let field_count = u16::from_le_bytes([payload[1 + status_len], payload[2 + status_len]]);
    Ok(ResponseHead {
        status,
        field_count,
        fields_at: 1 + status_len + 2,
    })
}
