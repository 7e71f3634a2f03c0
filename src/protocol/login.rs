//! Login handshake payload and acknowledgment.
//!
//! The login frame uses correlation id 0 and carries a single string field
//! holding the bearer token. The server acknowledges with a plaintext reply
//! beginning `LOGIN OK` or `LOGIN FAILED`; only after a positive ack does
//! the framed read loop start.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, RoomzinError};
use crate::protocol::field::{field_type, FIELD_HEADER_SIZE};

/// Command name of the login handshake.
const LOGIN_COMMAND: &str = "LOGIN";

/// Positive acknowledgment prefix.
const LOGIN_OK: &str = "LOGIN OK";

/// Negative acknowledgment prefix.
const LOGIN_FAILED: &str = "LOGIN FAILED";

/// Build the login payload: command name plus one string field with the
/// bearer token.
pub fn build_login_payload(token: &str) -> Bytes {
    let total = 1 + LOGIN_COMMAND.len() + 2 + FIELD_HEADER_SIZE + token.len();
    let mut buf = BytesMut::with_capacity(total);

    buf.put_u8(LOGIN_COMMAND.len() as u8);
    buf.put_slice(LOGIN_COMMAND.as_bytes());
    buf.put_u16_le(1); // one field
    buf.put_u16_le(0x01);
    buf.put_u8(field_type::STRING);
    buf.put_u32_le(token.len() as u32);
    buf.put_slice(token.as_bytes());

    buf.freeze()
}

/// Check the plaintext login acknowledgment.
pub fn parse_login_ack(reply: &[u8]) -> Result<()> {
    let text = String::from_utf8_lossy(reply);
    let text = text.trim();
    if text.starts_with(LOGIN_OK) {
        Ok(())
    } else if text.starts_with(LOGIN_FAILED) {
        Err(RoomzinError::Login("invalid token".to_string()))
    } else {
        Err(RoomzinError::Login(format!(
            "unexpected login reply: \"{text}\""
        )))
    }
}
