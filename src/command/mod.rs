//! Command payload builders and response parsers.
//!
//! Request payloads share one layout:
//! ```text
//! ┌──────────┬──────────────┬─────────────┬─────────┐
//! │ Name len │ Command name │ Field count │ Fields  │
//! │ u8       │ ASCII        │ u16 LE      │ TLV ... │
//! └──────────┴──────────────┴─────────────┴─────────┘
//! ```
//! Builders compute the total size up front; parsers check field counts
//! and types strictly and surface server `ERROR` statuses as typed
//! errors.

mod avail;
mod property;
mod registry;
mod room;
mod segment;

pub use avail::{build_search_avail, parse_search_avail};
pub use property::{
    build_del_prop, build_del_prop_day, build_prop_exist, build_search_prop, build_set_prop,
    parse_prop_exist, parse_search_prop,
};
pub use registry::{build_get_codecs, parse_get_codecs};
pub use room::{
    build_dec_room_avl, build_del_prop_room, build_del_room_day, build_get_prop_room_day,
    build_inc_room_avl, build_prop_room_date_list, build_prop_room_exist, build_prop_room_list,
    build_set_room_avl, build_set_room_pkg, parse_get_prop_room_day, parse_prop_room_date_list,
    parse_prop_room_exist, parse_prop_room_list, parse_room_avl,
};
pub use segment::{build_del_segment, build_get_segments, parse_get_segments};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, RoomzinError};
use crate::protocol::field::FIELD_HEADER_SIZE;
use crate::protocol::{Field, RawResult};

/// Encode a command payload: name plus field list, size computed up front.
pub(crate) fn encode_command(name: &str, fields: &[Field]) -> Bytes {
    let mut size = 1 + name.len() + 2;
    for f in fields {
        size += FIELD_HEADER_SIZE + f.data.len();
    }

    let mut buf = BytesMut::with_capacity(size);
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
    buf.put_u16_le(fields.len() as u16);
    for f in fields {
        buf.put_u16_le(f.id);
        buf.put_u8(f.field_type);
        buf.put_u32_le(f.data.len() as u32);
        buf.put_slice(&f.data);
    }
    buf.freeze()
}

/// Map an `ERROR` response to a typed server error.
fn server_error(result: &RawResult) -> RoomzinError {
    match result.first_field_text() {
        Some(message) => RoomzinError::from_server_message(&message),
        None => RoomzinError::from_server_message("unknown error"),
    }
}

/// Fail on any non-`SUCCESS` status, surfacing the server message verbatim.
pub(crate) fn ensure_success(result: &RawResult) -> Result<()> {
    if result.is_success() {
        Ok(())
    } else {
        Err(server_error(result))
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn test_encode_command_layout() {
        let payload = encode_command("PING", &[Field::byte(1, 7)]);
        let mut expect = vec![4u8];
        expect.extend_from_slice(b"PING");
        expect.extend_from_slice(&[1, 0]);
        expect.extend_from_slice(&[1, 0, 0x02, 1, 0, 0, 0, 7]);
        assert_eq!(&payload[..], &expect[..]);
    }

    #[test]
    fn test_encode_command_no_fields() {
        let payload = encode_command("GETX", &[]);
        assert_eq!(payload.len(), 1 + 4 + 2);
        let (name, fields) = decode_command(&payload);
        assert_eq!(name, "GETX");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_ensure_success() {
        assert!(ensure_success(&success(vec![])).is_ok());
        let err = ensure_success(&error("NOT_FOUND:nope")).unwrap_err();
        match err {
            RoomzinError::Server { code, message } => {
                assert_eq!(code, "NOT_FOUND");
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ensure_success_without_message_field() {
        let result = RawResult {
            status: "ERROR".to_string(),
            fields: vec![],
        };
        let err = ensure_success(&result).unwrap_err();
        assert!(err.to_string().contains("unknown error"));
    }
}
