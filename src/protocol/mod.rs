//! Wire protocol: frames, TLV fields, value codecs, and the login handshake.
//!
//! Every unit sent over the TCP connection is a frame:
//!
//! ```text
//! ┌───────┬───────────────┬────────────────┬─────────┐
//! │ Magic │ Correlation   │ Payload length │ Payload │
//! │ 0xFF  │ u32 LE        │ u32 LE         │ N bytes │
//! └───────┴───────────────┴────────────────┴─────────┘
//! ```
//!
//! Response payloads carry a status string and a flat list of
//! tag-length-value fields; request payloads carry a command name and the
//! same field list.

pub mod field;
pub mod frame;
pub mod login;
pub mod value;

pub use field::{decode_fields, encode_fields, Field, RawResult};
pub use frame::{
    decode_response_head, encode_frame, read_frame, FrameHeader, ResponseHead, FRAME_HEADER_SIZE,
    MAGIC, STATUS_ERROR, STATUS_SUCCESS,
};
pub use login::build_login_payload;
