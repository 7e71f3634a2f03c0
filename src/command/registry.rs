//! `GETCODECS`: fetch the server codec registry.

use bytes::Bytes;

use crate::error::{Result, RoomzinError};
use crate::protocol::field::field_type;
use crate::protocol::RawResult;
use crate::types::Codecs;

use super::{encode_command, ensure_success};

pub fn build_get_codecs() -> Bytes {
    encode_command("GETCODECS", &[])
}

/// Parse the registry from its delimited blob: `amenities|rate_features`,
/// both comma-separated.
pub fn parse_get_codecs(result: &RawResult) -> Result<Codecs> {
    ensure_success(result)?;

    if result.fields.len() != 1 {
        return Err(RoomzinError::Protocol(format!(
            "invalid field count: expected 1 field, got {}",
            result.fields.len()
        )));
    }
    let field = &result.fields[0];
    if field.field_type != field_type::DELIMITED {
        return Err(RoomzinError::Protocol(format!(
            "expected delimited field type 0x09, got 0x{:02x}",
            field.field_type
        )));
    }

    let text = field.as_text();
    let parts: Vec<&str> = text.split('|').collect();
    if parts.len() != 2 {
        return Err(RoomzinError::Protocol(format!(
            "invalid codecs format: expected 2 parts, got {}",
            parts.len()
        )));
    }

    let split = |s: &str| -> Vec<String> {
        s.split(',')
            .filter(|item| !item.is_empty())
            .map(|item| item.to_string())
            .collect()
    };
    Ok(Codecs {
        amenities: split(parts[0]),
        rate_features: split(parts[1]),
    })
}
