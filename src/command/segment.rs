//! Segment commands: `GETSEGMENTS`, `DELSEGMENT`.

use bytes::Bytes;

use crate::error::{Result, RoomzinError};
use crate::protocol::field::field_type;
use crate::protocol::{Field, RawResult};
use crate::types::SegmentInfo;

use super::{encode_command, ensure_success};

pub fn build_get_segments() -> Bytes {
    encode_command("GETSEGMENTS", &[])
}

/// `GETSEGMENTS` answers pairs of fields: segment name (string) and
/// property count (u32).
pub fn parse_get_segments(result: &RawResult) -> Result<Vec<SegmentInfo>> {
    ensure_success(result)?;

    if result.fields.len() % 2 != 0 {
        return Err(RoomzinError::Protocol(
            "invalid field count: expected pairs of segment and property count".to_string(),
        ));
    }

    let mut list = Vec::with_capacity(result.fields.len() / 2);
    for pair in result.fields.chunks(2) {
        let (segment_field, count_field) = (&pair[0], &pair[1]);
        if segment_field.field_type != field_type::STRING {
            return Err(RoomzinError::Protocol(format!(
                "expected string segment, got type 0x{:02x}",
                segment_field.field_type
            )));
        }
        if count_field.field_type != field_type::NUMBER {
            return Err(RoomzinError::Protocol(format!(
                "expected u32 property count, got type 0x{:02x}",
                count_field.field_type
            )));
        }
        if count_field.data.len() != 4 {
            return Err(RoomzinError::Protocol(format!(
                "invalid property count length: expected 4 bytes, got {}",
                count_field.data.len()
            )));
        }
        list.push(SegmentInfo {
            segment: segment_field.as_text(),
            property_count: u32::from_le_bytes([
                count_field.data[0],
                count_field.data[1],
                count_field.data[2],
                count_field.data[3],
            ]),
        });
    }
    Ok(list)
}

pub fn build_del_segment(segment: &str) -> Bytes {
    encode_command("DELSEGMENT", &[Field::string(0x01, segment)])
}
