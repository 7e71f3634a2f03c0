//! Tag-length-value field codec.
//!
//! Every field inside a payload is encoded as:
//! ```text
//! ┌──────────┬──────┬──────────┬─────────┐
//! │ Field ID │ Type │ Length   │ Data    │
//! │ u16 LE   │ u8   │ u32 LE   │ N bytes │
//! └──────────┴──────┴──────────┴─────────┘
//! ```
//! Decoding is strict: after `count` fields exactly zero bytes of the field
//! region may remain.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, RoomzinError};

/// Field type tags used by the wire protocol.
pub mod field_type {
    /// UTF-8 string.
    pub const STRING: u8 = 0x01;
    /// Single byte / enum.
    pub const BYTE: u8 = 0x02;
    /// Fixed-width number (4 or 8 bytes depending on the command).
    pub const NUMBER: u8 = 0x03;
    /// Vector-of-records blob.
    pub const VECTOR: u8 = 0x08;
    /// Delimited text blob (codec registry).
    pub const DELIMITED: u8 = 0x09;
}

/// Size of the per-field header: id(2) + type(1) + length(4).
pub const FIELD_HEADER_SIZE: usize = 7;

/// One tagged, typed, length-prefixed value inside a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field identifier within its command.
    pub id: u16,
    /// Type tag, see [`field_type`].
    pub field_type: u8,
    /// Raw field bytes.
    pub data: Bytes,
}

impl Field {
    /// String field from UTF-8 text.
    pub fn string(id: u16, value: &str) -> Self {
        Self {
            id,
            field_type: field_type::STRING,
            data: Bytes::copy_from_slice(value.as_bytes()),
        }
    }

    /// Single-byte field.
    pub fn byte(id: u16, value: u8) -> Self {
        Self {
            id,
            field_type: field_type::BYTE,
            data: Bytes::copy_from_slice(&[value]),
        }
    }

    /// 4-byte unsigned number field, little endian.
    pub fn u32(id: u16, value: u32) -> Self {
        Self {
            id,
            field_type: field_type::NUMBER,
            data: Bytes::copy_from_slice(&value.to_le_bytes()),
        }
    }

    /// 8-byte unsigned number field, little endian.
    pub fn u64(id: u16, value: u64) -> Self {
        Self {
            id,
            field_type: field_type::NUMBER,
            data: Bytes::copy_from_slice(&value.to_le_bytes()),
        }
    }

    /// 8-byte float field, little endian.
    pub fn f64(id: u16, value: f64) -> Self {
        Self {
            id,
            field_type: field_type::NUMBER,
            data: Bytes::copy_from_slice(&value.to_le_bytes()),
        }
    }

    /// Field data as UTF-8 text (lossy).
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// A decoded response: status plus its field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResult {
    /// Response status, `SUCCESS` or `ERROR`.
    pub status: String,
    /// Decoded fields in wire order.
    pub fields: Vec<Field>,
}

impl RawResult {
    /// True when the server reported success.
    pub fn is_success(&self) -> bool {
        self.status == super::frame::STATUS_SUCCESS
    }

    /// Text of the first field, the conventional slot for error messages.
    pub fn first_field_text(&self) -> Option<String> {
        self.fields.first().map(Field::as_text)
    }
}

/// Encode a field list into its wire form.
///
/// The total size is computed up front so the buffer never reallocates.
pub fn encode_fields(fields: &[Field]) -> Bytes {
    let total: usize = fields
        .iter()
        .map(|f| FIELD_HEADER_SIZE + f.data.len())
        .sum();
    let mut buf = BytesMut::with_capacity(total);
    for f in fields {
        buf.put_u16_le(f.id);
        buf.put_u8(f.field_type);
        buf.put_u32_le(f.data.len() as u32);
        buf.put_slice(&f.data);
    }
    buf.freeze()
}

/// Decode exactly `count` fields from a field region.
///
/// Fails if a field header would read past the buffer, if a declared length
/// exceeds the remaining bytes, or if any bytes remain once `count` fields
/// are consumed.
pub fn decode_fields(data: &Bytes, count: u16) -> Result<Vec<Field>> {
    let mut fields = Vec::with_capacity(count as usize);
    let mut offset = 0usize;

    for i in 0..count {
        if offset + FIELD_HEADER_SIZE > data.len() {
            return Err(RoomzinError::Protocol(format!(
                "short frame: not enough bytes for field header at field {i}"
            )));
        }
        let id = u16::from_le_bytes([data[offset], data[offset + 1]]);
        let field_type = data[offset + 2];
        let length = u32::from_le_bytes([
            data[offset + 3],
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
        ]) as usize;
        offset += FIELD_HEADER_SIZE;

        if offset + length > data.len() {
            return Err(RoomzinError::Protocol(format!(
                "short frame: field {i} declares {length} bytes, have {}",
                data.len() - offset
            )));
        }
        fields.push(Field {
            id,
            field_type,
            data: data.slice(offset..offset + length),
        });
        offset += length;
    }

    if offset != data.len() {
        return Err(RoomzinError::Protocol(format!(
            "extra {} bytes after parsing fields",
            data.len() - offset
        )));
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_mixed_fields() {
        let fields = vec![
            Field::string(0x01, "city-hotel"),
            Field::byte(0x02, 4),
            Field::u32(0x03, 12_900),
            Field::u64(0x04, u64::MAX),
            Field::f64(0x05, -74.0060),
            Field {
                id: 0x06,
                field_type: field_type::VECTOR,
                data: Bytes::from_static(&[1, 2, 3, 4, 5]),
            },
        ];
        let encoded = encode_fields(&fields);
        let decoded = decode_fields(&encoded, fields.len() as u16).unwrap();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn test_roundtrip_empty_list() {
        let encoded = encode_fields(&[]);
        assert!(encoded.is_empty());
        assert!(decode_fields(&encoded, 0).unwrap().is_empty());
    }

    #[test]
    fn test_roundtrip_empty_data_field() {
        let fields = vec![Field::string(1, "")];
        let decoded = decode_fields(&encode_fields(&fields), 1).unwrap();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn test_field_wire_layout() {
        let encoded = encode_fields(&[Field::string(0x0102, "ab")]);
        // id LE, type, length LE, data
        assert_eq!(
            &encoded[..],
            &[0x02, 0x01, 0x01, 0x02, 0x00, 0x00, 0x00, b'a', b'b']
        );
    }

    #[test]
    fn test_decode_header_past_buffer() {
        let encoded = encode_fields(&[Field::byte(1, 9)]);
        // Claim two fields while only one is present.
        let err = decode_fields(&encoded, 2).unwrap_err();
        assert!(err.to_string().contains("field header at field 1"));
    }

    #[test]
    fn test_decode_length_overrun() {
        let mut bytes = encode_fields(&[Field::string(1, "abcdef")]).to_vec();
        // Inflate the declared length beyond the buffer.
        bytes[3] = 0xFF;
        let err = decode_fields(&Bytes::from(bytes), 1).unwrap_err();
        assert!(err.to_string().contains("declares"));
    }

    #[test]
    fn test_decode_trailing_garbage() {
        let mut bytes = encode_fields(&[Field::byte(1, 0)]).to_vec();
        bytes.push(0xCC);
        let err = decode_fields(&Bytes::from(bytes), 1).unwrap_err();
        assert!(err.to_string().contains("extra 1 bytes"));
    }

    #[test]
    fn test_numeric_helpers_little_endian() {
        assert_eq!(&Field::u32(1, 0x04030201).data[..], &[1, 2, 3, 4]);
        assert_eq!(
            &Field::u64(1, 0x0807060504030201).data[..],
            &[1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert_eq!(&Field::f64(1, 1.0).data[..], &1.0f64.to_le_bytes());
    }

    #[test]
    fn test_raw_result_helpers() {
        let ok = RawResult {
            status: "SUCCESS".to_string(),
            fields: vec![],
        };
        assert!(ok.is_success());
        assert_eq!(ok.first_field_text(), None);

        let err = RawResult {
            status: "ERROR".to_string(),
            fields: vec![Field::string(1, "NOT_FOUND:gone")],
        };
        assert!(!err.is_success());
        assert_eq!(err.first_field_text().as_deref(), Some("NOT_FOUND:gone"));
    }
}
