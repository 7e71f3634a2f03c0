//! Property-level commands: `SETPROP`, `PROPEXIST`, `SEARCHPROP`,
//! `DELPROP`, `DELPROPDAY`.

use bytes::Bytes;

use crate::error::{Result, RoomzinError};
use crate::protocol::field::field_type;
use crate::protocol::value::decode_property_id;
use crate::protocol::{Field, RawResult};
use crate::types::{SearchPropRequest, SetPropRequest};

use super::{encode_command, ensure_success};

pub fn build_set_prop(req: &SetPropRequest) -> Bytes {
    let fields = vec![
        Field::string(0x01, &req.segment),
        Field::string(0x02, &req.area),
        Field::string(0x03, &req.property_id),
        Field::string(0x04, &req.property_type),
        Field::string(0x05, &req.category),
        Field::byte(0x06, req.stars),
        Field::f64(0x07, req.latitude),
        Field::f64(0x08, req.longitude),
        Field::string(0x09, &req.amenities.join(",")),
    ];
    encode_command("SETPROP", &fields)
}

pub fn build_prop_exist(property_id: &str) -> Bytes {
    encode_command("PROPEXIST", &[Field::string(0x01, property_id)])
}

/// `PROPEXIST` answers a single boolean byte: 1 exists, 0 does not.
pub fn parse_prop_exist(result: &RawResult) -> Result<bool> {
    ensure_success(result)?;
    match result.fields.first() {
        Some(field) if !field.data.is_empty() => Ok(field.data[0] == 1),
        _ => Err(RoomzinError::Protocol(
            "invalid PROPEXIST response: missing boolean byte".to_string(),
        )),
    }
}

pub fn build_del_prop(property_id: &str) -> Bytes {
    encode_command("DELPROP", &[Field::string(0x01, property_id)])
}

pub fn build_del_prop_day(property_id: &str, date: &str) -> Bytes {
    encode_command(
        "DELPROPDAY",
        &[Field::string(0x01, property_id), Field::string(0x02, date)],
    )
}

pub fn build_search_prop(req: &SearchPropRequest) -> Bytes {
    let mut fields = vec![Field::string(0x01, &req.segment)];
    if let Some(area) = &req.area {
        fields.push(Field::string(0x02, area));
    }
    if let Some(property_type) = &req.property_type {
        fields.push(Field::string(0x03, property_type));
    }
    if let Some(stars) = req.stars {
        fields.push(Field::byte(0x04, stars));
    }
    if let Some(category) = &req.category {
        fields.push(Field::string(0x05, category));
    }
    if !req.amenities.is_empty() {
        fields.push(Field::string(0x06, &req.amenities.join(",")));
    }
    if let Some(longitude) = req.longitude {
        fields.push(Field::f64(0x07, longitude));
    }
    if let Some(latitude) = req.latitude {
        fields.push(Field::f64(0x08, latitude));
    }
    if let Some(limit) = req.limit {
        fields.push(Field::u64(0x09, limit));
    }
    encode_command("SEARCHPROP", &fields)
}

/// `SEARCHPROP` answers sequentially numbered string fields, each holding
/// one compact property identifier.
pub fn parse_search_prop(result: &RawResult) -> Result<Vec<String>> {
    ensure_success(result)?;

    let mut ids = Vec::with_capacity(result.fields.len());
    for (i, field) in result.fields.iter().enumerate() {
        let expected = (i + 1) as u16;
        if field.id != expected {
            return Err(RoomzinError::Protocol(format!(
                "invalid field ID {}: expected {expected}",
                field.id
            )));
        }
        if field.field_type != field_type::STRING {
            return Err(RoomzinError::Protocol(format!(
                "invalid field type at ID {}: expected 0x01",
                field.id
            )));
        }
        ids.push(decode_property_id(&field.data));
    }
    Ok(ids)
}
