//! Room-level commands: existence and listing, availability updates,
//! package assignment, per-day reads and deletes.

use bytes::Bytes;

use crate::error::{Result, RoomzinError};
use crate::protocol::value::expand_feature_mask;
use crate::protocol::{Field, RawResult};
use crate::types::{Codecs, RoomDayKey, SetRoomPkgRequest, UpdRoomAvlRequest};

use super::{encode_command, ensure_success};

pub fn build_prop_room_exist(property_id: &str, room_type: &str) -> Bytes {
    encode_command(
        "PROPROOMEXIST",
        &[
            Field::string(0x01, property_id),
            Field::string(0x02, room_type),
        ],
    )
}

/// `PROPROOMEXIST` answers a single boolean byte.
pub fn parse_prop_room_exist(result: &RawResult) -> Result<bool> {
    ensure_success(result)?;
    match result.fields.first() {
        Some(field) if !field.data.is_empty() => Ok(field.data[0] == 1),
        _ => Err(RoomzinError::Protocol(
            "invalid PROPROOMEXIST response: missing boolean byte".to_string(),
        )),
    }
}

pub fn build_prop_room_list(property_id: &str) -> Bytes {
    encode_command("PROPROOMLIST", &[Field::string(0x01, property_id)])
}

/// `PROPROOMLIST` answers one string field per room type.
pub fn parse_prop_room_list(result: &RawResult) -> Result<Vec<String>> {
    ensure_success(result)?;
    Ok(result.fields.iter().map(Field::as_text).collect())
}

pub fn build_prop_room_date_list(property_id: &str, room_type: &str) -> Bytes {
    encode_command(
        "PROPROOMDATELIST",
        &[
            Field::string(0x01, property_id),
            Field::string(0x02, room_type),
        ],
    )
}

/// `PROPROOMDATELIST` answers one string field per date; empties are
/// skipped and the result is sorted.
pub fn parse_prop_room_date_list(result: &RawResult) -> Result<Vec<String>> {
    ensure_success(result)?;
    let mut dates: Vec<String> = result
        .fields
        .iter()
        .map(Field::as_text)
        .filter(|s| !s.is_empty())
        .collect();
    dates.sort();
    Ok(dates)
}

pub fn build_del_prop_room(property_id: &str, room_type: &str) -> Bytes {
    encode_command(
        "DELPROPROOM",
        &[
            Field::string(0x01, property_id),
            Field::string(0x02, room_type),
        ],
    )
}

fn room_avl_payload(command: &str, req: &UpdRoomAvlRequest) -> Bytes {
    let fields = vec![
        Field::string(0x01, &req.property_id),
        Field::string(0x02, &req.room_type),
        Field::string(0x03, &req.date),
        Field::byte(0x04, req.amount),
    ];
    encode_command(command, &fields)
}

pub fn build_set_room_avl(req: &UpdRoomAvlRequest) -> Bytes {
    room_avl_payload("SETROOMAVL", req)
}

pub fn build_inc_room_avl(req: &UpdRoomAvlRequest) -> Bytes {
    room_avl_payload("INCROOMAVL", req)
}

pub fn build_dec_room_avl(req: &UpdRoomAvlRequest) -> Bytes {
    room_avl_payload("DECROOMAVL", req)
}

/// The availability updates all answer the resulting count as one byte.
pub fn parse_room_avl(result: &RawResult) -> Result<u8> {
    ensure_success(result)?;
    match result.fields.first() {
        Some(field) if field.data.len() == 1 => Ok(field.data[0]),
        _ => Err(RoomzinError::Protocol(
            "missing or invalid scalar value".to_string(),
        )),
    }
}

pub fn build_set_room_pkg(req: &SetRoomPkgRequest) -> Bytes {
    let mut fields = vec![
        Field::string(0x01, &req.property_id),
        Field::string(0x02, &req.room_type),
        Field::string(0x03, &req.date),
    ];
    if let Some(availability) = req.availability {
        fields.push(Field::byte(0x04, availability));
    }
    if let Some(final_price) = req.final_price {
        fields.push(Field::u32(0x05, final_price));
    }
    if !req.rate_features.is_empty() {
        fields.push(Field::string(0x06, &req.rate_features.join(",")));
    }
    encode_command("SETROOMPKG", &fields)
}

pub fn build_get_prop_room_day(key: &RoomDayKey) -> Bytes {
    encode_command(
        "GETPROPROOMDAY",
        &[
            Field::string(0x01, &key.property_id),
            Field::string(0x02, &key.room_type),
            Field::string(0x03, &key.date),
        ],
    )
}

/// `GETPROPROOMDAY` answers five fields: property id, date, availability
/// byte, price u32, and a one-byte feature mask.
pub fn parse_get_prop_room_day(
    codecs: Option<&Codecs>,
    result: &RawResult,
) -> Result<crate::types::RoomDay> {
    ensure_success(result)?;
    if result.fields.len() < 5 {
        return Err(RoomzinError::Protocol(format!(
            "expected 5 response fields, got {}",
            result.fields.len()
        )));
    }
    let availability = result.fields[2]
        .data
        .first()
        .copied()
        .ok_or_else(|| RoomzinError::Protocol("missing availability byte".to_string()))?;
    let price_bytes = &result.fields[3].data;
    if price_bytes.len() != 4 {
        return Err(RoomzinError::Protocol(format!(
            "invalid price length: expected 4 bytes, got {}",
            price_bytes.len()
        )));
    }
    let mask = result.fields[4]
        .data
        .first()
        .copied()
        .ok_or_else(|| RoomzinError::Protocol("missing feature mask byte".to_string()))?;

    Ok(crate::types::RoomDay {
        property_id: result.fields[0].as_text(),
        date: result.fields[1].as_text(),
        availability,
        final_price: u32::from_le_bytes([
            price_bytes[0],
            price_bytes[1],
            price_bytes[2],
            price_bytes[3],
        ]),
        rate_features: expand_feature_mask(codecs, mask as u32),
    })
}

pub fn build_del_room_day(key: &RoomDayKey) -> Bytes {
    encode_command(
        "DELROOMDAY",
        &[
            Field::string(0x01, &key.property_id),
            Field::string(0x02, &key.room_type),
            Field::string(0x03, &key.date),
        ],
    )
}
