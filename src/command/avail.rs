//! `SEARCHAVAIL`: availability search across properties and dates.

use bytes::Bytes;

use crate::error::{Result, RoomzinError};
use crate::protocol::field::field_type;
use crate::protocol::value::{decode_property_id, expand_feature_mask, unpack_date_string};
use crate::protocol::{Field, RawResult};
use crate::types::{Codecs, DayAvailability, PropertyAvailability, SearchAvailRequest};

use super::{encode_command, ensure_success};

/// Bytes per day record inside a days vector: packed date (2) +
/// availability (1) + price (4) + feature mask (4).
const DAY_RECORD_SIZE: usize = 11;

pub fn build_search_avail(req: &SearchAvailRequest) -> Bytes {
    let mut fields = vec![
        Field::string(0x01, &req.segment),
        Field::string(0x02, &req.room_type),
    ];
    if let Some(area) = &req.area {
        fields.push(Field::string(0x03, area));
    }
    if let Some(property_id) = &req.property_id {
        fields.push(Field::string(0x04, property_id));
    }
    if let Some(property_type) = &req.property_type {
        fields.push(Field::string(0x05, property_type));
    }
    if let Some(stars) = req.stars {
        fields.push(Field::byte(0x06, stars));
    }
    if let Some(category) = &req.category {
        fields.push(Field::string(0x07, category));
    }
    if !req.amenities.is_empty() {
        fields.push(Field::string(0x08, &req.amenities.join(",")));
    }
    if let Some(longitude) = req.longitude {
        fields.push(Field::f64(0x09, longitude));
    }
    if let Some(latitude) = req.latitude {
        fields.push(Field::f64(0x0A, latitude));
    }
    if !req.dates.is_empty() {
        fields.push(Field::string(0x0B, &req.dates.join(",")));
    }
    if let Some(availability) = req.availability {
        fields.push(Field::byte(0x0C, availability));
    }
    if let Some(final_price) = req.final_price {
        fields.push(Field::u32(0x0D, final_price));
    }
    if !req.rate_features.is_empty() {
        fields.push(Field::string(0x0E, &req.rate_features.join(",")));
    }
    if let Some(limit) = req.limit {
        fields.push(Field::u64(0x0F, limit));
    }
    encode_command("SEARCHAVAIL", &fields)
}

/// Parse the `SEARCHAVAIL` response.
///
/// The first field carries the day count every property must match; the
/// remaining fields come in pairs of property identifier and a packed
/// days vector of fixed-size records.
pub fn parse_search_avail(
    codecs: Option<&Codecs>,
    result: &RawResult,
) -> Result<Vec<PropertyAvailability>> {
    ensure_success(result)?;

    let num_days_field = result.fields.first().ok_or_else(|| {
        RoomzinError::Protocol("expected num_days field (id=1, type=0x02, len=2)".to_string())
    })?;
    if num_days_field.id != 1
        || num_days_field.field_type != field_type::BYTE
        || num_days_field.data.len() != 2
    {
        return Err(RoomzinError::Protocol(
            "expected num_days field (id=1, type=0x02, len=2)".to_string(),
        ));
    }
    let num_days = u16::from_le_bytes([num_days_field.data[0], num_days_field.data[1]]);

    let mut out = Vec::new();
    let mut i = 1usize;
    while i < result.fields.len() {
        let prop_field = &result.fields[i];
        i += 1;
        if prop_field.field_type != field_type::STRING {
            return Err(RoomzinError::Protocol(format!(
                "expected property ID string, got type 0x{:02x}",
                prop_field.field_type
            )));
        }
        let property_id = decode_property_id(&prop_field.data);

        let Some(days_field) = result.fields.get(i) else {
            return Err(RoomzinError::Protocol(format!(
                "property \"{property_id}\" missing days vector"
            )));
        };
        i += 1;
        if days_field.field_type != field_type::VECTOR {
            return Err(RoomzinError::Protocol(format!(
                "expected days vector (0x08) for property \"{property_id}\", got 0x{:02x}",
                days_field.field_type
            )));
        }

        let data = &days_field.data;
        if data.len() < 2 {
            return Err(RoomzinError::Protocol(format!(
                "property \"{property_id}\" days vector too short"
            )));
        }
        let days_count = u16::from_le_bytes([data[0], data[1]]);
        if days_count != num_days {
            return Err(RoomzinError::Protocol(format!(
                "property \"{property_id}\" days count mismatch: expected {num_days}, got {days_count}"
            )));
        }
        let expected_len = 2 + days_count as usize * DAY_RECORD_SIZE;
        if data.len() != expected_len {
            return Err(RoomzinError::Protocol(format!(
                "property \"{property_id}\" days vector length mismatch: expected {expected_len}, got {}",
                data.len()
            )));
        }

        let mut days = Vec::with_capacity(days_count as usize);
        let mut cursor = 2usize;
        for _ in 0..days_count {
            let packed = u16::from_le_bytes([data[cursor], data[cursor + 1]]);
            let availability = data[cursor + 2];
            let final_price = u32::from_le_bytes([
                data[cursor + 3],
                data[cursor + 4],
                data[cursor + 5],
                data[cursor + 6],
            ]);
            let mask = u32::from_le_bytes([
                data[cursor + 7],
                data[cursor + 8],
                data[cursor + 9],
                data[cursor + 10],
            ]);
            cursor += DAY_RECORD_SIZE;

            days.push(DayAvailability {
                date: unpack_date_string(packed)?,
                availability,
                final_price,
                rate_features: expand_feature_mask(codecs, mask),
            });
        }

        out.push(PropertyAvailability { property_id, days });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use crate::protocol::value::pack_date;
    use bytes::BufMut;
    use chrono::{Datelike, Duration as ChronoDuration, Utc};

    fn codecs() -> Codecs {
        Codecs {
            amenities: vec![],
            rate_features: vec!["free_cancellation".into(), "breakfast".into()],
        }
    }

    fn num_days_field(n: u16) -> Field {
        Field {
            id: 1,
            field_type: field_type::BYTE,
            data: Bytes::copy_from_slice(&n.to_le_bytes()),
        }
    }

    fn property_field(id: u16, name: &str) -> Field {
        let mut raw = [0u8; 16];
        let n = name.len().min(6);
        raw[..n].copy_from_slice(&name.as_bytes()[..n]);
        raw[6] = 0xF0;
        Field {
            id,
            field_type: field_type::STRING,
            data: Bytes::copy_from_slice(&raw),
        }
    }

    fn days_field(id: u16, records: &[(u16, u8, u32, u32)]) -> Field {
        let mut data = bytes::BytesMut::new();
        data.put_u16_le(records.len() as u16);
        for (date, avail, price, mask) in records {
            data.put_u16_le(*date);
            data.put_u8(*avail);
            data.put_u32_le(*price);
            data.put_u32_le(*mask);
        }
        Field {
            id,
            field_type: field_type::VECTOR,
            data: data.freeze(),
        }
    }

    fn tomorrow_packed() -> (u16, String) {
        let date = Utc::now().date_naive() + ChronoDuration::days(1);
        let packed = pack_date(date, Utc::now().year()).unwrap();
        (packed, date.format("%Y-%m-%d").to_string())
    }

    #[test]
    fn test_build_search_avail_required_only() {
        let req = SearchAvailRequest {
            segment: "seg9".into(),
            room_type: "single".into(),
            ..Default::default()
        };
        let (name, fields) = decode_command(&build_search_avail(&req));
        assert_eq!(name, "SEARCHAVAIL");
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_build_search_avail_full() {
        let req = SearchAvailRequest {
            segment: "seg9".into(),
            room_type: "single".into(),
            area: Some("arA".into()),
            property_id: Some("p1".into()),
            property_type: Some("hotel".into()),
            stars: Some(4),
            category: Some("luxury".into()),
            amenities: vec!["wifi".into()],
            longitude: Some(-74.0),
            latitude: Some(40.7),
            dates: vec!["2027-03-14".into(), "2027-03-15".into()],
            availability: Some(1),
            final_price: Some(200),
            rate_features: vec!["free_cancellation".into()],
            limit: Some(100),
        };
        let (_, fields) = decode_command(&build_search_avail(&req));
        let ids: Vec<u16> = fields.iter().map(|f| f.id).collect();
        assert_eq!(
            ids,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F]
        );
        assert_eq!(fields[10].as_text(), "2027-03-14,2027-03-15");
    }

    #[test]
    fn test_parse_search_avail_roundtrip() {
        let (packed, iso) = tomorrow_packed();
        let result = success(vec![
            num_days_field(1),
            property_field(2, "p1"),
            days_field(3, &[(packed, 12, 150, 0b10)]),
        ]);
        let avail = parse_search_avail(Some(&codecs()), &result).unwrap();
        assert_eq!(avail.len(), 1);
        assert_eq!(avail[0].property_id, "p1");
        assert_eq!(avail[0].days.len(), 1);
        let day = &avail[0].days[0];
        assert_eq!(day.date, iso);
        assert_eq!(day.availability, 12);
        assert_eq!(day.final_price, 150);
        assert_eq!(day.rate_features, vec!["breakfast"]);
    }

    #[test]
    fn test_parse_search_avail_empty_result_set() {
        let result = success(vec![num_days_field(3)]);
        assert!(parse_search_avail(None, &result).unwrap().is_empty());
    }

    #[test]
    fn test_parse_search_avail_missing_days_vector() {
        let result = success(vec![num_days_field(1), property_field(2, "p1")]);
        let err = parse_search_avail(None, &result).unwrap_err();
        assert!(err.to_string().contains("missing days vector"));
    }

    #[test]
    fn test_parse_search_avail_day_count_mismatch() {
        let (packed, _) = tomorrow_packed();
        let result = success(vec![
            num_days_field(2),
            property_field(2, "p1"),
            days_field(3, &[(packed, 1, 1, 0)]),
        ]);
        let err = parse_search_avail(None, &result).unwrap_err();
        assert!(err.to_string().contains("days count mismatch"));
    }

    #[test]
    fn test_parse_search_avail_bad_first_field() {
        let result = success(vec![Field::byte(1, 1)]);
        let err = parse_search_avail(None, &result).unwrap_err();
        assert!(err.to_string().contains("num_days"));
    }

    #[test]
    fn test_parse_search_avail_server_error() {
        assert!(parse_search_avail(None, &error("NOT_FOUND:seg")).is_err());
    }
}
