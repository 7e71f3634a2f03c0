//! Specialized value codecs: packed dates, compact property identifiers,
//! and feature bitmasks.
//!
//! These are protocol-level codecs, not business logic: the server packs
//! calendar dates into 16 bits, property identifiers into 16 bytes, and
//! rate features into a 24-bit mask interpreted against the server-provided
//! codec registry.

use chrono::{Datelike, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{Result, RoomzinError};
use crate::types::Codecs;

/// Marker at byte 6 selecting the short-string identifier form.
const SHORT_STRING_MARKER: u8 = 0xF0;

/// UUID versions the identifier codec accepts.
const UUID_VERSIONS: [u8; 6] = [1, 2, 3, 4, 5, 7];

/// Width of the feature bitmask in bits.
const FEATURE_MASK_BITS: usize = 24;

/// Unpack a 16-bit packed date against the current UTC year.
///
/// Bit layout: `year_offset:3 | month0:4 | day0:5` with month and day
/// stored zero-based.
pub fn unpack_date(packed: u16) -> Result<NaiveDate> {
    unpack_date_with_base(packed, Utc::now().year())
}

/// Unpack a 16-bit packed date against an explicit base year.
///
/// The reconstructed month and day must form a real calendar date, so a
/// value like February 30th fails with a decode error.
///
/// # Example
///
/// ```
/// use roomzin_client::protocol::value::{pack_date, unpack_date_with_base};
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2027, 3, 14).unwrap();
/// let packed = pack_date(date, 2026).unwrap();
/// assert_eq!(unpack_date_with_base(packed, 2026).unwrap(), date);
/// ```
pub fn unpack_date_with_base(packed: u16, base_year: i32) -> Result<NaiveDate> {
    let year_offset = ((packed >> 9) & 0b111) as i32;
    let month = (((packed >> 5) & 0b1111) + 1) as u32;
    let day = ((packed & 0b11111) + 1) as u32;

    NaiveDate::from_ymd_opt(base_year + year_offset, month, day)
        .ok_or_else(|| RoomzinError::Decode(format!("invalid packed date 0x{packed:04x}")))
}

/// Pack a date into the 16-bit wire form relative to a base year.
///
/// The year must fall within the 3-bit offset window above the base year.
pub fn pack_date(date: NaiveDate, base_year: i32) -> Result<u16> {
    let offset = date.year() - base_year;
    if !(0..8).contains(&offset) {
        return Err(RoomzinError::Decode(format!(
            "year {} outside packed window [{base_year}, {})",
            date.year(),
            base_year + 8
        )));
    }
    Ok(((offset as u16) << 9) | (((date.month() - 1) as u16) << 5) | ((date.day() - 1) as u16))
}

/// Unpack a 16-bit packed date to its ISO `YYYY-MM-DD` form.
pub fn unpack_date_string(packed: u16) -> Result<String> {
    Ok(unpack_date(packed)?.format("%Y-%m-%d").to_string())
}

/// Decode a compact 16-byte property identifier.
///
/// Two server forms exist: a short-string encoding (byte 6 is `0xF0`, text
/// runs on either side of it) and a raw UUID. Anything else, including
/// buffers shorter than 7 bytes, decodes to an empty identifier; the server
/// is trusted to emit one of the known forms.
pub fn decode_property_id(data: &[u8]) -> String {
    if data.len() < 7 {
        return String::new();
    }

    if data[6] == SHORT_STRING_MARKER {
        let left_end = data[..6].iter().position(|&b| b == 0).unwrap_or(6);
        let right = &data[7..];
        let right_end = right.iter().position(|&b| b == 0).unwrap_or(right.len());

        let mut out = Vec::with_capacity(left_end + right_end);
        out.extend_from_slice(&data[..left_end]);
        out.extend_from_slice(&right[..right_end]);
        return String::from_utf8_lossy(&out).into_owned();
    }

    let version = (data[6] & 0xF0) >> 4;
    if UUID_VERSIONS.contains(&version) {
        let mut bytes = [0u8; 16];
        let n = data.len().min(16);
        bytes[..n].copy_from_slice(&data[..n]);
        return Uuid::from_bytes(bytes).hyphenated().to_string();
    }

    String::new()
}

/// Expand a 24-bit feature mask into registry labels, registry order.
///
/// Without a registry there is nothing to name bits after, so the result is
/// empty; this never fails.
pub fn expand_feature_mask(codecs: Option<&Codecs>, mask: u32) -> Vec<String> {
    let Some(codecs) = codecs else {
        return Vec::new();
    };
    let labels = &codecs.rate_features;

    let mut out = Vec::new();
    for (i, label) in labels.iter().enumerate().take(FEATURE_MASK_BITS) {
        if mask & (1 << i) != 0 {
            out.push(label.clone());
        }
    }
    out
}
