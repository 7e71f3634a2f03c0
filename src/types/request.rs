//! Typed command requests and their validation.
//!
//! Validation is a pure function of the payload and the codec registry:
//! `verify(&self, codecs) -> Result<()>`. Every violation is collected
//! before failing, so a caller sees all problems at once.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};

use crate::error::{Result, RoomzinError};
use crate::types::Codecs;

/// Furthest bookable horizon, in days from today.
const MAX_DATE_HORIZON_DAYS: i64 = 365;

/// Validate one `YYYY-MM-DD` date: parseable, not in the past, within the
/// booking horizon. Violations are pushed onto `errors`.
fn validate_date(date: &str, errors: &mut Vec<String>) {
    let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        errors.push(format!("invalid date format: {date}, expected YYYY-MM-DD"));
        return;
    };
    let today = Utc::now().date_naive();
    if parsed < today {
        errors.push(format!("date {date} is in the past"));
    }
    if parsed > today + ChronoDuration::days(MAX_DATE_HORIZON_DAYS) {
        errors.push(format!(
            "date {date} is beyond {MAX_DATE_HORIZON_DAYS} days from today"
        ));
    }
}

fn finish(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RoomzinError::Validation(errors.join("; ")))
    }
}

fn require(value: &str, name: &str, errors: &mut Vec<String>) {
    if value.trim().is_empty() {
        errors.push(format!("{name} is required"));
    }
}

/// Payload of `SETPROP`: register or replace a property.
#[derive(Debug, Clone, Default)]
pub struct SetPropRequest {
    pub segment: String,
    pub area: String,
    pub property_id: String,
    pub property_type: String,
    pub category: String,
    pub stars: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub amenities: Vec<String>,
}

impl SetPropRequest {
    pub fn verify(&self, codecs: &Codecs) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.segment, "segment", &mut errors);
        require(&self.area, "area", &mut errors);
        require(&self.property_id, "propertyID", &mut errors);
        require(&self.property_type, "propertyType", &mut errors);
        require(&self.category, "category", &mut errors);
        if self.stars == 0 || self.stars > 5 {
            errors.push("stars must be between 1 and 5".to_string());
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            errors.push("latitude must be between -90 and 90".to_string());
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            errors.push("longitude must be between -180 and 180".to_string());
        }
        let unknown = codecs.unknown_amenities(&self.amenities);
        if !unknown.is_empty() {
            errors.push(format!("invalid amenities: {}", unknown.join(", ")));
        }
        finish(errors)
    }
}

/// Payload of `SEARCHPROP`: filter properties within a segment.
#[derive(Debug, Clone, Default)]
pub struct SearchPropRequest {
    pub segment: String,
    pub area: Option<String>,
    pub property_type: Option<String>,
    pub stars: Option<u8>,
    pub category: Option<String>,
    pub amenities: Vec<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub limit: Option<u64>,
}

impl SearchPropRequest {
    pub fn verify(&self, codecs: &Codecs) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.segment, "segment", &mut errors);
        if let Some(stars) = self.stars {
            if stars == 0 || stars > 5 {
                errors.push("stars must be between 1 and 5".to_string());
            }
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push("latitude must be between -90 and 90".to_string());
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                errors.push("longitude must be between -180 and 180".to_string());
            }
        }
        let unknown = codecs.unknown_amenities(&self.amenities);
        if !unknown.is_empty() {
            errors.push(format!("invalid amenities: {}", unknown.join(", ")));
        }
        finish(errors)
    }
}

/// Payload of `SEARCHAVAIL`: availability search across properties and
/// dates.
#[derive(Debug, Clone, Default)]
pub struct SearchAvailRequest {
    pub segment: String,
    pub room_type: String,
    pub area: Option<String>,
    pub property_id: Option<String>,
    pub property_type: Option<String>,
    pub stars: Option<u8>,
    pub category: Option<String>,
    pub amenities: Vec<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub dates: Vec<String>,
    pub availability: Option<u8>,
    pub final_price: Option<u32>,
    pub rate_features: Vec<String>,
    pub limit: Option<u64>,
}

impl SearchAvailRequest {
    pub fn verify(&self, codecs: &Codecs) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.segment, "segment", &mut errors);
        require(&self.room_type, "roomType", &mut errors);
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push("latitude must be between -90 and 90".to_string());
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                errors.push("longitude must be between -180 and 180".to_string());
            }
        }
        if self.dates.is_empty() {
            errors.push("at least one date is required".to_string());
        }
        for date in &self.dates {
            validate_date(date, &mut errors);
        }
        let unknown = codecs.unknown_rate_features(&self.rate_features);
        if !unknown.is_empty() {
            errors.push(format!("invalid rate features: {}", unknown.join(", ")));
        }
        if self.limit == Some(0) {
            errors.push("limit must be greater than 0".to_string());
        }
        finish(errors)
    }
}

/// Payload of `SETROOMPKG`: availability, pricing and rate features for a
/// room and date.
#[derive(Debug, Clone, Default)]
pub struct SetRoomPkgRequest {
    pub property_id: String,
    pub room_type: String,
    pub date: String,
    pub availability: Option<u8>,
    pub final_price: Option<u32>,
    pub rate_features: Vec<String>,
}

impl SetRoomPkgRequest {
    pub fn verify(&self, codecs: &Codecs) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.property_id, "propertyID", &mut errors);
        require(&self.room_type, "roomType", &mut errors);
        validate_date(&self.date, &mut errors);
        let unknown = codecs.unknown_rate_features(&self.rate_features);
        if !unknown.is_empty() {
            errors.push(format!("invalid rate features: {}", unknown.join(", ")));
        }
        finish(errors)
    }
}

/// Payload of `SETROOMAVL`, `INCROOMAVL` and `DECROOMAVL`.
#[derive(Debug, Clone, Default)]
pub struct UpdRoomAvlRequest {
    pub property_id: String,
    pub room_type: String,
    pub date: String,
    pub amount: u8,
}

impl UpdRoomAvlRequest {
    pub fn verify(&self) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.property_id, "propertyID", &mut errors);
        require(&self.room_type, "roomType", &mut errors);
        if self.amount == 0 {
            errors.push("amount must be greater than 0".to_string());
        }
        validate_date(&self.date, &mut errors);
        finish(errors)
    }
}

/// Addressing triple used by `GETPROPROOMDAY` and `DELROOMDAY`.
#[derive(Debug, Clone, Default)]
pub struct RoomDayKey {
    pub property_id: String,
    pub room_type: String,
    pub date: String,
}

impl RoomDayKey {
    pub fn verify(&self) -> Result<()> {
        let mut errors = Vec::new();
        require(&self.property_id, "propertyID", &mut errors);
        require(&self.room_type, "roomType", &mut errors);
        validate_date(&self.date, &mut errors);
        finish(errors)
    }
}

/// Validate a `propertyID`/`date` pair for `DELPROPDAY`.
pub(crate) fn verify_prop_day(property_id: &str, date: &str) -> Result<()> {
    let mut errors = Vec::new();
    require(property_id, "propertyID", &mut errors);
    validate_date(date, &mut errors);
    finish(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Codecs {
        Codecs {
            amenities: vec!["wifi".into(), "pool".into()],
            rate_features: vec!["free_cancellation".into()],
        }
    }

    fn tomorrow() -> String {
        (Utc::now().date_naive() + ChronoDuration::days(1))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn valid_set_prop() -> SetPropRequest {
        SetPropRequest {
            segment: "seg1".into(),
            area: "arA".into(),
            property_id: "p1".into(),
            property_type: "hotel".into(),
            category: "luxury".into(),
            stars: 4,
            latitude: 40.7,
            longitude: -74.0,
            amenities: vec!["wifi".into()],
        }
    }

    #[test]
    fn test_set_prop_valid() {
        assert!(valid_set_prop().verify(&registry()).is_ok());
    }

    #[test]
    fn test_set_prop_collects_all_errors() {
        let req = SetPropRequest {
            stars: 9,
            latitude: 200.0,
            amenities: vec!["sauna".into()],
            ..Default::default()
        };
        let err = req.verify(&registry()).unwrap_err().to_string();
        assert!(err.contains("segment is required"));
        assert!(err.contains("stars"));
        assert!(err.contains("latitude"));
        assert!(err.contains("invalid amenities: sauna"));
    }

    #[test]
    fn test_search_avail_requires_dates() {
        let req = SearchAvailRequest {
            segment: "s".into(),
            room_type: "single".into(),
            ..Default::default()
        };
        let err = req.verify(&registry()).unwrap_err().to_string();
        assert!(err.contains("at least one date"));
    }

    #[test]
    fn test_search_avail_valid() {
        let req = SearchAvailRequest {
            segment: "s".into(),
            room_type: "single".into(),
            dates: vec![tomorrow()],
            rate_features: vec!["free_cancellation".into()],
            ..Default::default()
        };
        assert!(req.verify(&registry()).is_ok());
    }

    #[test]
    fn test_date_format_rejected() {
        let req = UpdRoomAvlRequest {
            property_id: "p".into(),
            room_type: "r".into(),
            date: "2026/01/01".into(),
            amount: 1,
        };
        let err = req.verify().unwrap_err().to_string();
        assert!(err.contains("invalid date format"));
    }

    #[test]
    fn test_past_date_rejected() {
        let req = RoomDayKey {
            property_id: "p".into(),
            room_type: "r".into(),
            date: "2000-01-01".into(),
        };
        let err = req.verify().unwrap_err().to_string();
        assert!(err.contains("in the past"));
    }

    #[test]
    fn test_far_future_date_rejected() {
        let far = (Utc::now().date_naive() + ChronoDuration::days(800))
            .format("%Y-%m-%d")
            .to_string();
        let mut errors = Vec::new();
        validate_date(&far, &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("beyond 365 days"));
    }

    #[test]
    fn test_upd_room_avl_zero_amount() {
        let req = UpdRoomAvlRequest {
            property_id: "p".into(),
            room_type: "r".into(),
            date: tomorrow(),
            amount: 0,
        };
        let err = req.verify().unwrap_err().to_string();
        assert!(err.contains("amount"));
    }

    #[test]
    fn test_verify_prop_day() {
        assert!(verify_prop_day("p1", &tomorrow()).is_ok());
        assert!(verify_prop_day("", &tomorrow()).is_err());
    }

    #[test]
    fn test_search_prop_optional_bounds() {
        let req = SearchPropRequest {
            segment: "s".into(),
            stars: Some(6),
            longitude: Some(200.0),
            ..Default::default()
        };
        let err = req.verify(&registry()).unwrap_err().to_string();
        assert!(err.contains("stars"));
        assert!(err.contains("longitude"));
    }
}
