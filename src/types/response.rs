//! Typed command responses.

/// One day of availability and pricing inside a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayAvailability {
    /// ISO `YYYY-MM-DD`.
    pub date: String,
    pub availability: u8,
    pub final_price: u32,
    /// Rate feature labels expanded from the wire bitmask.
    pub rate_features: Vec<String>,
}

/// One property and all its matched days, as returned by `SEARCHAVAIL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyAvailability {
    pub property_id: String,
    pub days: Vec<DayAvailability>,
}

/// Availability and pricing for one room and date, as returned by
/// `GETPROPROOMDAY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDay {
    pub property_id: String,
    pub date: String,
    pub availability: u8,
    pub final_price: u32,
    pub rate_features: Vec<String>,
}

/// One segment and its property count, as returned by `GETSEGMENTS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub segment: String,
    pub property_count: u32,
}
