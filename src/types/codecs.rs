//! Server codec registry.
//!
//! The server owns the lookup tables needed to validate label inputs and
//! to expand bitmask fields. Clients fetch them once via `GETCODECS` and
//! cache them until a reconnect invalidates the cache.

/// Server-provided label tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codecs {
    /// Known amenity labels.
    pub amenities: Vec<String>,
    /// Known rate feature labels; position is the bit index in feature
    /// masks.
    pub rate_features: Vec<String>,
}

impl Codecs {
    /// Amenity labels absent from the registry, in input order.
    pub fn unknown_amenities(&self, input: &[String]) -> Vec<String> {
        unknown_labels(&self.amenities, input)
    }

    /// Rate feature labels absent from the registry, in input order.
    pub fn unknown_rate_features(&self, input: &[String]) -> Vec<String> {
        unknown_labels(&self.rate_features, input)
    }
}

fn unknown_labels(known: &[String], input: &[String]) -> Vec<String> {
    input
        .iter()
        .filter(|label| !known.contains(label))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Codecs {
        Codecs {
            amenities: vec!["wifi".into(), "pool".into()],
            rate_features: vec!["free_cancellation".into(), "breakfast".into()],
        }
    }

    #[test]
    fn test_unknown_amenities() {
        let codecs = registry();
        assert!(codecs.unknown_amenities(&["wifi".into()]).is_empty());
        assert_eq!(
            codecs.unknown_amenities(&["wifi".into(), "sauna".into()]),
            vec!["sauna".to_string()]
        );
    }

    #[test]
    fn test_unknown_rate_features() {
        let codecs = registry();
        assert_eq!(
            codecs.unknown_rate_features(&["breakfast".into(), "minibar".into()]),
            vec!["minibar".to_string()]
        );
    }
}
