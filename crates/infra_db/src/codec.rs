//! Row conversion helpers
//!
//! Enum-like domain values travel to TEXT columns through their serde
//! representation, so the wire names in the database match the sync
//! payload names exactly.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DatabaseError;

/// Serializes a unit-variant enum to its serde string name
pub(crate) fn enum_to_db<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    Ok(serde_json::from_value(serde_json::to_value(value)?)?)
}

/// Parses a TEXT column back into a unit-variant enum
pub(crate) fn enum_from_db<T: DeserializeOwned>(raw: &str) -> Result<T, DatabaseError> {
    Ok(serde_json::from_value(serde_json::Value::String(
        raw.to_string(),
    ))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_cycle::CycleStatus;

    #[test]
    fn test_enum_round_trip() {
        let db = enum_to_db(&CycleStatus::PendingReview).unwrap();
        assert_eq!(db, "PENDING_REVIEW");
        let back: CycleStatus = enum_from_db(&db).unwrap();
        assert_eq!(back, CycleStatus::PendingReview);
    }

    #[test]
    fn test_unknown_value_is_refused() {
        assert!(enum_from_db::<CycleStatus>("SHIPPED").is_err());
    }
}
