//! Versioned sync payloads
//!
//! Every record crossing the sync boundary travels in an explicitly
//! tagged envelope carrying a schema version. Unknown tags and stale
//! versions fail deserialization deterministically instead of being
//! duck-typed into the wrong shape.

use chrono::{DateTime, Utc};
use domain_cycle::BillingCycle;
use domain_metering::{Conflict, MeterAssignment, Reading};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version of the sync payload schema this build speaks
pub const SCHEMA_VERSION: u32 = 1;

/// One authoritative record, tagged by entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "entity", content = "record")]
pub enum EntityPayload {
    Cycle(BillingCycle),
    Assignment(MeterAssignment),
    Reading(Reading),
    Conflict(Conflict),
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Cycle(_) => EntityKind::Cycle,
            EntityPayload::Assignment(_) => EntityKind::Assignment,
            EntityPayload::Reading(_) => EntityKind::Reading,
            EntityPayload::Conflict(_) => EntityKind::Conflict,
        }
    }

    /// The record's server-side identifier
    pub fn entity_id(&self) -> Uuid {
        match self {
            EntityPayload::Cycle(c) => *c.id.as_uuid(),
            EntityPayload::Assignment(a) => *a.id.as_uuid(),
            EntityPayload::Reading(r) => *r.id.as_uuid(),
            EntityPayload::Conflict(c) => *c.id.as_uuid(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Cycle,
    Assignment,
    Reading,
    Conflict,
}

/// Why a previously-sent record is no longer part of the working set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TombstoneReason {
    CycleClosed,
    CycleArchived,
    AssignmentEnded,
    ReadingRejected,
}

/// Marker telling the client to drop a cached record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub kind: EntityKind,
    pub entity_id: Uuid,
    pub reason: TombstoneReason,
    pub at: DateTime<Utc>,
}

/// Full-snapshot response for a fresh or reset client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResponse {
    pub schema_version: u32,
    pub cycles: Vec<BillingCycle>,
    pub assignments: Vec<MeterAssignment>,
    pub readings: Vec<Reading>,
    pub conflicts: Vec<Conflict>,
    /// Opaque token for the next incremental pass
    pub checkpoint: String,
}

/// Incremental response: changed records plus tombstones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaResponse {
    pub schema_version: u32,
    pub upserts: Vec<EntityPayload>,
    pub tombstones: Vec<Tombstone>,
    pub checkpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_entity_tag_fails_deserialization() {
        let json = r#"{"entity":"INVOICE","record":{}}"#;
        assert!(serde_json::from_str::<EntityPayload>(json).is_err());
    }

    #[test]
    fn test_tombstone_wire_shape() {
        let tombstone = Tombstone {
            kind: EntityKind::Reading,
            entity_id: Uuid::nil(),
            reason: TombstoneReason::ReadingRejected,
            at: Utc::now(),
        };
        let json = serde_json::to_string(&tombstone).unwrap();
        assert!(json.contains("\"READING\""));
        assert!(json.contains("READING_REJECTED"));
    }
}
