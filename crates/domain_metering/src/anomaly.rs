//! Anomaly records
//!
//! Non-blocking observations for operator review: billing proceeds while
//! the anomaly is open, and an operator acknowledges or resolves it.

use chrono::{DateTime, Utc};
use core_kernel::{AnomalyId, AssignmentId, CycleId, ReadingId};
use serde::{Deserialize, Serialize};

/// What was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// Counter moved backwards outside the rollover band
    NegativeConsumption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyStatus {
    Detected,
    Acknowledged,
    Resolved,
}

/// An operator-review observation tied to a reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: AnomalyId,
    pub kind: AnomalyKind,
    pub assignment_id: AssignmentId,
    pub cycle_id: CycleId,
    pub reading_id: ReadingId,
    pub detail: String,
    pub status: AnomalyStatus,
    pub detected_at: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
}

impl Anomaly {
    pub fn detect(
        kind: AnomalyKind,
        assignment_id: AssignmentId,
        cycle_id: CycleId,
        reading_id: ReadingId,
        detail: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AnomalyId::new_v7(),
            kind,
            assignment_id,
            cycle_id,
            reading_id,
            detail: detail.into(),
            status: AnomalyStatus::Detected,
            detected_at: now,
            acknowledged_by: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    pub fn acknowledge(&mut self, by: &str) {
        if self.status == AnomalyStatus::Detected {
            self.status = AnomalyStatus::Acknowledged;
            self.acknowledged_by = Some(by.to_string());
        }
    }

    pub fn resolve(&mut self, by: &str, note: impl Into<String>) {
        self.status = AnomalyStatus::Resolved;
        self.resolved_by = Some(by.to_string());
        self.resolution_note = Some(note.into());
    }
}
