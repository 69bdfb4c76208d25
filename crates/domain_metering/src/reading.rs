//! Meter readings
//!
//! A reading is an absolute counter value tied to one (assignment, cycle).
//! It records the previous approved value it was compared against at
//! capture time, so consumption stays auditable even after later
//! reassignments. Approved readings are immutable; rejected readings are
//! retained, never deleted.

use chrono::{DateTime, Utc};
use core_kernel::{AssignmentId, CycleId, ReadingId, SubmissionKey, Volume, VolumeDelta};
use serde::{Deserialize, Serialize};

use crate::error::MeteringError;

/// Baseline or normal reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingKind {
    /// First reading on a new assignment; anchors future consumption,
    /// never billed itself
    Baseline,
    Normal,
}

/// Where the submission came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingSource {
    /// Captured interactively against the server
    Capture,
    /// Uploaded from a field device's offline queue
    Sync,
}

/// Approval status of a reading
///
/// The non-approved states are queryable reasons, not failures: a client
/// can always see why a reading has not yet been approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "state", content = "detail")]
pub enum ReadingStatus {
    /// Awaiting review
    Submitted,
    /// Suspected counter rollover; awaiting manual verification
    PendingRollover,
    /// Locked by a competing submission
    Conflicted,
    /// Terminal: value accepted and billable
    Approved,
    /// Terminal: retained with the reason it was refused
    Rejected { reason: String },
}

impl ReadingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadingStatus::Approved | ReadingStatus::Rejected { .. })
    }
}

/// An absolute volumetric reading for one (assignment, cycle)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    /// Client-assigned idempotency key for the submission
    pub submission_key: SubmissionKey,
    pub assignment_id: AssignmentId,
    pub cycle_id: CycleId,
    pub value: Volume,
    pub kind: ReadingKind,
    pub status: ReadingStatus,
    pub source: ReadingSource,
    /// The previous approved value this submission was compared against
    pub previous_value: Option<Volume>,
    /// Computed consumption; None until determined (e.g. pending rollover)
    pub consumption: Option<VolumeDelta>,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Reading {
    pub fn is_approved(&self) -> bool {
        self.status == ReadingStatus::Approved
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, ReadingStatus::Rejected { .. })
    }

    /// Marks the reading approved. Refused for terminal readings.
    pub(crate) fn approve(
        &mut self,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MeteringError> {
        if self.status.is_terminal() {
            return Err(MeteringError::ReadingImmutable {
                id: self.id,
                status: self.status.clone(),
            });
        }
        self.status = ReadingStatus::Approved;
        self.approved_by = Some(approved_by.to_string());
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Marks the reading rejected with a reason. Refused for approved
    /// readings; rejected readings are retained.
    pub(crate) fn reject(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), MeteringError> {
        if self.status == ReadingStatus::Approved {
            return Err(MeteringError::ReadingImmutable {
                id: self.id,
                status: self.status.clone(),
            });
        }
        self.status = ReadingStatus::Rejected {
            reason: reason.into(),
        };
        self.updated_at = now;
        Ok(())
    }

    /// Marks the reading rejected during conflict adjudication, bypassing
    /// the approved-immutability guard. Adjudication is the only path that
    /// may supersede a previously approved reading; the record is retained.
    pub(crate) fn mark_superseded(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = ReadingStatus::Rejected { reason };
        self.approved_by = None;
        self.approved_at = None;
        self.updated_at = now;
    }
}
