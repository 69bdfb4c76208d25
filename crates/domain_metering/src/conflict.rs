//! Competing-submission conflicts
//!
//! A conflict is created when a second, differing submission arrives for an
//! (assignment, cycle) that already has a non-rejected reading. Both
//! submissions are locked until a human adjudicates. Resolution is a pure
//! function over the two candidates and the resolver's decision, so any
//! caller (HTTP handler, sync upload path, admin tool) shares one tested
//! path.

use chrono::{DateTime, Utc};
use core_kernel::{AssignmentId, ConflictId, CycleId, ReadingId, Volume};
use serde::{Deserialize, Serialize};

use crate::error::MeteringError;

/// One side of a conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub reading_id: ReadingId,
    pub value: Volume,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
}

/// Conflict lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStatus {
    Open,
    Resolved,
}

/// The resolver's decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "decision", content = "value")]
pub enum ResolutionDecision {
    /// Accept the first submission's value
    AcceptFirst,
    /// Accept the second submission's value
    AcceptSecond,
    /// Supply a value different from both candidates
    Override(Volume),
}

/// Recorded outcome of an adjudication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub selected_value: Volume,
    /// The submission whose reading carries the selected value forward
    pub winning_reading: ReadingId,
    /// Submissions marked rejected (retained, never deleted)
    pub rejected_readings: Vec<ReadingId>,
    pub resolved_by: String,
    pub reason: String,
    pub resolved_at: DateTime<Utc>,
}

/// A competing-submission record for one (assignment, cycle)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub assignment_id: AssignmentId,
    pub cycle_id: CycleId,
    pub first: Submission,
    pub second: Submission,
    pub status: ConflictStatus,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conflict {
    pub fn open(
        assignment_id: AssignmentId,
        cycle_id: CycleId,
        first: Submission,
        second: Submission,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConflictId::new_v7(),
            assignment_id,
            cycle_id,
            first,
            second,
            status: ConflictStatus::Open,
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ConflictStatus::Resolved
    }

    /// The value a resolved conflict settled on, if any
    pub fn resolved_value(&self) -> Option<Volume> {
        self.resolution.as_ref().map(|r| r.selected_value)
    }
}

/// Adjudicates a conflict
///
/// Pure: computes the resolution from the two candidates and the decision.
/// The caller applies the returned resolution to the conflict record and
/// the affected readings. A blank reason is refused — adjudication always
/// carries a justification.
pub fn resolve_conflict(
    conflict: &Conflict,
    decision: ResolutionDecision,
    resolved_by: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Resolution, MeteringError> {
    if conflict.is_resolved() {
        return Err(MeteringError::ConflictAlreadyResolved(conflict.id));
    }
    if reason.trim().is_empty() {
        return Err(MeteringError::InsufficientJustification);
    }

    let (selected_value, winning_reading, rejected) = match decision {
        ResolutionDecision::AcceptFirst => (
            conflict.first.value,
            conflict.first.reading_id,
            vec![conflict.second.reading_id],
        ),
        ResolutionDecision::AcceptSecond => (
            conflict.second.value,
            conflict.second.reading_id,
            vec![conflict.first.reading_id],
        ),
        // The first submission carries the override forward; the second is
        // rejected like any other losing candidate.
        ResolutionDecision::Override(value) => (
            value,
            conflict.first.reading_id,
            vec![conflict.second.reading_id],
        ),
    };

    Ok(Resolution {
        selected_value,
        winning_reading,
        rejected_readings: rejected,
        resolved_by: resolved_by.to_string(),
        reason: reason.to_string(),
        resolved_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn v(value: rust_decimal::Decimal) -> Volume {
        Volume::new(value).unwrap()
    }

    fn conflict() -> Conflict {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
        Conflict::open(
            AssignmentId::new(),
            CycleId::new(),
            Submission {
                reading_id: ReadingId::new_v7(),
                value: v(dec!(150.0000)),
                submitted_by: "collector-1".to_string(),
                submitted_at: now,
            },
            Submission {
                reading_id: ReadingId::new_v7(),
                value: v(dec!(155.0000)),
                submitted_by: "collector-2".to_string(),
                submitted_at: now,
            },
            now,
        )
    }

    #[test]
    fn test_accept_second_rejects_first() {
        let c = conflict();
        let resolution = resolve_conflict(
            &c,
            ResolutionDecision::AcceptSecond,
            "admin-1",
            "second photo is legible",
            c.created_at,
        )
        .unwrap();

        assert_eq!(resolution.selected_value, v(dec!(155.0000)));
        assert_eq!(resolution.winning_reading, c.second.reading_id);
        assert_eq!(resolution.rejected_readings, vec![c.first.reading_id]);
    }

    #[test]
    fn test_override_uses_supplied_value() {
        let c = conflict();
        let resolution = resolve_conflict(
            &c,
            ResolutionDecision::Override(v(dec!(152.0000))),
            "admin-1",
            "re-read the meter on site",
            c.created_at,
        )
        .unwrap();

        assert_eq!(resolution.selected_value, v(dec!(152.0000)));
        assert_eq!(resolution.rejected_readings, vec![c.second.reading_id]);
    }

    #[test]
    fn test_blank_reason_refused() {
        let c = conflict();
        let err = resolve_conflict(
            &c,
            ResolutionDecision::AcceptFirst,
            "admin-1",
            "   ",
            c.created_at,
        )
        .unwrap_err();

        assert_eq!(err, MeteringError::InsufficientJustification);
    }

    #[test]
    fn test_resolved_conflict_refuses_second_resolution() {
        let mut c = conflict();
        c.status = ConflictStatus::Resolved;

        let err = resolve_conflict(
            &c,
            ResolutionDecision::AcceptFirst,
            "admin-1",
            "valid reason",
            c.created_at,
        )
        .unwrap_err();

        assert_eq!(err, MeteringError::ConflictAlreadyResolved(c.id));
    }
}
