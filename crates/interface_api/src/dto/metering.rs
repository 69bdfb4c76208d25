//! Metering DTOs

use chrono::{DateTime, Utc};
use domain_metering::{
    Anomaly, AnomalyKind, AnomalyStatus, Conflict, MeterAssignment, Reading, ReadingSource,
    ReadingStatus, Resolution, ResolutionDecision, RolloverVerdict, SubmissionOutcome,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct AssignMeterRequest {
    pub meter_id: Uuid,
    pub client_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub meter_id: Uuid,
    pub client_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&MeterAssignment> for AssignmentResponse {
    fn from(a: &MeterAssignment) -> Self {
        Self {
            id: *a.id.as_uuid(),
            meter_id: *a.meter_id.as_uuid(),
            client_id: *a.client_id.as_uuid(),
            status: format!("{:?}", a.status).to_uppercase(),
            started_at: a.started_at,
            ended_at: a.ended_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitReadingRequest {
    /// Client-assigned idempotency key
    pub submission_key: Uuid,
    pub assignment_id: Uuid,
    pub cycle_id: Uuid,
    pub value: Decimal,
    #[validate(length(min = 1))]
    pub submitted_by: String,
    pub source: ReadingSource,
    pub note: Option<String>,
    #[serde(default)]
    pub allow_late: bool,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitReadingResponse {
    pub outcome: String,
    pub reading_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_id: Option<Uuid>,
    /// Slot version after the submission, for the next optimistic write
    pub slot_version: u64,
}

impl SubmitReadingResponse {
    pub fn from_outcome(outcome: &SubmissionOutcome, slot_version: u64) -> Self {
        let (name, conflict_id) = match outcome {
            SubmissionOutcome::Accepted(_) => ("ACCEPTED", None),
            SubmissionOutcome::Baseline(_) => ("BASELINE", None),
            SubmissionOutcome::PendingRollover(_) => ("PENDING_ROLLOVER", None),
            SubmissionOutcome::Conflicted { conflict_id, .. } => {
                ("CONFLICTED", Some(*conflict_id.as_uuid()))
            }
            SubmissionOutcome::Replayed(_) => ("REPLAYED", None),
        };
        Self {
            outcome: name.to_string(),
            reading_id: *outcome.reading_id().as_uuid(),
            conflict_id,
            slot_version,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub id: Uuid,
    pub submission_key: Uuid,
    pub assignment_id: Uuid,
    pub cycle_id: Uuid,
    pub value: Decimal,
    pub status: ReadingStatus,
    pub previous_value: Option<Decimal>,
    pub consumption: Option<Decimal>,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<&Reading> for ReadingResponse {
    fn from(r: &Reading) -> Self {
        Self {
            id: *r.id.as_uuid(),
            submission_key: *r.submission_key.as_uuid(),
            assignment_id: *r.assignment_id.as_uuid(),
            cycle_id: *r.cycle_id.as_uuid(),
            value: r.value.value(),
            status: r.status.clone(),
            previous_value: r.previous_value.map(|v| v.value()),
            consumption: r.consumption.map(|c| c.value()),
            submitted_by: r.submitted_by.clone(),
            submitted_at: r.submitted_at,
            approved_by: r.approved_by.clone(),
            approved_at: r.approved_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectReadingRequest {
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRolloverRequest {
    pub verdict: RolloverVerdict,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveConflictRequest {
    pub decision: ResolutionDecision,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub cycle_id: Uuid,
    pub status: String,
    pub first_value: Decimal,
    pub second_value: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<&Conflict> for ConflictResponse {
    fn from(c: &Conflict) -> Self {
        Self {
            id: *c.id.as_uuid(),
            assignment_id: *c.assignment_id.as_uuid(),
            cycle_id: *c.cycle_id.as_uuid(),
            status: format!("{:?}", c.status).to_uppercase(),
            first_value: c.first.value.value(),
            second_value: c.second.value.value(),
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResolutionResponse {
    pub selected_value: Decimal,
    pub winning_reading: Uuid,
    pub rejected_readings: Vec<Uuid>,
    pub resolved_by: String,
    pub reason: String,
    pub resolved_at: DateTime<Utc>,
}

impl From<&Resolution> for ResolutionResponse {
    fn from(r: &Resolution) -> Self {
        Self {
            selected_value: r.selected_value.value(),
            winning_reading: *r.winning_reading.as_uuid(),
            rejected_readings: r.rejected_readings.iter().map(|id| *id.as_uuid()).collect(),
            resolved_by: r.resolved_by.clone(),
            reason: r.reason.clone(),
            resolved_at: r.resolved_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveAnomalyRequest {
    #[validate(length(min = 1))]
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct AnomalyResponse {
    pub id: Uuid,
    pub kind: AnomalyKind,
    pub assignment_id: Uuid,
    pub cycle_id: Uuid,
    pub reading_id: Uuid,
    pub detail: String,
    pub status: AnomalyStatus,
    pub detected_at: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
}

impl From<&Anomaly> for AnomalyResponse {
    fn from(a: &Anomaly) -> Self {
        Self {
            id: *a.id.as_uuid(),
            kind: a.kind.clone(),
            assignment_id: *a.assignment_id.as_uuid(),
            cycle_id: *a.cycle_id.as_uuid(),
            reading_id: *a.reading_id.as_uuid(),
            detail: a.detail.clone(),
            status: a.status,
            detected_at: a.detected_at,
            acknowledged_by: a.acknowledged_by.clone(),
            resolved_by: a.resolved_by.clone(),
            resolution_note: a.resolution_note.clone(),
        }
    }
}
