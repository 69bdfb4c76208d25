//! Metering repository
//!
//! Assignments, readings, conflicts, and anomalies. Reading writes for
//! one (assignment, cycle) slot go through a compare-and-bump on the
//! slot's version row, so two concurrent submissions cannot both commit:
//! the loser sees a stale version and is routed back through conflict
//! detection.

use chrono::{DateTime, Utc};
use core_kernel::{
    AssignmentId, ClientId, ConflictId, CycleId, MeterId, ReadingId, SubmissionKey, Volume,
    VolumeDelta,
};
use domain_metering::{
    Anomaly, Conflict, MeterAssignment, Reading, ReadingKind, ReadingSource, ReadingStatus,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::codec::{enum_from_db, enum_to_db};
use crate::error::DatabaseError;

/// Database access for the metering domain
#[derive(Debug, Clone)]
pub struct MeteringRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    assignment_id: Uuid,
    meter_id: Uuid,
    client_id: Uuid,
    status: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl AssignmentRow {
    fn into_domain(self) -> Result<MeterAssignment, DatabaseError> {
        Ok(MeterAssignment {
            id: AssignmentId::from(self.assignment_id),
            meter_id: MeterId::from(self.meter_id),
            client_id: ClientId::from(self.client_id),
            status: enum_from_db(&self.status)?,
            started_at: self.started_at,
            ended_at: self.ended_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReadingRow {
    reading_id: Uuid,
    submission_key: Uuid,
    assignment_id: Uuid,
    cycle_id: Uuid,
    value: Decimal,
    kind: String,
    status: serde_json::Value,
    source: String,
    previous_value: Option<Decimal>,
    consumption: Option<Decimal>,
    submitted_by: String,
    submitted_at: DateTime<Utc>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    note: Option<String>,
    updated_at: DateTime<Utc>,
}

impl ReadingRow {
    fn into_domain(self) -> Result<Reading, DatabaseError> {
        let value = Volume::new(self.value)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
        let previous_value = self
            .previous_value
            .map(Volume::new)
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
        let kind: ReadingKind = enum_from_db(&self.kind)?;
        let source: ReadingSource = enum_from_db(&self.source)?;
        let status: ReadingStatus = serde_json::from_value(self.status)?;

        Ok(Reading {
            id: ReadingId::from(self.reading_id),
            submission_key: SubmissionKey::from(self.submission_key),
            assignment_id: AssignmentId::from(self.assignment_id),
            cycle_id: CycleId::from(self.cycle_id),
            value,
            kind,
            status,
            source,
            previous_value,
            consumption: self.consumption.map(VolumeDelta::new),
            submitted_by: self.submitted_by,
            submitted_at: self.submitted_at,
            approved_by: self.approved_by,
            approved_at: self.approved_at,
            note: self.note,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConflictRow {
    conflict_id: Uuid,
    assignment_id: Uuid,
    cycle_id: Uuid,
    first_submission: serde_json::Value,
    second_submission: serde_json::Value,
    status: String,
    resolution: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConflictRow {
    fn into_domain(self) -> Result<Conflict, DatabaseError> {
        Ok(Conflict {
            id: ConflictId::from(self.conflict_id),
            assignment_id: AssignmentId::from(self.assignment_id),
            cycle_id: CycleId::from(self.cycle_id),
            first: serde_json::from_value(self.first_submission)?,
            second: serde_json::from_value(self.second_submission)?,
            status: enum_from_db(&self.status)?,
            resolution: self.resolution.map(serde_json::from_value).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const READING_COLUMNS: &str = "reading_id, submission_key, assignment_id, cycle_id, value, kind, \
                               status, source, previous_value, consumption, submitted_by, \
                               submitted_at, approved_by, approved_at, note, updated_at";

const CONFLICT_COLUMNS: &str = "conflict_id, assignment_id, cycle_id, first_submission, \
                                second_submission, status, resolution, created_at, updated_at";

impl MeteringRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // assignments

    pub async fn insert_assignment(
        &self,
        assignment: &MeterAssignment,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO meter_assignments (assignment_id, meter_id, client_id, status, \
             started_at, ended_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(assignment.id.as_uuid())
        .bind(assignment.meter_id.as_uuid())
        .bind(assignment.client_id.as_uuid())
        .bind(enum_to_db(&assignment.status)?)
        .bind(assignment.started_at)
        .bind(assignment.ended_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_assignment(
        &self,
        assignment: &MeterAssignment,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE meter_assignments SET status = $2, ended_at = $3, updated_at = $4 \
             WHERE assignment_id = $1",
        )
        .bind(assignment.id.as_uuid())
        .bind(enum_to_db(&assignment.status)?)
        .bind(assignment.ended_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("MeterAssignment", assignment.id));
        }
        Ok(())
    }

    pub async fn active_assignments(&self) -> Result<Vec<MeterAssignment>, DatabaseError> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            "SELECT assignment_id, meter_id, client_id, status, started_at, ended_at, updated_at \
             FROM meter_assignments WHERE status = 'ACTIVE' ORDER BY started_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AssignmentRow::into_domain).collect()
    }

    pub async fn assignments_changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<MeterAssignment>, DatabaseError> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            "SELECT assignment_id, meter_id, client_id, status, started_at, ended_at, updated_at \
             FROM meter_assignments WHERE updated_at > $1 ORDER BY updated_at",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AssignmentRow::into_domain).collect()
    }

    // readings

    /// Inserts a reading under the slot's optimistic version
    ///
    /// When `expected_version` is given, the slot's version row must still
    /// match it or the write fails with [`DatabaseError::StaleWrite`] and
    /// nothing is committed.
    pub async fn insert_reading(
        &self,
        reading: &Reading,
        expected_version: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        self.bump_slot(
            &mut tx,
            reading.assignment_id,
            reading.cycle_id,
            expected_version,
        )
        .await?;

        sqlx::query(
            "INSERT INTO readings (reading_id, submission_key, assignment_id, cycle_id, value, \
             kind, status, source, previous_value, consumption, submitted_by, submitted_at, \
             approved_by, approved_at, note, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(reading.id.as_uuid())
        .bind(reading.submission_key.as_uuid())
        .bind(reading.assignment_id.as_uuid())
        .bind(reading.cycle_id.as_uuid())
        .bind(reading.value.value())
        .bind(enum_to_db(&reading.kind)?)
        .bind(serde_json::to_value(&reading.status)?)
        .bind(enum_to_db(&reading.source)?)
        .bind(reading.previous_value.map(|v| v.value()))
        .bind(reading.consumption.map(|c| c.value()))
        .bind(&reading.submitted_by)
        .bind(reading.submitted_at)
        .bind(&reading.approved_by)
        .bind(reading.approved_at)
        .bind(&reading.note)
        .bind(reading.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Persists a status, consumption, or approval change
    pub async fn update_reading(&self, reading: &Reading) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE readings SET value = $2, status = $3, consumption = $4, approved_by = $5, \
             approved_at = $6, updated_at = $7 WHERE reading_id = $1",
        )
        .bind(reading.id.as_uuid())
        .bind(reading.value.value())
        .bind(serde_json::to_value(&reading.status)?)
        .bind(reading.consumption.map(|c| c.value()))
        .bind(&reading.approved_by)
        .bind(reading.approved_at)
        .bind(reading.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Reading", reading.id));
        }
        Ok(())
    }

    pub async fn fetch_reading(&self, id: ReadingId) -> Result<Reading, DatabaseError> {
        let row: ReadingRow = sqlx::query_as(&format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE reading_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Reading", id))?;
        row.into_domain()
    }

    pub async fn reading_by_key(
        &self,
        key: SubmissionKey,
    ) -> Result<Option<Reading>, DatabaseError> {
        let row: Option<ReadingRow> = sqlx::query_as(&format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE submission_key = $1"
        ))
        .bind(key.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ReadingRow::into_domain).transpose()
    }

    pub async fn readings_for_slot(
        &self,
        assignment_id: AssignmentId,
        cycle_id: CycleId,
    ) -> Result<Vec<Reading>, DatabaseError> {
        let rows: Vec<ReadingRow> = sqlx::query_as(&format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE assignment_id = $1 AND cycle_id = $2 ORDER BY submitted_at"
        ))
        .bind(assignment_id.as_uuid())
        .bind(cycle_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReadingRow::into_domain).collect()
    }

    /// Approved readings in any of the given cycles
    pub async fn approved_readings_in(
        &self,
        cycles: &[CycleId],
    ) -> Result<Vec<Reading>, DatabaseError> {
        let ids: Vec<Uuid> = cycles.iter().map(|c| *c.as_uuid()).collect();
        let rows: Vec<ReadingRow> = sqlx::query_as(&format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE cycle_id = ANY($1) AND status->>'state' = 'APPROVED' ORDER BY submitted_at"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReadingRow::into_domain).collect()
    }

    pub async fn readings_changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, DatabaseError> {
        let rows: Vec<ReadingRow> = sqlx::query_as(&format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE updated_at > $1 ORDER BY updated_at"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReadingRow::into_domain).collect()
    }

    async fn bump_slot(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        assignment_id: AssignmentId,
        cycle_id: CycleId,
        expected_version: Option<i64>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO reading_slots (assignment_id, cycle_id, version) VALUES ($1, $2, 0) \
             ON CONFLICT (assignment_id, cycle_id) DO NOTHING",
        )
        .bind(assignment_id.as_uuid())
        .bind(cycle_id.as_uuid())
        .execute(&mut **tx)
        .await?;

        let result = match expected_version {
            Some(expected) => {
                sqlx::query(
                    "UPDATE reading_slots SET version = version + 1 \
                     WHERE assignment_id = $1 AND cycle_id = $2 AND version = $3",
                )
                .bind(assignment_id.as_uuid())
                .bind(cycle_id.as_uuid())
                .bind(expected)
                .execute(&mut **tx)
                .await?
            }
            None => {
                sqlx::query(
                    "UPDATE reading_slots SET version = version + 1 \
                     WHERE assignment_id = $1 AND cycle_id = $2",
                )
                .bind(assignment_id.as_uuid())
                .bind(cycle_id.as_uuid())
                .execute(&mut **tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(DatabaseError::StaleWrite(format!(
                "slot ({assignment_id}, {cycle_id}) moved past version {expected_version:?}"
            )));
        }
        Ok(())
    }

    // conflicts

    pub async fn insert_conflict(&self, conflict: &Conflict) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO conflicts (conflict_id, assignment_id, cycle_id, first_submission, \
             second_submission, status, resolution, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(conflict.id.as_uuid())
        .bind(conflict.assignment_id.as_uuid())
        .bind(conflict.cycle_id.as_uuid())
        .bind(serde_json::to_value(&conflict.first)?)
        .bind(serde_json::to_value(&conflict.second)?)
        .bind(enum_to_db(&conflict.status)?)
        .bind(conflict.resolution.as_ref().map(serde_json::to_value).transpose()?)
        .bind(conflict.created_at)
        .bind(conflict.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_conflict(&self, conflict: &Conflict) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE conflicts SET status = $2, resolution = $3, updated_at = $4 \
             WHERE conflict_id = $1",
        )
        .bind(conflict.id.as_uuid())
        .bind(enum_to_db(&conflict.status)?)
        .bind(conflict.resolution.as_ref().map(serde_json::to_value).transpose()?)
        .bind(conflict.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Conflict", conflict.id));
        }
        Ok(())
    }

    pub async fn fetch_conflict(&self, id: ConflictId) -> Result<Conflict, DatabaseError> {
        let row: ConflictRow = sqlx::query_as(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE conflict_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Conflict", id))?;
        row.into_domain()
    }

    pub async fn unresolved_conflicts(&self) -> Result<Vec<Conflict>, DatabaseError> {
        let rows: Vec<ConflictRow> = sqlx::query_as(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE status = 'OPEN' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ConflictRow::into_domain).collect()
    }

    pub async fn conflicts_changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Conflict>, DatabaseError> {
        let rows: Vec<ConflictRow> = sqlx::query_as(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE updated_at > $1 ORDER BY updated_at"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ConflictRow::into_domain).collect()
    }

    // anomalies

    pub async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO anomalies (anomaly_id, kind, assignment_id, cycle_id, reading_id, \
             detail, status, detected_at, acknowledged_by, resolved_by, resolution_note) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(anomaly.id.as_uuid())
        .bind(enum_to_db(&anomaly.kind)?)
        .bind(anomaly.assignment_id.as_uuid())
        .bind(anomaly.cycle_id.as_uuid())
        .bind(anomaly.reading_id.as_uuid())
        .bind(&anomaly.detail)
        .bind(enum_to_db(&anomaly.status)?)
        .bind(anomaly.detected_at)
        .bind(&anomaly.acknowledged_by)
        .bind(&anomaly.resolved_by)
        .bind(&anomaly.resolution_note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_anomaly(&self, anomaly: &Anomaly) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE anomalies SET status = $2, acknowledged_by = $3, resolved_by = $4, \
             resolution_note = $5 WHERE anomaly_id = $1",
        )
        .bind(anomaly.id.as_uuid())
        .bind(enum_to_db(&anomaly.status)?)
        .bind(&anomaly.acknowledged_by)
        .bind(&anomaly.resolved_by)
        .bind(&anomaly.resolution_note)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Anomaly", anomaly.id));
        }
        Ok(())
    }

    /// Current optimistic version for a slot, zero when no reading has
    /// ever touched it
    pub async fn slot_version(
        &self,
        assignment_id: AssignmentId,
        cycle_id: CycleId,
    ) -> Result<i64, DatabaseError> {
        let version: Option<(i64,)> = sqlx::query_as(
            "SELECT version FROM reading_slots WHERE assignment_id = $1 AND cycle_id = $2",
        )
        .bind(assignment_id.as_uuid())
        .bind(cycle_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(version.map(|(v,)| v).unwrap_or(0))
    }
}
