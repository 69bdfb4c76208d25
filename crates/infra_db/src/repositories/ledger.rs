//! Ledger repository
//!
//! Entries are append-only rows; there is no UPDATE path for
//! `ledger_entries`. Payments and penalties carry their own lifecycle
//! columns and reference the entry they posted.

use chrono::{DateTime, Utc};
use core_kernel::{ClientId, CycleId, LedgerEntryId, Money, PaymentId, PenaltyId, ReadingId, SubmissionKey};
use domain_ledger::{AdjustmentDirection, EntryKind, LedgerEntry, PaymentRecord, Penalty};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::codec::{enum_from_db, enum_to_db};
use crate::error::DatabaseError;

/// Database access for ledger entries, payments, and penalties
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    entry_id: Uuid,
    client_id: Uuid,
    kind: String,
    direction: Option<String>,
    amount: Decimal,
    cycle_id: Option<Uuid>,
    reading_id: Option<Uuid>,
    reason: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_domain(self) -> Result<LedgerEntry, DatabaseError> {
        let kind = match (self.kind.as_str(), self.direction.as_deref()) {
            ("CHARGE", _) => EntryKind::Charge,
            ("PENALTY", _) => EntryKind::Penalty,
            ("PAYMENT", _) => EntryKind::Payment,
            ("ADJUSTMENT", Some(direction)) => EntryKind::Adjustment {
                direction: enum_from_db::<AdjustmentDirection>(direction)?,
            },
            (kind, _) => {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "unreadable entry kind {kind}"
                )))
            }
        };

        Ok(LedgerEntry {
            id: LedgerEntryId::from(self.entry_id),
            client_id: ClientId::from(self.client_id),
            kind,
            amount: Money::new(self.amount),
            cycle_id: self.cycle_id.map(CycleId::from),
            reading_id: self.reading_id.map(ReadingId::from),
            reason: self.reason,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

fn kind_columns(kind: &EntryKind) -> Result<(String, Option<String>), DatabaseError> {
    Ok(match kind {
        EntryKind::Charge => ("CHARGE".to_string(), None),
        EntryKind::Penalty => ("PENALTY".to_string(), None),
        EntryKind::Payment => ("PAYMENT".to_string(), None),
        EntryKind::Adjustment { direction } => {
            ("ADJUSTMENT".to_string(), Some(enum_to_db(direction)?))
        }
    })
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    submission_key: Uuid,
    client_id: Uuid,
    amount: Decimal,
    entry_id: Uuid,
    allocations: serde_json::Value,
    credit_remainder: Decimal,
    received_from: String,
    recorded_by: String,
    recorded_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_domain(self) -> Result<(SubmissionKey, PaymentRecord), DatabaseError> {
        let record = PaymentRecord {
            id: PaymentId::from(self.payment_id),
            client_id: ClientId::from(self.client_id),
            amount: Money::new(self.amount),
            entry_id: LedgerEntryId::from(self.entry_id),
            allocations: serde_json::from_value(self.allocations)?,
            credit_remainder: Money::new(self.credit_remainder),
            received_from: self.received_from,
            recorded_by: self.recorded_by,
            recorded_at: self.recorded_at,
        };
        Ok((SubmissionKey::from(self.submission_key), record))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PenaltyRow {
    penalty_id: Uuid,
    client_id: Uuid,
    entry_id: Uuid,
    amount: Decimal,
    reason: String,
    status: String,
    applied_by: String,
    applied_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    resolution_note: Option<String>,
}

impl PenaltyRow {
    fn into_domain(self) -> Result<Penalty, DatabaseError> {
        Ok(Penalty {
            id: PenaltyId::from(self.penalty_id),
            client_id: ClientId::from(self.client_id),
            entry_id: LedgerEntryId::from(self.entry_id),
            amount: Money::new(self.amount),
            reason: self.reason,
            status: enum_from_db(&self.status)?,
            applied_by: self.applied_by,
            applied_at: self.applied_at,
            resolved_at: self.resolved_at,
            resolved_by: self.resolved_by,
            resolution_note: self.resolution_note,
        })
    }
}

const ENTRY_COLUMNS: &str = "entry_id, client_id, kind, direction, amount, cycle_id, reading_id, \
                             reason, created_by, created_at";

const PENALTY_COLUMNS: &str = "penalty_id, client_id, entry_id, amount, reason, status, \
                               applied_by, applied_at, resolved_at, resolved_by, resolution_note";

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // entries

    pub async fn insert_entry(&self, entry: &LedgerEntry) -> Result<(), DatabaseError> {
        let (kind, direction) = kind_columns(&entry.kind)?;
        sqlx::query(
            "INSERT INTO ledger_entries (entry_id, client_id, kind, direction, amount, cycle_id, \
             reading_id, reason, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.client_id.as_uuid())
        .bind(kind)
        .bind(direction)
        .bind(entry.amount.amount())
        .bind(entry.cycle_id.map(|c| *c.as_uuid()))
        .bind(entry.reading_id.map(|r| *r.as_uuid()))
        .bind(&entry.reason)
        .bind(&entry.created_by)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A client's entries in posting order, the order FIFO replays in
    pub async fn entries_for(&self, client_id: ClientId) -> Result<Vec<LedgerEntry>, DatabaseError> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE client_id = $1 ORDER BY created_at, entry_id"
        ))
        .bind(client_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EntryRow::into_domain).collect()
    }

    pub async fn entries_changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, DatabaseError> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE created_at > $1 ORDER BY created_at"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EntryRow::into_domain).collect()
    }

    /// Reading ids that already carry a CHARGE entry, for idempotent
    /// charge generation
    pub async fn charged_reading_ids(
        &self,
        cycle_id: CycleId,
    ) -> Result<Vec<ReadingId>, DatabaseError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT reading_id FROM ledger_entries \
             WHERE cycle_id = $1 AND kind = 'CHARGE' AND reading_id IS NOT NULL",
        )
        .bind(cycle_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| ReadingId::from(id)).collect())
    }

    // payments

    pub async fn insert_payment(
        &self,
        key: SubmissionKey,
        payment: &PaymentRecord,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO payments (payment_id, submission_key, client_id, amount, entry_id, \
             allocations, credit_remainder, received_from, recorded_by, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(payment.id.as_uuid())
        .bind(key.as_uuid())
        .bind(payment.client_id.as_uuid())
        .bind(payment.amount.amount())
        .bind(payment.entry_id.as_uuid())
        .bind(serde_json::to_value(&payment.allocations)?)
        .bind(payment.credit_remainder.amount())
        .bind(&payment.received_from)
        .bind(&payment.recorded_by)
        .bind(payment.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn payment_by_key(
        &self,
        key: SubmissionKey,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        let row: Option<PaymentRow> = sqlx::query_as(
            "SELECT payment_id, submission_key, client_id, amount, entry_id, allocations, \
             credit_remainder, received_from, recorded_by, recorded_at \
             FROM payments WHERE submission_key = $1",
        )
        .bind(key.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PaymentRow::into_domain).transpose()?.map(|(_, p)| p))
    }

    // penalties

    pub async fn insert_penalty(&self, penalty: &Penalty) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO penalties (penalty_id, client_id, entry_id, amount, reason, status, \
             applied_by, applied_at, resolved_at, resolved_by, resolution_note) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(penalty.id.as_uuid())
        .bind(penalty.client_id.as_uuid())
        .bind(penalty.entry_id.as_uuid())
        .bind(penalty.amount.amount())
        .bind(&penalty.reason)
        .bind(enum_to_db(&penalty.status)?)
        .bind(&penalty.applied_by)
        .bind(penalty.applied_at)
        .bind(penalty.resolved_at)
        .bind(&penalty.resolved_by)
        .bind(&penalty.resolution_note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_penalty(&self, penalty: &Penalty) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE penalties SET status = $2, resolved_at = $3, resolved_by = $4, \
             resolution_note = $5 WHERE penalty_id = $1",
        )
        .bind(penalty.id.as_uuid())
        .bind(enum_to_db(&penalty.status)?)
        .bind(penalty.resolved_at)
        .bind(&penalty.resolved_by)
        .bind(&penalty.resolution_note)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Penalty", penalty.id));
        }
        Ok(())
    }

    pub async fn active_penalty(
        &self,
        client_id: ClientId,
    ) -> Result<Option<Penalty>, DatabaseError> {
        let row: Option<PenaltyRow> = sqlx::query_as(&format!(
            "SELECT {PENALTY_COLUMNS} FROM penalties WHERE client_id = $1 AND status = 'ACTIVE'"
        ))
        .bind(client_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(PenaltyRow::into_domain).transpose()
    }

    pub async fn fetch_penalty(&self, id: PenaltyId) -> Result<Penalty, DatabaseError> {
        let row: PenaltyRow = sqlx::query_as(&format!(
            "SELECT {PENALTY_COLUMNS} FROM penalties WHERE penalty_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Penalty", id))?;
        row.into_domain()
    }
}
