//! Billing cycle repository

use chrono::{DateTime, NaiveDate, Utc};
use core_kernel::{CycleId, DateRange};
use domain_cycle::{BillingCycle, CycleStatus, SubmissionWindow};
use sqlx::PgPool;
use uuid::Uuid;

use crate::codec::{enum_from_db, enum_to_db};
use crate::error::DatabaseError;

/// Database access for billing cycles
#[derive(Debug, Clone)]
pub struct CycleRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct CycleRow {
    cycle_id: Uuid,
    period_start: NaiveDate,
    period_end: NaiveDate,
    target_date: NaiveDate,
    slack_days: i16,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    archived_at: Option<DateTime<Utc>>,
}

impl CycleRow {
    fn into_domain(self) -> Result<BillingCycle, DatabaseError> {
        let period = DateRange::new(self.period_start, self.period_end)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
        let status: CycleStatus = enum_from_db(&self.status)?;
        Ok(BillingCycle {
            id: CycleId::from(self.cycle_id),
            period,
            window: SubmissionWindow::new(self.target_date, self.slack_days as u16),
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            approved_at: self.approved_at,
            closed_at: self.closed_at,
            archived_at: self.archived_at,
        })
    }
}

const CYCLE_COLUMNS: &str = "cycle_id, period_start, period_end, target_date, slack_days, \
                             status, created_at, updated_at, approved_at, closed_at, archived_at";

impl CycleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, cycle: &BillingCycle) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO billing_cycles (cycle_id, period_start, period_end, target_date, \
             slack_days, status, created_at, updated_at, approved_at, closed_at, archived_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(cycle.id.as_uuid())
        .bind(cycle.period.start)
        .bind(cycle.period.end)
        .bind(cycle.window.target_date)
        .bind(cycle.window.slack_days as i16)
        .bind(enum_to_db(&cycle.status)?)
        .bind(cycle.created_at)
        .bind(cycle.updated_at)
        .bind(cycle.approved_at)
        .bind(cycle.closed_at)
        .bind(cycle.archived_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists a state transition. The period and window never change
    /// after creation.
    pub async fn update_status(&self, cycle: &BillingCycle) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE billing_cycles SET status = $2, updated_at = $3, approved_at = $4, \
             closed_at = $5, archived_at = $6 WHERE cycle_id = $1",
        )
        .bind(cycle.id.as_uuid())
        .bind(enum_to_db(&cycle.status)?)
        .bind(cycle.updated_at)
        .bind(cycle.approved_at)
        .bind(cycle.closed_at)
        .bind(cycle.archived_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("BillingCycle", cycle.id));
        }
        Ok(())
    }

    pub async fn fetch(&self, id: CycleId) -> Result<BillingCycle, DatabaseError> {
        let row: CycleRow = sqlx::query_as(&format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE cycle_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("BillingCycle", id))?;
        row.into_domain()
    }

    /// The most recent cycles by period end, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<BillingCycle>, DatabaseError> {
        let rows: Vec<CycleRow> = sqlx::query_as(&format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles ORDER BY period_end DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CycleRow::into_domain).collect()
    }

    /// All cycles, ordered by period start
    pub async fn all(&self) -> Result<Vec<BillingCycle>, DatabaseError> {
        let rows: Vec<CycleRow> = sqlx::query_as(&format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles ORDER BY period_start"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CycleRow::into_domain).collect()
    }

    pub async fn changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<BillingCycle>, DatabaseError> {
        let rows: Vec<CycleRow> = sqlx::query_as(&format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE updated_at > $1 ORDER BY updated_at"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CycleRow::into_domain).collect()
    }

    /// OPEN cycles whose submission window has already closed
    pub async fn overdue_open(&self, today: NaiveDate) -> Result<Vec<BillingCycle>, DatabaseError> {
        let rows: Vec<CycleRow> = sqlx::query_as(&format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles \
             WHERE status = 'OPEN' AND target_date + slack_days < $1"
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CycleRow::into_domain).collect()
    }
}
