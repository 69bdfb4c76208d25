//! Notification repository
//!
//! The attempt history travels as one JSONB column; the row is the unit
//! of persistence because attempts are only ever appended through the
//! record's own methods.

use chrono::{DateTime, Utc};
use core_kernel::{ClientId, NotificationId};
use domain_notify::NotificationRecord;
use sqlx::PgPool;
use uuid::Uuid;

use crate::codec::{enum_from_db, enum_to_db};
use crate::error::DatabaseError;

/// Database access for outbound messages
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    notification_id: Uuid,
    client_id: Uuid,
    category: String,
    recipient: String,
    body: String,
    state: String,
    attempts: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_domain(self) -> Result<NotificationRecord, DatabaseError> {
        Ok(NotificationRecord {
            id: NotificationId::from(self.notification_id),
            client_id: ClientId::from(self.client_id),
            category: enum_from_db(&self.category)?,
            recipient: self.recipient,
            body: self.body,
            state: enum_from_db(&self.state)?,
            attempts: serde_json::from_value(self.attempts)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const NOTIFICATION_COLUMNS: &str = "notification_id, client_id, category, recipient, body, \
                                    state, attempts, created_at, updated_at";

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &NotificationRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO notifications (notification_id, client_id, category, recipient, body, \
             state, attempts, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id.as_uuid())
        .bind(record.client_id.as_uuid())
        .bind(enum_to_db(&record.category)?)
        .bind(&record.recipient)
        .bind(&record.body)
        .bind(enum_to_db(&record.state)?)
        .bind(serde_json::to_value(&record.attempts)?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, record: &NotificationRecord) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE notifications SET state = $2, attempts = $3, updated_at = $4 \
             WHERE notification_id = $1",
        )
        .bind(record.id.as_uuid())
        .bind(enum_to_db(&record.state)?)
        .bind(serde_json::to_value(&record.attempts)?)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("NotificationRecord", record.id));
        }
        Ok(())
    }

    pub async fn fetch(&self, id: NotificationId) -> Result<NotificationRecord, DatabaseError> {
        let row: NotificationRow = sqlx::query_as(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE notification_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("NotificationRecord", id))?;
        row.into_domain()
    }

    /// Messages the retry scheduler still has to look at: everything not
    /// in a terminal state
    pub async fn open_messages(&self) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE state IN ('PENDING', 'SENT', 'FAILED') ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    pub async fn changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE updated_at > $1 \
             ORDER BY updated_at"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NotificationRow::into_domain).collect()
    }
}
