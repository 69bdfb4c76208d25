//! Tombstone repository
//!
//! Deletion markers for the delta feed. The authoritative tables never
//! hard-delete; a tombstone records that an entity left a device's
//! working set so offline caches can drop it.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

/// One recorded deletion marker
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TombstoneRow {
    pub tombstone_id: Uuid,
    /// Entity kind name, matching the sync payload names
    pub kind: String,
    pub entity_id: Uuid,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Database access for deletion markers
#[derive(Debug, Clone)]
pub struct TombstoneRepository {
    pool: PgPool,
}

impl TombstoneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        kind: &str,
        entity_id: Uuid,
        reason: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO tombstones (tombstone_id, kind, entity_id, reason, recorded_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::now_v7())
        .bind(kind)
        .bind(entity_id)
        .bind(reason)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recorded_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TombstoneRow>, DatabaseError> {
        let rows = sqlx::query_as(
            "SELECT tombstone_id, kind, entity_id, reason, recorded_at FROM tombstones \
             WHERE recorded_at > $1 ORDER BY recorded_at",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
