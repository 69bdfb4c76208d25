//! Write-through persistence
//!
//! The in-process books are authoritative for request handling; every
//! accepted mutation is then written through to PostgreSQL so restarts
//! and reporting read the same facts. Built without a pool (tests,
//! demos), every write is a no-op.

use domain_cycle::BillingCycle;
use domain_ledger::{LedgerEntry, PaymentRecord, Penalty};
use domain_metering::{Anomaly, Conflict, MeterAssignment, Reading};
use domain_notify::NotificationRecord;
use infra_db::{
    CycleRepository, DatabaseError, LedgerRepository, MeteringRepository, NotificationRepository,
    TombstoneRepository,
};
use core_kernel::SubmissionKey;
use sqlx::PgPool;
use sync_protocol::Tombstone;

struct Repositories {
    cycles: CycleRepository,
    metering: MeteringRepository,
    ledger: LedgerRepository,
    notify: NotificationRepository,
    tombstones: TombstoneRepository,
}

/// Write-through handle shared by the handlers
pub struct Persistence {
    repos: Option<Repositories>,
}

impl Persistence {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repos: Some(Repositories {
                cycles: CycleRepository::new(pool.clone()),
                metering: MeteringRepository::new(pool.clone()),
                ledger: LedgerRepository::new(pool.clone()),
                notify: NotificationRepository::new(pool.clone()),
                tombstones: TombstoneRepository::new(pool),
            }),
        }
    }

    /// A handle that drops every write
    pub fn disabled() -> Self {
        Self { repos: None }
    }

    pub async fn cycle_created(&self, cycle: &BillingCycle) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.cycles.insert(cycle).await?;
        }
        Ok(())
    }

    pub async fn cycle_updated(&self, cycle: &BillingCycle) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.cycles.update_status(cycle).await?;
        }
        Ok(())
    }

    pub async fn assignment_created(
        &self,
        assignment: &MeterAssignment,
    ) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.metering.insert_assignment(assignment).await?;
        }
        Ok(())
    }

    pub async fn assignment_updated(
        &self,
        assignment: &MeterAssignment,
    ) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.metering.update_assignment(assignment).await?;
        }
        Ok(())
    }

    pub async fn reading_created(&self, reading: &Reading) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.metering.insert_reading(reading, None).await?;
        }
        Ok(())
    }

    pub async fn reading_updated(&self, reading: &Reading) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.metering.update_reading(reading).await?;
        }
        Ok(())
    }

    pub async fn anomaly_created(&self, anomaly: &Anomaly) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.metering.insert_anomaly(anomaly).await?;
        }
        Ok(())
    }

    pub async fn anomaly_updated(&self, anomaly: &Anomaly) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.metering.update_anomaly(anomaly).await?;
        }
        Ok(())
    }

    pub async fn conflict_created(&self, conflict: &Conflict) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.metering.insert_conflict(conflict).await?;
        }
        Ok(())
    }

    pub async fn conflict_updated(&self, conflict: &Conflict) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.metering.update_conflict(conflict).await?;
        }
        Ok(())
    }

    pub async fn entries_created(&self, entries: &[LedgerEntry]) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            for entry in entries {
                repos.ledger.insert_entry(entry).await?;
            }
        }
        Ok(())
    }

    pub async fn payment_created(
        &self,
        key: SubmissionKey,
        payment: &PaymentRecord,
    ) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.ledger.insert_payment(key, payment).await?;
        }
        Ok(())
    }

    pub async fn penalty_created(&self, penalty: &Penalty) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.ledger.insert_penalty(penalty).await?;
        }
        Ok(())
    }

    pub async fn penalty_updated(&self, penalty: &Penalty) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.ledger.update_penalty(penalty).await?;
        }
        Ok(())
    }

    pub async fn notification_created(
        &self,
        record: &NotificationRecord,
    ) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.notify.insert(record).await?;
        }
        Ok(())
    }

    pub async fn notification_updated(
        &self,
        record: &NotificationRecord,
    ) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            repos.notify.update(record).await?;
        }
        Ok(())
    }

    pub async fn tombstones_recorded(&self, tombstones: &[Tombstone]) -> Result<(), DatabaseError> {
        if let Some(repos) = &self.repos {
            for t in tombstones {
                let kind = serde_json::to_value(t.kind)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "UNKNOWN".to_string());
                let reason = serde_json::to_value(t.reason)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "UNKNOWN".to_string());
                repos
                    .tombstones
                    .insert(&kind, t.entity_id, &reason, t.at)
                    .await?;
            }
        }
        Ok(())
    }
}
