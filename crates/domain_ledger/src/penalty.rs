//! Penalty records
//!
//! Penalties are never system-generated. An authorized operator applies
//! one with a mandatory justification; at most one active penalty exists
//! per client. A penalty clears automatically once the client's balance
//! falls to the configured threshold, or an operator waives it.

use chrono::{DateTime, Utc};
use core_kernel::{ClientId, LedgerEntryId, Money, PenaltyId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenaltyStatus {
    Active,
    /// Balance reached the clearing threshold
    Cleared,
    /// Manually lifted by an operator
    Waived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalty {
    pub id: PenaltyId,
    pub client_id: ClientId,
    /// The PENALTY ledger entry this record governs
    pub entry_id: LedgerEntryId,
    pub amount: Money,
    pub reason: String,
    pub status: PenaltyStatus,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
}

impl Penalty {
    pub fn is_active(&self) -> bool {
        self.status == PenaltyStatus::Active
    }

    pub(crate) fn clear(&mut self, now: DateTime<Utc>) {
        self.status = PenaltyStatus::Cleared;
        self.resolved_at = Some(now);
        self.resolved_by = Some("system".to_string());
        self.resolution_note = Some("balance reached clearing threshold".to_string());
    }

    pub(crate) fn waive(&mut self, by: &str, note: String, now: DateTime<Utc>) {
        self.status = PenaltyStatus::Waived;
        self.resolved_at = Some(now);
        self.resolved_by = Some(by.to_string());
        self.resolution_note = Some(note);
    }
}
