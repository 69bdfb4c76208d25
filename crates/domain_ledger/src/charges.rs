//! Charge generation at cycle approval
//!
//! One CHARGE per approved billable reading, at the tariff in force on the
//! approval date. Generation is idempotent per reading: regenerating a
//! cycle never duplicates entries. Baselines and zero consumption produce
//! no charge; unresolved rollovers (no consumption yet) are skipped; a
//! negative delta posts a credit ADJUSTMENT instead of a negative charge.

use chrono::{DateTime, Utc};
use core_kernel::{AssignmentId, ClientId, CycleId, Money, ReadingId, Tariff, VolumeDelta};
use serde::{Deserialize, Serialize};

use crate::entry::{AdjustmentDirection, EntryKind, LedgerEntry};

/// An approved reading as the ledger sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableReading {
    pub reading_id: ReadingId,
    pub assignment_id: AssignmentId,
    pub client_id: ClientId,
    pub cycle_id: CycleId,
    /// None while a rollover is unresolved
    pub consumption: Option<VolumeDelta>,
    /// Baselines anchor consumption, never billed themselves
    pub is_baseline: bool,
}

/// Entries to append for one cycle approval
pub fn generate_charges(
    billables: &[BillableReading],
    tariff: Tariff,
    already_charged: impl Fn(ReadingId) -> bool,
    approved_by: &str,
    now: DateTime<Utc>,
) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();

    for billable in billables {
        if billable.is_baseline || already_charged(billable.reading_id) {
            continue;
        }
        let Some(consumption) = billable.consumption else {
            continue;
        };
        if consumption.is_zero() {
            continue;
        }

        // One rounding, at the invoice boundary.
        let amount = Money::new(consumption.value() * tariff.rate()).round_invoice();

        let (kind, amount, reason) = if consumption.is_negative() {
            (
                EntryKind::Adjustment {
                    direction: AdjustmentDirection::Credit,
                },
                amount.abs(),
                Some("negative consumption".to_string()),
            )
        } else {
            (EntryKind::Charge, amount, None)
        };

        entries.push(LedgerEntry {
            id: core_kernel::LedgerEntryId::new_v7(),
            client_id: billable.client_id,
            kind,
            amount,
            cycle_id: Some(billable.cycle_id),
            reading_id: Some(billable.reading_id),
            reason,
            created_by: approved_by.to_string(),
            created_at: now,
        });
    }

    entries
}
