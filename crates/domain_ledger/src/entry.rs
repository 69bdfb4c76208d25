//! Immutable ledger entries
//!
//! An entry is never updated or deleted. Corrections are new ADJUSTMENT
//! entries; the balance is always a fold over the entry set, never stored.

use chrono::{DateTime, Utc};
use core_kernel::{ClientId, CycleId, LedgerEntryId, Money, ReadingId};
use serde::{Deserialize, Serialize};

/// Which side of the balance an ADJUSTMENT moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentDirection {
    /// Reduces what the client owes
    Credit,
    /// Increases what the client owes
    Debit,
}

/// Entry classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum EntryKind {
    /// Consumption billed at cycle approval
    Charge,
    /// Manually applied penalty
    Penalty,
    /// Money received from the client
    Payment,
    /// Manual or system correction
    Adjustment { direction: AdjustmentDirection },
}

/// One immutable row in a client's ledger
///
/// `amount` is always non-negative; the entry kind determines its sign in
/// the balance fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub client_id: ClientId,
    pub kind: EntryKind,
    pub amount: Money,
    /// The cycle this entry bills, for charges
    pub cycle_id: Option<CycleId>,
    /// The approved reading a charge was generated from
    pub reading_id: Option<ReadingId>,
    pub reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// True for entry kinds that add to what the client owes
    pub fn is_debit(&self) -> bool {
        matches!(
            self.kind,
            EntryKind::Charge
                | EntryKind::Penalty
                | EntryKind::Adjustment {
                    direction: AdjustmentDirection::Debit
                }
        )
    }

    /// Contribution of this entry to the balance fold: positive for
    /// debits, negative for payments and credits
    pub fn signed_amount(&self) -> Money {
        if self.is_debit() {
            self.amount
        } else {
            -self.amount
        }
    }
}

/// Net amount the client owes: sum of debits minus payments and credits.
/// Pure fold; never cached authoritatively.
pub fn balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Money {
    entries.into_iter().map(LedgerEntry::signed_amount).sum()
}
