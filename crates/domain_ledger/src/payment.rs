//! FIFO payment application
//!
//! Pure functions over the ordered entry set. Outstanding amounts per
//! debit are derived by replaying payments and credits oldest-first; they
//! are never stored, so the allocation is uniquely determined by entry age
//! regardless of call order.

use chrono::{DateTime, Utc};
use core_kernel::{ClientId, LedgerEntryId, Money, PaymentId};
use serde::{Deserialize, Serialize};

use crate::entry::LedgerEntry;

/// A debit with money still owed against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outstanding {
    pub entry_id: LedgerEntryId,
    pub remaining: Money,
}

/// How much of a payment went to one debit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub entry_id: LedgerEntryId,
    pub amount: Money,
}

/// Result of applying one payment amount FIFO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoApplication {
    pub allocations: Vec<Allocation>,
    /// Amount left after every outstanding debit is settled. Becomes an
    /// ADJUSTMENT credit offsetting future charges; never disclosed to the
    /// payer through outward-facing messaging.
    pub credit_remainder: Money,
}

/// Record of a received payment and where it was allocated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub client_id: ClientId,
    pub amount: Money,
    pub entry_id: LedgerEntryId,
    pub allocations: Vec<Allocation>,
    pub credit_remainder: Money,
    pub received_from: String,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

/// Debits with money still owed, oldest first
///
/// Replays the client's entries in posting order: each debit opens an
/// outstanding amount; each payment or credit consumes outstanding debits
/// oldest-first, with any excess carried forward as a credit pool that
/// offsets debits posted later.
pub fn outstanding_debits<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> Vec<Outstanding> {
    let mut open: Vec<Outstanding> = Vec::new();
    let mut credit_pool = Money::zero();

    for entry in entries {
        if entry.is_debit() {
            let consumed = credit_pool.min(entry.amount);
            credit_pool = credit_pool - consumed;
            let remaining = entry.amount - consumed;
            if remaining.is_positive() {
                open.push(Outstanding {
                    entry_id: entry.id,
                    remaining,
                });
            }
        } else {
            let mut available = entry.amount;
            for debit in open.iter_mut() {
                if available.is_zero() {
                    break;
                }
                let applied = available.min(debit.remaining);
                debit.remaining = debit.remaining - applied;
                available = available - applied;
            }
            open.retain(|d| d.remaining.is_positive());
            credit_pool = credit_pool + available;
        }
    }

    open
}

/// Applies a payment amount to outstanding debits, oldest first
pub fn apply_fifo(outstanding: &[Outstanding], amount: Money) -> FifoApplication {
    let mut remaining = amount;
    let mut allocations = Vec::new();

    for debit in outstanding {
        if remaining.is_zero() {
            break;
        }
        let applied = remaining.min(debit.remaining);
        if applied.is_positive() {
            allocations.push(Allocation {
                entry_id: debit.entry_id,
                amount: applied,
            });
            remaining = remaining - applied;
        }
    }

    FifoApplication {
        allocations,
        credit_remainder: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AdjustmentDirection, EntryKind};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn entry(kind: EntryKind, amount: rust_decimal::Decimal, minute: u32) -> LedgerEntry {
        LedgerEntry {
            id: LedgerEntryId::new_v7(),
            client_id: ClientId::new(),
            kind,
            amount: Money::new(amount),
            cycle_id: None,
            reading_id: None,
            reason: None,
            created_by: "admin-1".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 10, 9, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_payment_settles_oldest_charge_first() {
        let entries = vec![
            entry(EntryKind::Charge, dec!(100.00), 0),
            entry(EntryKind::Charge, dec!(200.00), 1),
        ];

        let open = outstanding_debits(&entries);
        let application = apply_fifo(&open, Money::new(dec!(150.00)));

        assert_eq!(application.allocations.len(), 2);
        assert_eq!(application.allocations[0].entry_id, entries[0].id);
        assert_eq!(application.allocations[0].amount, Money::new(dec!(100.00)));
        assert_eq!(application.allocations[1].entry_id, entries[1].id);
        assert_eq!(application.allocations[1].amount, Money::new(dec!(50.00)));
        assert!(application.credit_remainder.is_zero());
    }

    #[test]
    fn test_overpayment_leaves_credit_remainder() {
        let entries = vec![entry(EntryKind::Charge, dec!(100.00), 0)];

        let open = outstanding_debits(&entries);
        let application = apply_fifo(&open, Money::new(dec!(130.00)));

        assert_eq!(application.credit_remainder, Money::new(dec!(30.00)));
    }

    #[test]
    fn test_replay_accounts_for_prior_payments() {
        let entries = vec![
            entry(EntryKind::Charge, dec!(100.00), 0),
            entry(EntryKind::Payment, dec!(60.00), 1),
            entry(EntryKind::Charge, dec!(50.00), 2),
        ];

        let open = outstanding_debits(&entries);
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].remaining, Money::new(dec!(40.00)));
        assert_eq!(open[1].remaining, Money::new(dec!(50.00)));
    }

    #[test]
    fn test_credit_pool_offsets_later_charges() {
        // A credit posted before any debit waits in the pool.
        let entries = vec![
            entry(
                EntryKind::Adjustment {
                    direction: AdjustmentDirection::Credit,
                },
                dec!(30.00),
                0,
            ),
            entry(EntryKind::Charge, dec!(100.00), 1),
        ];

        let open = outstanding_debits(&entries);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].remaining, Money::new(dec!(70.00)));
    }

    #[test]
    fn test_penalties_participate_in_fifo_order() {
        let entries = vec![
            entry(EntryKind::Charge, dec!(100.00), 0),
            entry(EntryKind::Penalty, dec!(20.00), 1),
        ];

        let open = outstanding_debits(&entries);
        let application = apply_fifo(&open, Money::new(dec!(110.00)));

        assert_eq!(application.allocations[0].amount, Money::new(dec!(100.00)));
        assert_eq!(application.allocations[1].amount, Money::new(dec!(10.00)));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::entry::EntryKind;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn charges(amounts: &[i64]) -> Vec<LedgerEntry> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, cents)| LedgerEntry {
                id: LedgerEntryId::new_v7(),
                client_id: ClientId::new(),
                kind: EntryKind::Charge,
                amount: Money::new(Decimal::new(*cents, 2)),
                cycle_id: None,
                reading_id: None,
                reason: None,
                created_by: "admin-1".to_string(),
                created_at: Utc
                    .with_ymd_and_hms(2025, 6, 10, 9, 0, i as u32 % 60)
                    .unwrap(),
            })
            .collect()
    }

    proptest! {
        #[test]
        fn allocation_conserves_the_payment(
            amounts in proptest::collection::vec(1i64..=1_000_000, 0..10),
            payment_cents in 0i64..=5_000_000,
        ) {
            let entries = charges(&amounts);
            let open = outstanding_debits(&entries);
            let payment = Money::new(Decimal::new(payment_cents, 2));

            let application = apply_fifo(&open, payment);
            let allocated: Money = application.allocations.iter().map(|a| a.amount).sum();

            prop_assert_eq!(allocated + application.credit_remainder, payment);
            for allocation in &application.allocations {
                prop_assert!(allocation.amount.is_positive());
            }
        }

        #[test]
        fn allocation_is_determined_by_age(
            amounts in proptest::collection::vec(1i64..=1_000_000, 1..10),
            payment_cents in 1i64..=5_000_000,
        ) {
            let entries = charges(&amounts);
            let open = outstanding_debits(&entries);
            let payment = Money::new(Decimal::new(payment_cents, 2));

            let first = apply_fifo(&open, payment);
            let second = apply_fifo(&open, payment);
            prop_assert_eq!(first.clone(), second);

            // Allocations follow the outstanding order exactly.
            let order: Vec<_> = open.iter().map(|o| o.entry_id).collect();
            let allocated: Vec<_> = first.allocations.iter().map(|a| a.entry_id).collect();
            prop_assert_eq!(&order[..allocated.len()], &allocated[..]);
        }
    }
}
