//! The client ledger
//!
//! Append-only entry log plus the payment and penalty records derived
//! from it. Balance is always recomputed from the entry set; nothing here
//! stores a running total.

use chrono::{DateTime, NaiveDate, Utc};
use core_kernel::{
    ClientId, LedgerEntryId, Money, PaymentId, PenaltyId, ReadingId, SubmissionKey,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::charges::{generate_charges, BillableReading};
use crate::entry::{balance, AdjustmentDirection, EntryKind, LedgerEntry};
use crate::error::LedgerError;
use crate::payment::{apply_fifo, outstanding_debits, Outstanding, PaymentRecord};
use crate::penalty::{Penalty, PenaltyStatus};
use crate::tariff::TariffBook;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Net balance at or below which an active penalty clears itself
    pub penalty_clear_threshold: Money,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            penalty_clear_threshold: Money::zero(),
        }
    }
}

/// Append-only ledger for all clients
#[derive(Debug, Default)]
pub struct LedgerBook {
    config: LedgerConfig,
    entries: Vec<LedgerEntry>,
    payments: HashMap<PaymentId, PaymentRecord>,
    payment_keys: HashMap<SubmissionKey, PaymentId>,
    penalties: HashMap<PenaltyId, Penalty>,
    charged_readings: HashSet<ReadingId>,
}

impl LedgerBook {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn entries_for(&self, client_id: ClientId) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.client_id == client_id)
    }

    pub fn entries_changed_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.created_at > since)
    }

    /// Net amount the client owes, folded on demand
    pub fn balance_for(&self, client_id: ClientId) -> Money {
        balance(self.entries_for(client_id))
    }

    /// Debits with money still owed, oldest first
    pub fn outstanding_for(&self, client_id: ClientId) -> Vec<Outstanding> {
        outstanding_debits(self.entries_for(client_id))
    }

    /// Posts charges for a cycle's approved readings, at the tariff in
    /// force on the approval date. Idempotent per reading.
    pub fn post_cycle_charges(
        &mut self,
        billables: &[BillableReading],
        tariffs: &TariffBook,
        approval_date: NaiveDate,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntryId>, LedgerError> {
        let tariff = tariffs.rate_on(approval_date)?;
        let charged = &self.charged_readings;
        let new_entries = generate_charges(
            billables,
            tariff,
            |reading_id| charged.contains(&reading_id),
            approved_by,
            now,
        );

        let mut posted = Vec::with_capacity(new_entries.len());
        let mut clients = HashSet::new();
        for entry in new_entries {
            if let Some(reading_id) = entry.reading_id {
                self.charged_readings.insert(reading_id);
            }
            clients.insert(entry.client_id);
            posted.push(entry.id);
            tracing::info!(
                entry = %entry.id,
                client = %entry.client_id,
                amount = %entry.amount,
                "posted cycle charge"
            );
            self.entries.push(entry);
        }

        for client_id in clients {
            self.maybe_clear_penalty(client_id, now);
        }
        Ok(posted)
    }

    /// Records a received payment and allocates it FIFO
    ///
    /// Idempotent by the client-assigned key: a replay returns the
    /// original record without posting anything. The PAYMENT entry carries
    /// only the allocated portion; any remainder after all outstanding
    /// debits are settled posts once, as an "overpayment credit"
    /// ADJUSTMENT, visible only through operator-facing queries.
    pub fn record_payment(
        &mut self,
        key: SubmissionKey,
        client_id: ClientId,
        amount: Money,
        received_from: &str,
        recorded_by: &str,
        now: DateTime<Utc>,
    ) -> Result<&PaymentRecord, LedgerError> {
        if let Some(payment_id) = self.payment_keys.get(&key) {
            return Ok(&self.payments[payment_id]);
        }
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount);
        }

        let application = apply_fifo(&self.outstanding_for(client_id), amount);

        // The entry pair must fold back to the received amount: allocated
        // on the PAYMENT row, remainder on the ADJUSTMENT row.
        let allocated = amount - application.credit_remainder;
        let entry = LedgerEntry {
            id: LedgerEntryId::new_v7(),
            client_id,
            kind: EntryKind::Payment,
            amount: allocated,
            cycle_id: None,
            reading_id: None,
            reason: None,
            created_by: recorded_by.to_string(),
            created_at: now,
        };
        let entry_id = entry.id;
        self.entries.push(entry);

        if application.credit_remainder.is_positive() {
            self.entries.push(LedgerEntry {
                id: LedgerEntryId::new_v7(),
                client_id,
                kind: EntryKind::Adjustment {
                    direction: AdjustmentDirection::Credit,
                },
                amount: application.credit_remainder,
                cycle_id: None,
                reading_id: None,
                reason: Some("overpayment credit".to_string()),
                created_by: recorded_by.to_string(),
                created_at: now,
            });
        }

        let record = PaymentRecord {
            id: PaymentId::new_v7(),
            client_id,
            amount,
            entry_id,
            allocations: application.allocations,
            credit_remainder: application.credit_remainder,
            received_from: received_from.to_string(),
            recorded_by: recorded_by.to_string(),
            recorded_at: now,
        };
        tracing::info!(
            payment = %record.id,
            client = %client_id,
            amount = %amount,
            remainder = %record.credit_remainder,
            "payment recorded"
        );

        let payment_id = record.id;
        self.payments.insert(payment_id, record);
        self.payment_keys.insert(key, payment_id);

        self.maybe_clear_penalty(client_id, now);
        Ok(&self.payments[&payment_id])
    }

    /// Applies a manual penalty. At most one active penalty per client;
    /// the justification note is mandatory.
    pub fn apply_penalty(
        &mut self,
        client_id: ClientId,
        amount: Money,
        reason: &str,
        applied_by: &str,
        now: DateTime<Utc>,
    ) -> Result<&Penalty, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::InsufficientJustification);
        }
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount);
        }
        if self.active_penalty(client_id).is_some() {
            return Err(LedgerError::ActivePenaltyExists(client_id));
        }

        let entry = LedgerEntry {
            id: LedgerEntryId::new_v7(),
            client_id,
            kind: EntryKind::Penalty,
            amount,
            cycle_id: None,
            reading_id: None,
            reason: Some(reason.to_string()),
            created_by: applied_by.to_string(),
            created_at: now,
        };
        let entry_id = entry.id;
        self.entries.push(entry);

        let penalty = Penalty {
            id: PenaltyId::new_v7(),
            client_id,
            entry_id,
            amount,
            reason: reason.to_string(),
            status: PenaltyStatus::Active,
            applied_by: applied_by.to_string(),
            applied_at: now,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        };
        tracing::info!(penalty = %penalty.id, client = %client_id, "penalty applied");

        let penalty_id = penalty.id;
        self.penalties.insert(penalty_id, penalty);
        Ok(&self.penalties[&penalty_id])
    }

    /// Waives an active penalty, crediting whatever is still owed on it
    pub fn waive_penalty(
        &mut self,
        penalty_id: PenaltyId,
        waived_by: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<&Penalty, LedgerError> {
        if note.trim().is_empty() {
            return Err(LedgerError::InsufficientJustification);
        }
        let penalty = self
            .penalties
            .get(&penalty_id)
            .ok_or(LedgerError::PenaltyNotFound(penalty_id))?;
        if !penalty.is_active() {
            return Err(LedgerError::PenaltyNotActive(penalty_id));
        }
        let client_id = penalty.client_id;
        let entry_id = penalty.entry_id;

        let remaining = self
            .outstanding_for(client_id)
            .into_iter()
            .find(|o| o.entry_id == entry_id)
            .map(|o| o.remaining)
            .unwrap_or_else(Money::zero);

        if remaining.is_positive() {
            self.entries.push(LedgerEntry {
                id: LedgerEntryId::new_v7(),
                client_id,
                kind: EntryKind::Adjustment {
                    direction: AdjustmentDirection::Credit,
                },
                amount: remaining,
                cycle_id: None,
                reading_id: None,
                reason: Some(format!("penalty waived: {note}")),
                created_by: waived_by.to_string(),
                created_at: now,
            });
        }

        let penalty = self
            .penalties
            .get_mut(&penalty_id)
            .expect("penalty looked up above");
        penalty.waive(waived_by, note.to_string(), now);
        tracing::info!(penalty = %penalty_id, "penalty waived");
        Ok(&*penalty)
    }

    pub fn active_penalty(&self, client_id: ClientId) -> Option<&Penalty> {
        self.penalties
            .values()
            .find(|p| p.client_id == client_id && p.is_active())
    }

    pub fn penalty(&self, id: PenaltyId) -> Result<&Penalty, LedgerError> {
        self.penalties.get(&id).ok_or(LedgerError::PenaltyNotFound(id))
    }

    pub fn payment(&self, id: PaymentId) -> Option<&PaymentRecord> {
        self.payments.get(&id)
    }

    fn maybe_clear_penalty(&mut self, client_id: ClientId, now: DateTime<Utc>) {
        let threshold = self.config.penalty_clear_threshold;
        if self.balance_for(client_id) > threshold {
            return;
        }
        let Some(penalty_id) = self.active_penalty(client_id).map(|p| p.id) else {
            return;
        };
        if let Some(penalty) = self.penalties.get_mut(&penalty_id) {
            penalty.clear(now);
            tracing::info!(penalty = %penalty_id, client = %client_id, "penalty auto-cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_kernel::{AssignmentId, CycleId, Tariff};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 10, 9, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tariffs() -> TariffBook {
        TariffBook::with_rate(date(2025, 1, 1), Tariff::per_cubic_metre(dec!(1250)).unwrap())
    }

    fn billable(client_id: ClientId, consumption: rust_decimal::Decimal) -> BillableReading {
        BillableReading {
            reading_id: ReadingId::new_v7(),
            assignment_id: AssignmentId::new(),
            client_id,
            cycle_id: CycleId::new(),
            consumption: Some(core_kernel::VolumeDelta::new(consumption)),
            is_baseline: false,
        }
    }

    #[test]
    fn test_partial_payment_leaves_balance_without_credit() {
        let mut book = LedgerBook::default();
        let client = ClientId::new();

        book.post_cycle_charges(
            &[billable(client, dec!(30.0000))],
            &tariffs(),
            date(2025, 7, 10),
            "admin-1",
            now(),
        )
        .unwrap();

        // Charge is 30 * 1250 = 37,500.00; pay 60% of it.
        assert_eq!(book.balance_for(client), Money::new(dec!(37500.00)));

        let record = book
            .record_payment(
                SubmissionKey::new(),
                client,
                Money::new(dec!(22500.00)),
                "client",
                "cashier-1",
                now(),
            )
            .unwrap();

        assert!(record.credit_remainder.is_zero());
        assert_eq!(book.balance_for(client), Money::new(dec!(15000.00)));
        assert_eq!(book.entries_for(client).count(), 2);
    }

    #[test]
    fn test_overpayment_posts_operator_visible_credit() {
        let mut book = LedgerBook::default();
        let client = ClientId::new();

        book.post_cycle_charges(
            &[billable(client, dec!(10.0000))],
            &tariffs(),
            date(2025, 7, 10),
            "admin-1",
            now(),
        )
        .unwrap();

        let record = book
            .record_payment(
                SubmissionKey::new(),
                client,
                Money::new(dec!(15000.00)),
                "client",
                "cashier-1",
                now(),
            )
            .unwrap();

        assert_eq!(record.credit_remainder, Money::new(dec!(2500.00)));
        assert_eq!(book.balance_for(client), Money::new(dec!(-2500.00)));

        // The PAYMENT row carries the allocated portion only; the
        // remainder lives on the adjustment, so the fold sees the
        // overpaid 2,500 exactly once.
        let payment_entry = book
            .entries_for(client)
            .find(|e| matches!(e.kind, EntryKind::Payment))
            .unwrap();
        assert_eq!(payment_entry.amount, Money::new(dec!(12500.00)));

        let credit = book
            .entries_for(client)
            .find(|e| {
                matches!(
                    e.kind,
                    EntryKind::Adjustment {
                        direction: AdjustmentDirection::Credit
                    }
                )
            })
            .unwrap();
        assert_eq!(credit.reason.as_deref(), Some("overpayment credit"));
    }

    #[test]
    fn test_payment_replay_by_key_posts_nothing() {
        let mut book = LedgerBook::default();
        let client = ClientId::new();
        let key = SubmissionKey::new();

        let first = book
            .record_payment(key, client, Money::new(dec!(100.00)), "client", "cashier-1", now())
            .unwrap()
            .id;
        let replay = book
            .record_payment(key, client, Money::new(dec!(100.00)), "client", "cashier-1", now())
            .unwrap()
            .id;

        assert_eq!(first, replay);
        assert_eq!(book.entries_for(client).count(), 2); // payment + credit
    }

    #[test]
    fn test_charge_regeneration_is_idempotent() {
        let mut book = LedgerBook::default();
        let client = ClientId::new();
        let billables = vec![billable(client, dec!(30.0000))];

        let first = book
            .post_cycle_charges(&billables, &tariffs(), date(2025, 7, 10), "admin-1", now())
            .unwrap();
        let second = book
            .post_cycle_charges(&billables, &tariffs(), date(2025, 7, 10), "admin-1", now())
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(book.balance_for(client), Money::new(dec!(37500.00)));
    }

    #[test]
    fn test_second_active_penalty_is_refused() {
        let mut book = LedgerBook::default();
        let client = ClientId::new();

        book.apply_penalty(client, Money::new(dec!(50.00)), "late payment", "admin-1", now())
            .unwrap();
        let err = book
            .apply_penalty(client, Money::new(dec!(50.00)), "late again", "admin-1", now())
            .unwrap_err();

        assert_eq!(err, LedgerError::ActivePenaltyExists(client));
    }

    #[test]
    fn test_penalty_requires_justification() {
        let mut book = LedgerBook::default();
        let err = book
            .apply_penalty(ClientId::new(), Money::new(dec!(50.00)), "  ", "admin-1", now())
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientJustification);
    }

    #[test]
    fn test_penalty_auto_clears_when_balance_settles() {
        let mut book = LedgerBook::default();
        let client = ClientId::new();

        book.post_cycle_charges(
            &[billable(client, dec!(10.0000))],
            &tariffs(),
            date(2025, 7, 10),
            "admin-1",
            now(),
        )
        .unwrap();
        let penalty_id = book
            .apply_penalty(client, Money::new(dec!(500.00)), "late payment", "admin-1", now())
            .unwrap()
            .id;

        // Pay the charge plus the penalty in full.
        book.record_payment(
            SubmissionKey::new(),
            client,
            Money::new(dec!(13000.00)),
            "client",
            "cashier-1",
            now(),
        )
        .unwrap();

        assert!(book.balance_for(client).is_zero());
        let penalty = book.penalty(penalty_id).unwrap();
        assert_eq!(penalty.status, PenaltyStatus::Cleared);
        assert_eq!(penalty.resolved_by.as_deref(), Some("system"));
    }

    #[test]
    fn test_waiving_credits_the_unpaid_remainder() {
        let mut book = LedgerBook::default();
        let client = ClientId::new();

        let penalty_id = book
            .apply_penalty(client, Money::new(dec!(500.00)), "late payment", "admin-1", now())
            .unwrap()
            .id;
        book.record_payment(
            SubmissionKey::new(),
            client,
            Money::new(dec!(200.00)),
            "client",
            "cashier-1",
            now(),
        )
        .unwrap();

        let penalty = book
            .waive_penalty(penalty_id, "admin-2", "billing dispute upheld", now())
            .unwrap();
        assert_eq!(penalty.status, PenaltyStatus::Waived);
        assert!(book.balance_for(client).is_zero());
    }

    #[test]
    fn test_tariff_at_approval_date_is_used() {
        let mut book = LedgerBook::default();
        let client = ClientId::new();
        let mut rates = tariffs();
        rates
            .add_rate(date(2025, 8, 1), Tariff::per_cubic_metre(dec!(2000)).unwrap())
            .unwrap();

        book.post_cycle_charges(
            &[billable(client, dec!(10.0000))],
            &rates,
            date(2025, 8, 2),
            "admin-1",
            now(),
        )
        .unwrap();

        assert_eq!(book.balance_for(client), Money::new(dec!(20000.00)));
    }
}
