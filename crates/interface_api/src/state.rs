//! In-process core service
//!
//! One struct owns the authoritative books and engines and exposes the
//! operations the handlers need. Handlers stay thin: they translate DTOs,
//! take the lock, call one method here, and persist what changed. The
//! service is also the [`AuthoritativeView`] the sync feed reads from.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use core_kernel::{
    local_date, AssignmentId, ClientId, Clock, ConflictId, CycleId, HolidayCalendar,
    LedgerEntryId, MeterId, Money, NotificationId, PenaltyId, ReadingId, SubmissionKey, Tariff,
};
use domain_cycle::{BillingCycle, CycleError, CycleScheduler, CycleStatus, ScheduleConfig};
use domain_ledger::{
    BillableReading, LedgerBook, LedgerConfig, LedgerEntry, LedgerError, Outstanding,
    PaymentRecord, Penalty, TariffBook,
};
use domain_metering::{
    AssignmentBook, Conflict, MeterAssignment, MeteringConfig, MeteringEngine, MeteringError,
    Reading, ReadingKind, Resolution, ResolutionDecision, RolloverVerdict, SubmissionOutcome,
    SubmitReading,
};
use domain_notify::{
    AttemptOutcome, DispatchOrder, MessageCategory, NotificationOutbox, NotificationRecord,
    NotifyError, OperatorAlert,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use sync_protocol::{
    AuthoritativeView, EntityKind, EntityPayload, Tombstone, TombstoneReason,
};

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Authoritative state behind the API
pub struct CoreService {
    clock: Arc<dyn Clock>,
    cycles: HashMap<CycleId, BillingCycle>,
    scheduler: CycleScheduler,
    pub assignments: AssignmentBook,
    pub metering: MeteringEngine,
    pub ledger: LedgerBook,
    pub tariffs: TariffBook,
    pub outbox: NotificationOutbox,
    tombstones: Vec<Tombstone>,
    archive_retention_days: u32,
}

impl CoreService {
    pub fn new(clock: Arc<dyn Clock>, config: &ApiConfig) -> Self {
        let scheduler = CycleScheduler::new(
            HolidayCalendar::weekends_only(),
            ScheduleConfig::default(),
        )
        .expect("default schedule config is valid");

        Self {
            cycles: HashMap::new(),
            scheduler,
            assignments: AssignmentBook::new(),
            metering: MeteringEngine::new(MeteringConfig {
                grace_days: config.grace_days,
            }),
            ledger: LedgerBook::new(LedgerConfig::default()),
            tariffs: TariffBook::new(),
            outbox: NotificationOutbox::new(Arc::clone(&clock)),
            tombstones: Vec::new(),
            archive_retention_days: config.archive_retention_days,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // cycles

    pub fn cycle(&self, id: CycleId) -> Result<&BillingCycle, CycleError> {
        self.cycles.get(&id).ok_or(CycleError::NotFound(id))
    }

    pub fn cycles_sorted(&self) -> Vec<BillingCycle> {
        let mut all: Vec<BillingCycle> = self.cycles.values().cloned().collect();
        all.sort_by_key(|c| c.period.start);
        all
    }

    /// Schedules a run of contiguous monthly cycles
    pub fn schedule_cycles(
        &mut self,
        first_month: NaiveDate,
        count: u32,
    ) -> Result<Vec<BillingCycle>, CycleError> {
        let existing: Vec<BillingCycle> = self.cycles.values().cloned().collect();
        let scheduled = self
            .scheduler
            .schedule(first_month, count, &existing, self.now())?;
        for cycle in &scheduled {
            self.cycles.insert(cycle.id, cycle.clone());
        }
        Ok(scheduled)
    }

    pub fn begin_review(&mut self, id: CycleId, explicit: bool) -> Result<BillingCycle, CycleError> {
        let now = self.now();
        let cycle = self.cycles.get_mut(&id).ok_or(CycleError::NotFound(id))?;
        cycle.begin_review(now, explicit)?;
        Ok(cycle.clone())
    }

    /// Deadline sweep: moves every OPEN cycle whose window plus grace has
    /// passed into PENDING_REVIEW. Returns the cycles it transitioned.
    pub fn sweep_overdue_cycles(&mut self) -> Vec<BillingCycle> {
        let now = self.now();
        let mut transitioned = Vec::new();
        for cycle in self.cycles.values_mut() {
            if cycle.status == CycleStatus::Open && cycle.is_overdue(now) {
                if cycle.begin_review(now, false).is_ok() {
                    tracing::info!(cycle = %cycle.id, "overdue cycle moved to review");
                    transitioned.push(cycle.clone());
                }
            }
        }
        transitioned
    }

    /// Approves a cycle and posts its charges in one step
    ///
    /// Refused while any reading in the cycle is non-terminal. On success
    /// every approved reading is billed at the tariff in force today.
    pub fn approve_cycle(
        &mut self,
        id: CycleId,
        approved_by: &str,
    ) -> Result<(BillingCycle, Vec<LedgerEntry>), ApiError> {
        let now = self.now();
        let pending = self.metering.pending_count_for_cycle(id);
        let cycle = self.cycles.get_mut(&id).ok_or(CycleError::NotFound(id))?;
        cycle.approve(now, pending)?;
        let cycle = cycle.clone();

        let billables: Vec<BillableReading> = self
            .metering
            .approved_readings_for_cycle(id)
            .into_iter()
            .map(|r| {
                let client_id = self
                    .assignments
                    .get(r.assignment_id)
                    .map(|a| a.client_id)
                    .map_err(ApiError::from)?;
                Ok(BillableReading {
                    reading_id: r.id,
                    assignment_id: r.assignment_id,
                    client_id,
                    cycle_id: r.cycle_id,
                    consumption: r.consumption,
                    is_baseline: r.kind == ReadingKind::Baseline,
                })
            })
            .collect::<Result<_, ApiError>>()?;

        let posted = self.ledger.post_cycle_charges(
            &billables,
            &self.tariffs,
            local_date(now),
            approved_by,
            now,
        )?;

        let posted_ids: std::collections::HashSet<LedgerEntryId> = posted.into_iter().collect();
        let clients: std::collections::HashSet<ClientId> =
            billables.iter().map(|b| b.client_id).collect();
        let entries: Vec<LedgerEntry> = clients
            .into_iter()
            .flat_map(|c| self.ledger.entries_for(c))
            .filter(|e| posted_ids.contains(&e.id))
            .cloned()
            .collect();

        tracing::info!(cycle = %id, charges = entries.len(), "cycle approved and billed");
        Ok((cycle, entries))
    }

    pub fn close_cycle(&mut self, id: CycleId) -> Result<BillingCycle, CycleError> {
        let now = self.now();
        let cycle = self.cycles.get_mut(&id).ok_or(CycleError::NotFound(id))?;
        cycle.close(now)?;
        let cycle = cycle.clone();
        self.record_tombstone(EntityKind::Cycle, *id.as_uuid(), TombstoneReason::CycleClosed);
        Ok(cycle)
    }

    pub fn archive_cycle(&mut self, id: CycleId) -> Result<BillingCycle, CycleError> {
        let now = self.now();
        let retention = self.archive_retention_days;
        let cycle = self.cycles.get_mut(&id).ok_or(CycleError::NotFound(id))?;
        cycle.archive(now, retention)?;
        let cycle = cycle.clone();
        self.record_tombstone(EntityKind::Cycle, *id.as_uuid(), TombstoneReason::CycleArchived);
        Ok(cycle)
    }

    // assignments

    pub fn assign_meter(&mut self, meter_id: MeterId, client_id: ClientId) -> AssignmentId {
        let now = self.now();
        if let Ok(previous) = self.assignments.active_for_meter(meter_id) {
            let ended = *previous.id.as_uuid();
            self.record_tombstone(
                EntityKind::Assignment,
                ended,
                TombstoneReason::AssignmentEnded,
            );
        }
        self.assignments.assign(meter_id, client_id, now)
    }

    pub fn end_assignment(&mut self, id: AssignmentId) -> Result<(), MeteringError> {
        let now = self.now();
        self.assignments.end_assignment(id, now)?;
        self.record_tombstone(
            EntityKind::Assignment,
            *id.as_uuid(),
            TombstoneReason::AssignmentEnded,
        );
        Ok(())
    }

    // readings

    pub fn submit_reading(&mut self, cmd: SubmitReading) -> Result<SubmissionOutcome, ApiError> {
        let now = self.now();
        let assignment = self.assignments.get(cmd.assignment_id)?.clone();
        let cycle = self.cycle(cmd.cycle_id)?.clone();
        Ok(self.metering.submit(cmd, &assignment, &cycle, now)?)
    }

    pub fn approve_reading(
        &mut self,
        id: ReadingId,
        approved_by: &str,
    ) -> Result<Reading, MeteringError> {
        let now = self.now();
        self.metering.approve_reading(id, approved_by, now).cloned()
    }

    pub fn reject_reading(&mut self, id: ReadingId, reason: &str) -> Result<Reading, MeteringError> {
        let now = self.now();
        let reading = self.metering.reject_reading(id, reason, now)?.clone();
        self.record_tombstone(
            EntityKind::Reading,
            *id.as_uuid(),
            TombstoneReason::ReadingRejected,
        );
        Ok(reading)
    }

    pub fn verify_rollover(
        &mut self,
        id: ReadingId,
        verdict: RolloverVerdict,
        verified_by: &str,
    ) -> Result<Reading, MeteringError> {
        let now = self.now();
        let reading = self.metering.verify_rollover(id, verdict, verified_by, now)?.clone();
        if reading.is_rejected() {
            self.record_tombstone(
                EntityKind::Reading,
                *id.as_uuid(),
                TombstoneReason::ReadingRejected,
            );
        }
        Ok(reading)
    }

    pub fn resolve_conflict(
        &mut self,
        conflict_id: ConflictId,
        decision: ResolutionDecision,
        resolved_by: &str,
        reason: &str,
    ) -> Result<Resolution, MeteringError> {
        let now = self.now();
        let resolution = self
            .metering
            .resolve(conflict_id, decision, resolved_by, reason, now)?;
        for rejected in &resolution.rejected_readings {
            self.record_tombstone(
                EntityKind::Reading,
                *rejected.as_uuid(),
                TombstoneReason::ReadingRejected,
            );
        }
        Ok(resolution)
    }

    // ledger

    pub fn add_tariff(&mut self, effective: NaiveDate, rate: Decimal) -> Result<(), LedgerError> {
        let tariff = Tariff::per_cubic_metre(rate)?;
        self.tariffs.add_rate(effective, tariff)
    }

    pub fn record_payment(
        &mut self,
        key: SubmissionKey,
        client_id: ClientId,
        amount: Money,
        received_from: &str,
        recorded_by: &str,
    ) -> Result<PaymentRecord, LedgerError> {
        let now = self.now();
        self.ledger
            .record_payment(key, client_id, amount, received_from, recorded_by, now)
            .cloned()
    }

    pub fn apply_penalty(
        &mut self,
        client_id: ClientId,
        amount: Money,
        reason: &str,
        applied_by: &str,
    ) -> Result<Penalty, LedgerError> {
        let now = self.now();
        self.ledger
            .apply_penalty(client_id, amount, reason, applied_by, now)
            .cloned()
    }

    pub fn waive_penalty(
        &mut self,
        penalty_id: PenaltyId,
        waived_by: &str,
        note: &str,
    ) -> Result<Penalty, LedgerError> {
        let now = self.now();
        self.ledger.waive_penalty(penalty_id, waived_by, note, now).cloned()
    }

    pub fn balance_for(&self, client_id: ClientId) -> Money {
        self.ledger.balance_for(client_id)
    }

    pub fn outstanding_for(&self, client_id: ClientId) -> Vec<Outstanding> {
        self.ledger.outstanding_for(client_id)
    }

    pub fn entries_for(&self, client_id: ClientId) -> Vec<LedgerEntry> {
        self.ledger.entries_for(client_id).cloned().collect()
    }

    // notifications

    pub fn enqueue_notification(
        &mut self,
        client_id: ClientId,
        category: MessageCategory,
        recipient: &str,
        body: &str,
    ) -> NotificationId {
        self.outbox.enqueue(client_id, category, recipient, body)
    }

    pub fn sweep_notifications(&mut self) -> Vec<DispatchOrder> {
        self.outbox.sweep()
    }

    pub fn delivery_callback(
        &mut self,
        message_id: NotificationId,
        attempt: u8,
        outcome: AttemptOutcome,
        gateway_reference: Option<String>,
        gateway_response: Option<String>,
    ) -> Result<NotificationRecord, NotifyError> {
        self.outbox
            .delivery_callback(message_id, attempt, outcome, gateway_reference, gateway_response)
            .cloned()
    }

    pub fn alerts(&self) -> &[OperatorAlert] {
        self.outbox.alerts()
    }

    // sync

    pub fn tombstones(&self) -> &[Tombstone] {
        &self.tombstones
    }

    fn record_tombstone(&mut self, kind: EntityKind, entity_id: uuid::Uuid, reason: TombstoneReason) {
        self.tombstones.push(Tombstone {
            kind,
            entity_id,
            reason,
            at: self.now(),
        });
    }
}

impl AuthoritativeView for CoreService {
    fn recent_cycles(&self, limit: usize) -> Vec<BillingCycle> {
        let mut all = self.cycles_sorted();
        all.reverse();
        all.truncate(limit);
        all
    }

    fn active_assignments(&self) -> Vec<MeterAssignment> {
        self.assignments.active().cloned().collect()
    }

    fn approved_readings_in(&self, cycles: &[CycleId]) -> Vec<Reading> {
        cycles
            .iter()
            .flat_map(|id| self.metering.approved_readings_for_cycle(*id))
            .cloned()
            .collect()
    }

    fn unresolved_conflicts(&self) -> Vec<Conflict> {
        self.metering.open_conflicts().cloned().collect()
    }

    fn changed_since(&self, since: DateTime<Utc>) -> Vec<EntityPayload> {
        let mut changed: Vec<EntityPayload> = Vec::new();
        changed.extend(
            self.cycles
                .values()
                .filter(|c| c.updated_at > since)
                .cloned()
                .map(EntityPayload::Cycle),
        );
        changed.extend(
            self.assignments
                .changed_since(since)
                .cloned()
                .map(EntityPayload::Assignment),
        );
        changed.extend(
            self.metering
                .readings_changed_since(since)
                .cloned()
                .map(EntityPayload::Reading),
        );
        changed.extend(
            self.metering
                .conflicts_changed_since(since)
                .cloned()
                .map(EntityPayload::Conflict),
        );
        changed
    }

    fn tombstones_since(&self, since: DateTime<Utc>) -> Vec<Tombstone> {
        self.tombstones
            .iter()
            .filter(|t| t.at > since)
            .cloned()
            .collect()
    }
}
