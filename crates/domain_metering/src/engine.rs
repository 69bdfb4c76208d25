//! Reading submission engine
//!
//! Single entry point for every reading mutation, whether captured
//! interactively or uploaded from an offline queue. Enforces the
//! validation order (active assignment, submission window, baseline,
//! consumption assessment), routes competing submissions to conflict
//! records, and keeps submissions idempotent by client-assigned key.
//!
//! Mutations for one (assignment, cycle) slot are serialized through the
//! engine; each slot carries a version counter so a persistence layer can
//! apply the same optimistic check transactionally. The losing side of a
//! concurrent pair is routed to conflict detection, never dropped.

use chrono::{DateTime, Duration, Utc};
use core_kernel::{
    AnomalyId, AssignmentId, ConflictId, CycleId, ReadingId, SubmissionKey, Volume, VolumeDelta,
};
use domain_cycle::{BillingCycle, CycleStatus, WindowStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::anomaly::{Anomaly, AnomalyKind};
use crate::assignment::MeterAssignment;
use crate::conflict::{
    resolve_conflict, Conflict, ConflictStatus, Resolution, ResolutionDecision, Submission,
};
use crate::consumption::{
    assess_consumption, rollover_consumption, ConsumptionAssessment, RolloverVerdict,
};
use crate::error::MeteringError;
use crate::reading::{Reading, ReadingKind, ReadingSource, ReadingStatus};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringConfig {
    /// Days past the submission window during which submissions are still
    /// admitted without an override
    pub grace_days: u16,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self { grace_days: 3 }
    }
}

/// A submission command
#[derive(Debug, Clone)]
pub struct SubmitReading {
    /// Client-assigned idempotency key
    pub submission_key: SubmissionKey,
    pub assignment_id: AssignmentId,
    pub cycle_id: CycleId,
    pub value: Volume,
    pub submitted_by: String,
    pub source: ReadingSource,
    pub note: Option<String>,
    /// Operator override admitting a late submission. Cycle-local: it never
    /// changes the cycle's stored window or later schedules.
    pub allow_late: bool,
    /// Optimistic slot version observed by the caller, when known
    pub expected_version: Option<u64>,
}

/// What happened to a submission
///
/// Every variant is a legitimate, queryable state; only structural
/// violations surface as [`MeteringError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    /// Stored and awaiting approval
    Accepted(ReadingId),
    /// First reading on the assignment: anchored, zero consumption
    Baseline(ReadingId),
    /// Suspected counter rollover: held for manual verification
    PendingRollover(ReadingId),
    /// A competing value exists; both submissions are locked
    Conflicted {
        reading_id: ReadingId,
        conflict_id: ConflictId,
    },
    /// Idempotent replay or identical resubmission: nothing new created
    Replayed(ReadingId),
}

impl SubmissionOutcome {
    pub fn reading_id(&self) -> ReadingId {
        match self {
            SubmissionOutcome::Accepted(id)
            | SubmissionOutcome::Baseline(id)
            | SubmissionOutcome::PendingRollover(id)
            | SubmissionOutcome::Replayed(id)
            | SubmissionOutcome::Conflicted { reading_id: id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    version: u64,
    readings: Vec<ReadingId>,
}

/// In-memory authoritative store for readings, conflicts, and anomalies
#[derive(Debug, Default)]
pub struct MeteringEngine {
    config: MeteringConfig,
    readings: HashMap<ReadingId, Reading>,
    slots: HashMap<(AssignmentId, CycleId), Slot>,
    by_submission_key: HashMap<SubmissionKey, SubmissionOutcome>,
    conflicts: HashMap<ConflictId, Conflict>,
    anomalies: Vec<Anomaly>,
}

impl MeteringEngine {
    pub fn new(config: MeteringConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Whether a submission key has already been accepted
    pub fn known_submission(&self, key: &SubmissionKey) -> bool {
        self.by_submission_key.contains_key(key)
    }

    /// Current optimistic version of a slot (0 when untouched)
    pub fn slot_version(&self, assignment_id: AssignmentId, cycle_id: CycleId) -> u64 {
        self.slots
            .get(&(assignment_id, cycle_id))
            .map(|s| s.version)
            .unwrap_or(0)
    }

    /// Submits a reading
    ///
    /// Validation order: idempotency replay, active assignment, submission
    /// window (with grace and override), then competing-value detection and
    /// consumption assessment.
    pub fn submit(
        &mut self,
        cmd: SubmitReading,
        assignment: &MeterAssignment,
        cycle: &BillingCycle,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, MeteringError> {
        // Replaying an accepted upload collapses onto the stored reading.
        // A conflicted submission replays as the same open conflict so the
        // caller keeps seeing it until an operator resolves it.
        if let Some(outcome) = self.by_submission_key.get(&cmd.submission_key) {
            return Ok(match outcome {
                SubmissionOutcome::Conflicted { .. } => outcome.clone(),
                other => SubmissionOutcome::Replayed(other.reading_id()),
            });
        }

        if !assignment.is_active() {
            return Err(MeteringError::AssignmentInactive(assignment.id));
        }

        self.check_window(cycle, now, cmd.allow_late)?;

        let key = (cmd.assignment_id, cmd.cycle_id);
        if let Some(expected) = cmd.expected_version {
            let actual = self.slot_version(cmd.assignment_id, cmd.cycle_id);
            if expected != actual {
                return Err(MeteringError::VersionMismatch {
                    assignment: cmd.assignment_id,
                    cycle: cmd.cycle_id,
                    expected,
                    actual,
                });
            }
        }

        // Identical value against any live reading on the slot is a no-op;
        // a differing value locks both sides into a conflict.
        let competing = self.live_reading_on_slot(key);
        if let Some(existing_id) = competing {
            let existing = self.readings[&existing_id].clone();

            if existing.value == cmd.value {
                let outcome = SubmissionOutcome::Replayed(existing_id);
                self.by_submission_key.insert(cmd.submission_key, outcome.clone());
                return Ok(outcome);
            }

            return Ok(self.open_conflict(cmd, existing, now));
        }

        let previous = self.latest_approved_value(cmd.assignment_id);
        let assessment = assess_consumption(cmd.value, previous);

        let mut reading = Reading {
            id: ReadingId::new_v7(),
            submission_key: cmd.submission_key,
            assignment_id: cmd.assignment_id,
            cycle_id: cmd.cycle_id,
            value: cmd.value,
            kind: ReadingKind::Normal,
            status: ReadingStatus::Submitted,
            source: cmd.source,
            previous_value: previous,
            consumption: None,
            submitted_by: cmd.submitted_by.clone(),
            submitted_at: now,
            approved_by: None,
            approved_at: None,
            note: cmd.note.clone(),
            updated_at: now,
        };

        let outcome = match assessment {
            ConsumptionAssessment::Baseline => {
                reading.kind = ReadingKind::Baseline;
                reading.consumption = Some(VolumeDelta::zero());
                reading.status = ReadingStatus::Approved;
                reading.approved_by = Some("system".to_string());
                reading.approved_at = Some(now);
                SubmissionOutcome::Baseline(reading.id)
            }
            ConsumptionAssessment::Normal(delta) => {
                reading.consumption = Some(delta);
                SubmissionOutcome::Accepted(reading.id)
            }
            ConsumptionAssessment::SuspectedRollover => {
                reading.status = ReadingStatus::PendingRollover;
                SubmissionOutcome::PendingRollover(reading.id)
            }
            ConsumptionAssessment::NegativeAnomaly(delta) => {
                tracing::warn!(
                    reading = %reading.id,
                    assignment = %cmd.assignment_id,
                    delta = %delta,
                    "negative consumption outside rollover band"
                );
                self.anomalies.push(Anomaly::detect(
                    AnomalyKind::NegativeConsumption,
                    cmd.assignment_id,
                    cmd.cycle_id,
                    reading.id,
                    format!("counter moved backwards by {delta}"),
                    now,
                ));
                // Billing proceeds on the raw delta unless an operator
                // intervenes via the anomaly record.
                reading.consumption = Some(delta);
                SubmissionOutcome::Accepted(reading.id)
            }
        };

        self.insert_reading(reading);
        self.by_submission_key.insert(cmd.submission_key, outcome.clone());
        Ok(outcome)
    }

    fn check_window(
        &self,
        cycle: &BillingCycle,
        now: DateTime<Utc>,
        allow_late: bool,
    ) -> Result<(), MeteringError> {
        match cycle.status {
            CycleStatus::Open | CycleStatus::PendingReview => {
                match cycle.submission_status(now, self.config.grace_days) {
                    WindowStatus::InWindow | WindowStatus::Grace => Ok(()),
                    WindowStatus::Late if allow_late => Ok(()),
                    WindowStatus::Late => Err(MeteringError::LateSubmission {
                        cycle: cycle.id,
                        grace_ends: cycle.window.closes()
                            + Duration::days(self.config.grace_days as i64),
                    }),
                }
            }
            status => Err(MeteringError::CycleNotAccepting {
                cycle: cycle.id,
                status,
            }),
        }
    }

    fn open_conflict(
        &mut self,
        cmd: SubmitReading,
        existing: Reading,
        now: DateTime<Utc>,
    ) -> SubmissionOutcome {
        let previous = self.latest_approved_value(cmd.assignment_id);

        let reading = Reading {
            id: ReadingId::new_v7(),
            submission_key: cmd.submission_key,
            assignment_id: cmd.assignment_id,
            cycle_id: cmd.cycle_id,
            value: cmd.value,
            kind: ReadingKind::Normal,
            status: ReadingStatus::Conflicted,
            source: cmd.source,
            previous_value: previous,
            consumption: None,
            submitted_by: cmd.submitted_by.clone(),
            submitted_at: now,
            approved_by: None,
            approved_at: None,
            note: cmd.note,
            updated_at: now,
        };

        let conflict = Conflict::open(
            cmd.assignment_id,
            cmd.cycle_id,
            Submission {
                reading_id: existing.id,
                value: existing.value,
                submitted_by: existing.submitted_by.clone(),
                submitted_at: existing.submitted_at,
            },
            Submission {
                reading_id: reading.id,
                value: reading.value,
                submitted_by: reading.submitted_by.clone(),
                submitted_at: reading.submitted_at,
            },
            now,
        );

        // Lock the competing side too, unless it was already approved.
        if !existing.status.is_terminal() {
            if let Some(r) = self.readings.get_mut(&existing.id) {
                r.status = ReadingStatus::Conflicted;
                r.updated_at = now;
            }
        }

        tracing::warn!(
            conflict = %conflict.id,
            assignment = %cmd.assignment_id,
            cycle = %cmd.cycle_id,
            "competing submission locked for adjudication"
        );

        let outcome = SubmissionOutcome::Conflicted {
            reading_id: reading.id,
            conflict_id: conflict.id,
        };
        self.conflicts.insert(conflict.id, conflict);
        self.insert_reading(reading);
        self.by_submission_key.insert(cmd.submission_key, outcome.clone());
        outcome
    }

    fn insert_reading(&mut self, reading: Reading) {
        let slot = self
            .slots
            .entry((reading.assignment_id, reading.cycle_id))
            .or_default();
        slot.version += 1;
        slot.readings.push(reading.id);
        self.readings.insert(reading.id, reading);
    }

    /// The newest non-rejected reading on a slot, if any
    fn live_reading_on_slot(&self, key: (AssignmentId, CycleId)) -> Option<ReadingId> {
        let slot = self.slots.get(&key)?;
        slot.readings
            .iter()
            .rev()
            .find(|id| {
                self.readings
                    .get(id)
                    .map(|r| !r.is_rejected())
                    .unwrap_or(false)
            })
            .copied()
    }

    /// Approves a submitted reading
    ///
    /// Suspected rollovers must go through [`Self::verify_rollover`];
    /// conflicted readings through [`Self::resolve`].
    pub fn approve_reading(
        &mut self,
        id: ReadingId,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<&Reading, MeteringError> {
        let reading = self
            .readings
            .get_mut(&id)
            .ok_or(MeteringError::ReadingNotFound(id))?;

        match reading.status {
            ReadingStatus::Submitted => {
                reading.approve(approved_by, now)?;
                Ok(&*reading)
            }
            ReadingStatus::PendingRollover => {
                Err(MeteringError::RolloverPendingVerification(id))
            }
            ReadingStatus::Conflicted => Err(MeteringError::ReadingConflicted(id)),
            _ => Err(MeteringError::ReadingImmutable {
                id,
                status: reading.status.clone(),
            }),
        }
    }

    /// Rejects a reading with a mandatory reason. The record is retained.
    pub fn reject_reading(
        &mut self,
        id: ReadingId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<&Reading, MeteringError> {
        if reason.trim().is_empty() {
            return Err(MeteringError::InsufficientJustification);
        }
        let reading = self
            .readings
            .get_mut(&id)
            .ok_or(MeteringError::ReadingNotFound(id))?;
        reading.reject(reason, now)?;
        Ok(&*reading)
    }

    /// Applies a verifier's rollover verdict
    pub fn verify_rollover(
        &mut self,
        id: ReadingId,
        verdict: RolloverVerdict,
        verified_by: &str,
        now: DateTime<Utc>,
    ) -> Result<&Reading, MeteringError> {
        let reading = self
            .readings
            .get_mut(&id)
            .ok_or(MeteringError::ReadingNotFound(id))?;

        if reading.status != ReadingStatus::PendingRollover {
            return Err(MeteringError::NotPendingRollover(id));
        }

        match verdict {
            RolloverVerdict::GenuineRollover => {
                let previous = reading
                    .previous_value
                    .expect("rollover suspect always has an anchor");
                reading.consumption = Some(rollover_consumption(reading.value, previous));
                reading.approve(verified_by, now)?;
                tracing::info!(reading = %id, "rollover verified genuine");
            }
            RolloverVerdict::MeterFault => {
                reading.reject("meter fault confirmed on verification", now)?;
                tracing::info!(reading = %id, "rollover verdict: meter fault, resubmission required");
            }
        }
        Ok(&*reading)
    }

    /// Adjudicates a conflict and applies the resolution to both readings
    pub fn resolve(
        &mut self,
        conflict_id: ConflictId,
        decision: ResolutionDecision,
        resolved_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Resolution, MeteringError> {
        let conflict = self
            .conflicts
            .get(&conflict_id)
            .ok_or(MeteringError::ConflictNotFound(conflict_id))?;

        let resolution = resolve_conflict(conflict, decision, resolved_by, reason, now)?;

        let previous = self.latest_approved_value(conflict.assignment_id);

        for loser in &resolution.rejected_readings {
            if let Some(r) = self.readings.get_mut(loser) {
                r.mark_superseded(format!("conflict resolved: {reason}"), now);
            }
        }

        if let Some(winner) = self.readings.get_mut(&resolution.winning_reading) {
            winner.value = resolution.selected_value;
            if !winner.is_approved() {
                winner.consumption = Some(match previous {
                    Some(previous) => resolution.selected_value.delta_from(previous),
                    None => VolumeDelta::zero(),
                });
                winner.approve(resolved_by, now)?;
            }
        }

        let conflict = self
            .conflicts
            .get_mut(&conflict_id)
            .expect("conflict looked up above");
        conflict.status = ConflictStatus::Resolved;
        conflict.resolution = Some(resolution.clone());
        conflict.updated_at = now;

        if let Some(slot) = self
            .slots
            .get_mut(&(conflict.assignment_id, conflict.cycle_id))
        {
            slot.version += 1;
        }

        tracing::info!(conflict = %conflict_id, resolver = resolved_by, "conflict resolved");
        Ok(resolution)
    }

    /// Latest approved counter value on an assignment (the consumption
    /// anchor). Never crosses assignment boundaries.
    pub fn latest_approved_value(&self, assignment_id: AssignmentId) -> Option<Volume> {
        self.readings
            .values()
            .filter(|r| r.assignment_id == assignment_id && r.is_approved())
            .max_by_key(|r| (r.approved_at, r.submitted_at))
            .map(|r| r.value)
    }

    pub fn reading(&self, id: ReadingId) -> Result<&Reading, MeteringError> {
        self.readings.get(&id).ok_or(MeteringError::ReadingNotFound(id))
    }

    pub fn conflict(&self, id: ConflictId) -> Result<&Conflict, MeteringError> {
        self.conflicts
            .get(&id)
            .ok_or(MeteringError::ConflictNotFound(id))
    }

    pub fn readings_for_cycle(&self, cycle_id: CycleId) -> impl Iterator<Item = &Reading> {
        self.readings.values().filter(move |r| r.cycle_id == cycle_id)
    }

    /// Readings in a cycle that have not reached a terminal status
    pub fn pending_count_for_cycle(&self, cycle_id: CycleId) -> usize {
        self.readings_for_cycle(cycle_id)
            .filter(|r| !r.status.is_terminal())
            .count()
    }

    pub fn approved_readings_for_cycle(&self, cycle_id: CycleId) -> Vec<&Reading> {
        self.readings_for_cycle(cycle_id)
            .filter(|r| r.is_approved())
            .collect()
    }

    pub fn open_conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts
            .values()
            .filter(|c| c.status == ConflictStatus::Open)
    }

    pub fn conflicts_changed_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values().filter(move |c| c.updated_at > since)
    }

    pub fn readings_changed_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &Reading> {
        self.readings.values().filter(move |r| r.updated_at > since)
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn anomaly(&self, id: AnomalyId) -> Result<&Anomaly, MeteringError> {
        self.anomalies
            .iter()
            .find(|a| a.id == id)
            .ok_or(MeteringError::AnomalyNotFound(id))
    }

    /// Marks an anomaly as seen by an operator. Billing is unaffected.
    pub fn acknowledge_anomaly(
        &mut self,
        id: AnomalyId,
        acknowledged_by: &str,
    ) -> Result<&Anomaly, MeteringError> {
        let anomaly = self
            .anomalies
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(MeteringError::AnomalyNotFound(id))?;
        anomaly.acknowledge(acknowledged_by);
        Ok(&*anomaly)
    }

    /// Closes an anomaly with the operator's conclusion
    pub fn resolve_anomaly(
        &mut self,
        id: AnomalyId,
        resolved_by: &str,
        note: &str,
    ) -> Result<&Anomaly, MeteringError> {
        if note.trim().is_empty() {
            return Err(MeteringError::InsufficientJustification);
        }
        let anomaly = self
            .anomalies
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(MeteringError::AnomalyNotFound(id))?;
        anomaly.resolve(resolved_by, note);
        tracing::info!(anomaly = %id, resolver = resolved_by, "anomaly resolved");
        Ok(&*anomaly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use core_kernel::{ClientId, DateRange, MeterId};
    use domain_cycle::SubmissionWindow;
    use rust_decimal_macros::dec;

    fn v(value: rust_decimal::Decimal) -> Volume {
        Volume::new(value).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cycle_for(month: u32, now: DateTime<Utc>) -> BillingCycle {
        let period = DateRange::new(date(2025, month, 1), date(2025, month, 30)).unwrap();
        let window = SubmissionWindow::new(date(2025, month + 1, 5), 2);
        BillingCycle::open(period, window, now)
    }

    struct Fixture {
        engine: MeteringEngine,
        assignment: MeterAssignment,
        june: BillingCycle,
        july: BillingCycle,
        now: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let now = Utc.with_ymd_and_hms(2025, 7, 4, 9, 0, 0).unwrap();
        Fixture {
            engine: MeteringEngine::new(MeteringConfig::default()),
            assignment: MeterAssignment::start(MeterId::new(), ClientId::new(), now),
            june: cycle_for(6, now),
            july: cycle_for(7, now),
            now,
        }
    }

    fn cmd(f: &Fixture, cycle: &BillingCycle, value: Volume) -> SubmitReading {
        SubmitReading {
            submission_key: SubmissionKey::new(),
            assignment_id: f.assignment.id,
            cycle_id: cycle.id,
            value,
            submitted_by: "collector-1".to_string(),
            source: ReadingSource::Capture,
            note: None,
            allow_late: false,
            expected_version: None,
        }
    }

    fn submit(f: &mut Fixture, cycle: &BillingCycle, value: Volume) -> SubmissionOutcome {
        let c = cmd(f, cycle, value);
        f.engine.submit(c, &f.assignment, cycle, f.now).unwrap()
    }

    #[test]
    fn test_first_reading_becomes_approved_baseline() {
        let mut f = fixture();
        let june = f.june.clone();
        let outcome = submit(&mut f, &june, v(dec!(120.0000)));

        let SubmissionOutcome::Baseline(id) = outcome else {
            panic!("expected baseline, got {outcome:?}");
        };
        let reading = f.engine.reading(id).unwrap();
        assert!(reading.is_approved());
        assert_eq!(reading.kind, ReadingKind::Baseline);
        assert_eq!(reading.consumption, Some(VolumeDelta::zero()));
        assert_eq!(
            f.engine.latest_approved_value(f.assignment.id),
            Some(v(dec!(120.0000)))
        );
    }

    #[test]
    fn test_normal_submission_computes_consumption_from_anchor() {
        let mut f = fixture();
        let (june, july) = (f.june.clone(), f.july.clone());
        submit(&mut f, &june, v(dec!(120.0000)));

        let outcome = submit(&mut f, &july, v(dec!(150.0000)));
        let SubmissionOutcome::Accepted(id) = outcome else {
            panic!("expected accepted, got {outcome:?}");
        };
        let reading = f.engine.reading(id).unwrap();
        assert_eq!(reading.status, ReadingStatus::Submitted);
        assert_eq!(reading.consumption, Some(VolumeDelta::new(dec!(30.0000))));
        assert_eq!(reading.previous_value, Some(v(dec!(120.0000))));
    }

    #[test]
    fn test_replaying_a_submission_key_collapses_onto_the_stored_reading() {
        let mut f = fixture();
        let june = f.june.clone();
        let c = cmd(&f, &june, v(dec!(120.0000)));

        let first = f.engine.submit(c.clone(), &f.assignment, &june, f.now).unwrap();
        let replay = f.engine.submit(c, &f.assignment, &june, f.now).unwrap();
        assert_eq!(replay, SubmissionOutcome::Replayed(first.reading_id()));
    }

    #[test]
    fn test_identical_value_under_new_key_is_a_no_op() {
        let mut f = fixture();
        let june = f.june.clone();
        let first = submit(&mut f, &june, v(dec!(120.0000)));
        let second = submit(&mut f, &june, v(dec!(120.0000)));

        assert_eq!(second, SubmissionOutcome::Replayed(first.reading_id()));
    }

    #[test]
    fn test_differing_values_lock_both_sides_into_a_conflict() {
        let mut f = fixture();
        let (june, july) = (f.june.clone(), f.july.clone());
        submit(&mut f, &june, v(dec!(120.0000)));

        let first = submit(&mut f, &july, v(dec!(150.0000)));
        let second = submit(&mut f, &july, v(dec!(155.0000)));

        let SubmissionOutcome::Conflicted {
            reading_id,
            conflict_id,
        } = second
        else {
            panic!("expected conflict, got {second:?}");
        };

        assert_eq!(
            f.engine.reading(first.reading_id()).unwrap().status,
            ReadingStatus::Conflicted
        );
        assert_eq!(
            f.engine.reading(reading_id).unwrap().status,
            ReadingStatus::Conflicted
        );
        assert_eq!(f.engine.open_conflicts().count(), 1);
        assert!(f.engine.conflict(conflict_id).is_ok());
    }

    #[test]
    fn test_resolution_approves_winner_and_rejects_loser() {
        let mut f = fixture();
        let (june, july) = (f.june.clone(), f.july.clone());
        submit(&mut f, &june, v(dec!(120.0000)));
        let first = submit(&mut f, &july, v(dec!(150.0000)));
        let second = submit(&mut f, &july, v(dec!(155.0000)));
        let SubmissionOutcome::Conflicted { conflict_id, .. } = second.clone() else {
            panic!("expected conflict");
        };

        let resolution = f
            .engine
            .resolve(
                conflict_id,
                ResolutionDecision::AcceptSecond,
                "admin-1",
                "second photo is legible",
                f.now,
            )
            .unwrap();

        let winner = f.engine.reading(resolution.winning_reading).unwrap();
        assert!(winner.is_approved());
        assert_eq!(winner.value, v(dec!(155.0000)));
        assert_eq!(winner.consumption, Some(VolumeDelta::new(dec!(35.0000))));

        let loser = f.engine.reading(first.reading_id()).unwrap();
        assert!(loser.is_rejected());
        assert_eq!(f.engine.open_conflicts().count(), 0);

        // Resubmitting the resolved value is a replay, not a new conflict.
        let resubmit = submit(&mut f, &july, v(dec!(155.0000)));
        assert_eq!(resubmit, SubmissionOutcome::Replayed(resolution.winning_reading));
    }

    #[test]
    fn test_late_submission_needs_an_override() {
        let mut f = fixture();
        // Window for June closes 2025-07-07, grace ends 2025-07-10.
        f.now = Utc.with_ymd_and_hms(2025, 7, 12, 9, 0, 0).unwrap();
        let june = f.june.clone();

        let c = cmd(&f, &june, v(dec!(120.0000)));
        let err = f
            .engine
            .submit(c.clone(), &f.assignment, &june, f.now)
            .unwrap_err();
        assert!(matches!(err, MeteringError::LateSubmission { .. }));

        let mut overridden = cmd(&f, &june, v(dec!(120.0000)));
        overridden.allow_late = true;
        assert!(f
            .engine
            .submit(overridden, &f.assignment, &june, f.now)
            .is_ok());
    }

    #[test]
    fn test_terminal_cycle_refuses_submissions() {
        let mut f = fixture();
        let mut june = f.june.clone();
        june.status = CycleStatus::Closed;

        let c = cmd(&f, &june, v(dec!(120.0000)));
        let err = f.engine.submit(c, &f.assignment, &june, f.now).unwrap_err();
        assert!(matches!(err, MeteringError::CycleNotAccepting { .. }));
    }

    #[test]
    fn test_ended_assignment_refuses_submissions() {
        let mut f = fixture();
        f.assignment.end(f.now);
        let june = f.june.clone();

        let c = cmd(&f, &june, v(dec!(120.0000)));
        let err = f.engine.submit(c, &f.assignment, &june, f.now).unwrap_err();
        assert_eq!(err, MeteringError::AssignmentInactive(f.assignment.id));
    }

    #[test]
    fn test_rollover_suspect_held_then_verified_genuine() {
        let mut f = fixture();
        let (june, july) = (f.june.clone(), f.july.clone());
        submit(&mut f, &june, v(dec!(99_000.0000)));

        let outcome = submit(&mut f, &july, v(dec!(500.0000)));
        let SubmissionOutcome::PendingRollover(id) = outcome else {
            panic!("expected pending rollover, got {outcome:?}");
        };

        // Direct approval is refused while verification is pending.
        assert!(matches!(
            f.engine.approve_reading(id, "admin-1", f.now),
            Err(MeteringError::RolloverPendingVerification(_))
        ));

        let reading = f
            .engine
            .verify_rollover(id, RolloverVerdict::GenuineRollover, "admin-1", f.now)
            .unwrap();
        assert!(reading.is_approved());
        assert_eq!(reading.consumption, Some(VolumeDelta::new(dec!(1_499.9999))));
    }

    #[test]
    fn test_rollover_meter_fault_rejects_the_reading() {
        let mut f = fixture();
        let (june, july) = (f.june.clone(), f.july.clone());
        submit(&mut f, &june, v(dec!(99_000.0000)));

        let outcome = submit(&mut f, &july, v(dec!(500.0000)));
        let id = outcome.reading_id();

        let reading = f
            .engine
            .verify_rollover(id, RolloverVerdict::MeterFault, "admin-1", f.now)
            .unwrap();
        assert!(reading.is_rejected());
        // The anchor is untouched.
        assert_eq!(
            f.engine.latest_approved_value(f.assignment.id),
            Some(v(dec!(99_000.0000)))
        );
    }

    #[test]
    fn test_negative_delta_below_high_water_records_an_anomaly() {
        let mut f = fixture();
        let (june, july) = (f.june.clone(), f.july.clone());
        submit(&mut f, &june, v(dec!(120.0000)));

        let outcome = submit(&mut f, &july, v(dec!(100.0000)));
        let SubmissionOutcome::Accepted(id) = outcome else {
            panic!("expected accepted, got {outcome:?}");
        };

        let reading = f.engine.reading(id).unwrap();
        assert_eq!(reading.consumption, Some(VolumeDelta::new(dec!(-20.0000))));
        assert_eq!(f.engine.anomalies().len(), 1);
        assert_eq!(f.engine.anomalies()[0].reading_id, id);
    }

    #[test]
    fn test_anomaly_is_acknowledged_then_resolved() {
        let mut f = fixture();
        let (june, july) = (f.june.clone(), f.july.clone());
        submit(&mut f, &june, v(dec!(120.0000)));
        submit(&mut f, &july, v(dec!(100.0000)));
        let id = f.engine.anomalies()[0].id;

        let acked = f.engine.acknowledge_anomaly(id, "admin-1").unwrap();
        assert_eq!(acked.status, crate::anomaly::AnomalyStatus::Acknowledged);

        let err = f.engine.resolve_anomaly(id, "admin-1", "  ").unwrap_err();
        assert_eq!(err, MeteringError::InsufficientJustification);

        let resolved = f
            .engine
            .resolve_anomaly(id, "admin-1", "meter swapped during survey")
            .unwrap();
        assert_eq!(resolved.status, crate::anomaly::AnomalyStatus::Resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("admin-1"));

        let missing = f.engine.acknowledge_anomaly(AnomalyId::new(), "admin-1");
        assert!(matches!(missing, Err(MeteringError::AnomalyNotFound(_))));
    }

    #[test]
    fn test_stale_slot_version_is_refused() {
        let mut f = fixture();
        let june = f.june.clone();
        submit(&mut f, &june, v(dec!(120.0000)));

        let mut stale = cmd(&f, &june, v(dec!(125.0000)));
        stale.expected_version = Some(0);
        let err = f.engine.submit(stale, &f.assignment, &june, f.now).unwrap_err();
        assert!(matches!(err, MeteringError::VersionMismatch { actual: 1, .. }));
    }

    #[test]
    fn test_pending_count_tracks_non_terminal_readings() {
        let mut f = fixture();
        let (june, july) = (f.june.clone(), f.july.clone());
        submit(&mut f, &june, v(dec!(120.0000)));
        assert_eq!(f.engine.pending_count_for_cycle(june.id), 0);

        let outcome = submit(&mut f, &july, v(dec!(150.0000)));
        assert_eq!(f.engine.pending_count_for_cycle(july.id), 1);

        f.engine
            .approve_reading(outcome.reading_id(), "admin-1", f.now)
            .unwrap();
        assert_eq!(f.engine.pending_count_for_cycle(july.id), 0);
    }
}
