//! Scenario tests for the metering engine

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal_macros::dec;

use core_kernel::{MeterId, SubmissionKey, Volume};
use domain_cycle::{BillingCycle, SubmissionWindow};
use domain_metering::{
    MeteringConfig, MeteringEngine, MeteringError, ReadingStatus, ResolutionDecision,
    RolloverVerdict, SubmissionOutcome,
};

use test_utils::{
    assert_err_variant, assert_ok, IdFixtures, SubmitReadingBuilder, TemporalFixtures,
    VolumeFixtures,
};

fn engine() -> MeteringEngine {
    MeteringEngine::new(MeteringConfig::default())
}

fn june_cycle() -> BillingCycle {
    BillingCycle::open(
        TemporalFixtures::june_period(),
        SubmissionWindow::new(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(), 2),
        TemporalFixtures::mid_june() - Duration::days(10),
    )
}

fn july_cycle() -> BillingCycle {
    BillingCycle::open(
        TemporalFixtures::july_period(),
        SubmissionWindow::new(NaiveDate::from_ymd_opt(2025, 8, 5).unwrap(), 2),
        TemporalFixtures::mid_june() + Duration::days(21),
    )
}

fn active_assignment() -> domain_metering::MeterAssignment {
    domain_metering::MeterAssignment::start(
        MeterId::new(),
        IdFixtures::client_id(),
        TemporalFixtures::mid_june() - Duration::days(5),
    )
}

#[test]
fn test_first_reading_anchors_as_baseline() {
    let mut engine = engine();
    let assignment = active_assignment();
    let cycle = june_cycle();
    let now = TemporalFixtures::mid_june();

    let cmd = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .with_value(VolumeFixtures::baseline())
        .build();
    let outcome = assert_ok!(engine.submit(cmd, &assignment, &cycle, now));

    let id = match outcome {
        SubmissionOutcome::Baseline(id) => id,
        other => panic!("expected baseline, got {other:?}"),
    };
    let reading = engine.reading(id).unwrap();
    assert!(reading.is_approved());
    assert!(reading.consumption.unwrap().is_zero());
    assert_eq!(
        engine.latest_approved_value(assignment.id),
        Some(VolumeFixtures::baseline())
    );
}

#[test]
fn test_consumption_is_delta_from_the_approved_anchor() {
    let mut engine = engine();
    let assignment = active_assignment();
    let june = june_cycle();
    let july = july_cycle();
    let now = TemporalFixtures::mid_june();

    let baseline = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(june.id)
        .with_value(VolumeFixtures::baseline())
        .build();
    assert_ok!(engine.submit(baseline, &assignment, &june, now));

    let later = now + Duration::days(30);
    let cmd = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(july.id)
        .with_value(VolumeFixtures::after_one_month())
        .build();
    let outcome = assert_ok!(engine.submit(cmd, &assignment, &july, later));
    let id = match outcome {
        SubmissionOutcome::Accepted(id) => id,
        other => panic!("expected accepted, got {other:?}"),
    };

    let approved = assert_ok!(engine.approve_reading(id, "admin-1", later));
    assert_eq!(approved.consumption.unwrap().value(), dec!(30.0000));
}

#[test]
fn test_replay_by_key_collapses_onto_the_stored_reading() {
    let mut engine = engine();
    let assignment = active_assignment();
    let cycle = june_cycle();
    let now = TemporalFixtures::mid_june();

    let key = SubmissionKey::new();
    let cmd = SubmitReadingBuilder::new()
        .with_submission_key(key)
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .with_value(VolumeFixtures::baseline())
        .build();
    let first = assert_ok!(engine.submit(cmd.clone(), &assignment, &cycle, now));
    let second = assert_ok!(engine.submit(cmd, &assignment, &cycle, now));
    assert_eq!(second, SubmissionOutcome::Replayed(first.reading_id()));
}

#[test]
fn test_conflicted_key_replays_as_the_same_open_conflict() {
    let mut engine = engine();
    let assignment = active_assignment();
    let cycle = june_cycle();
    let now = TemporalFixtures::mid_june();

    let baseline = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .with_value(VolumeFixtures::baseline())
        .build();
    assert_ok!(engine.submit(baseline, &assignment, &cycle, now));

    let competing = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .with_value(VolumeFixtures::after_one_month())
        .build();
    let first = assert_ok!(engine.submit(competing.clone(), &assignment, &cycle, now));
    let replay = assert_ok!(engine.submit(competing, &assignment, &cycle, now));
    assert_eq!(replay, first);
    let conflicted = matches!(&replay, SubmissionOutcome::Conflicted { .. });
    assert!(conflicted, "expected a conflict, got {replay:?}");
}

#[test]
fn test_identical_value_under_a_new_key_replays() {
    let mut engine = engine();
    let assignment = active_assignment();
    let cycle = june_cycle();
    let now = TemporalFixtures::mid_june();

    let make = || {
        SubmitReadingBuilder::new()
            .with_assignment_id(assignment.id)
            .with_cycle_id(cycle.id)
            .with_value(VolumeFixtures::baseline())
            .build()
    };
    let first = assert_ok!(engine.submit(make(), &assignment, &cycle, now));
    let second = assert_ok!(engine.submit(make(), &assignment, &cycle, now));

    assert!(matches!(second, SubmissionOutcome::Replayed(id) if id == first.reading_id()));
}

#[test]
fn test_competing_value_opens_a_conflict_and_resolution_selects_a_winner() {
    let mut engine = engine();
    let assignment = active_assignment();
    let cycle = june_cycle();
    let now = TemporalFixtures::mid_june();

    let first = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .with_value(Volume::new(dec!(100)).unwrap())
        .build();
    let first = assert_ok!(engine.submit(first, &assignment, &cycle, now));

    let second = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .with_value(Volume::new(dec!(105)).unwrap())
        .build();
    let outcome = assert_ok!(engine.submit(second, &assignment, &cycle, now));

    let (reading_id, conflict_id) = match outcome {
        SubmissionOutcome::Conflicted {
            reading_id,
            conflict_id,
        } => (reading_id, conflict_id),
        other => panic!("expected conflict, got {other:?}"),
    };
    assert_eq!(engine.open_conflicts().count(), 1);

    let resolution = assert_ok!(engine.resolve(
        conflict_id,
        ResolutionDecision::AcceptSecond,
        "admin-1",
        "second capture re-checked on site",
        now + Duration::hours(1),
    ));
    assert_eq!(resolution.selected_value, Volume::new(dec!(105)).unwrap());
    assert_eq!(resolution.winning_reading, reading_id);

    let winner = engine.reading(reading_id).unwrap();
    assert!(winner.is_approved());
    let loser = engine.reading(first.reading_id()).unwrap();
    assert!(loser.is_rejected());
    assert_eq!(engine.open_conflicts().count(), 0);
}

#[test]
fn test_suspected_rollover_is_held_until_verified() {
    let mut engine = engine();
    let assignment = active_assignment();
    let june = june_cycle();
    let july = july_cycle();
    let now = TemporalFixtures::mid_june();

    let anchor = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(june.id)
        .with_value(VolumeFixtures::near_rollover())
        .build();
    assert_ok!(engine.submit(anchor, &assignment, &june, now));

    let later = now + Duration::days(30);
    let wrapped = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(july.id)
        .with_value(VolumeFixtures::post_rollover())
        .build();
    let outcome = assert_ok!(engine.submit(wrapped, &assignment, &july, later));
    let id = match outcome {
        SubmissionOutcome::PendingRollover(id) => id,
        other => panic!("expected pending rollover, got {other:?}"),
    };

    assert_err_variant!(
        engine.approve_reading(id, "admin-1", later),
        MeteringError::RolloverPendingVerification(_)
    );

    let verified = assert_ok!(engine.verify_rollover(
        id,
        RolloverVerdict::GenuineRollover,
        "admin-1",
        later
    ));
    assert!(verified.is_approved());
    // (99_999.9999 - 99_000) + 500
    assert_eq!(verified.consumption.unwrap().value(), dec!(1499.9999));
}

#[test]
fn test_meter_fault_verdict_rejects_the_reading() {
    let mut engine = engine();
    let assignment = active_assignment();
    let june = june_cycle();
    let july = july_cycle();
    let now = TemporalFixtures::mid_june();

    let anchor = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(june.id)
        .with_value(VolumeFixtures::near_rollover())
        .build();
    assert_ok!(engine.submit(anchor, &assignment, &june, now));

    let later = now + Duration::days(30);
    let wrapped = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(july.id)
        .with_value(VolumeFixtures::post_rollover())
        .build();
    let outcome = assert_ok!(engine.submit(wrapped, &assignment, &july, later));
    let id = outcome.reading_id();

    let rejected = assert_ok!(engine.verify_rollover(
        id,
        RolloverVerdict::MeterFault,
        "admin-1",
        later
    ));
    assert!(matches!(rejected.status, ReadingStatus::Rejected { .. }));
}

#[test]
fn test_stale_slot_version_is_refused() {
    let mut engine = engine();
    let assignment = active_assignment();
    let cycle = june_cycle();
    let now = TemporalFixtures::mid_june();

    let cmd = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .with_value(VolumeFixtures::baseline())
        .with_expected_version(7)
        .build();
    assert_err_variant!(
        engine.submit(cmd, &assignment, &cycle, now),
        MeteringError::VersionMismatch { expected: 7, .. }
    );
}

#[test]
fn test_ended_assignment_refuses_submissions() {
    let mut engine = engine();
    let mut assignment = active_assignment();
    let cycle = june_cycle();
    let now = TemporalFixtures::mid_june();
    assignment.end(now);

    let cmd = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .build();
    assert_err_variant!(
        engine.submit(cmd, &assignment, &cycle, now),
        MeteringError::AssignmentInactive(_)
    );
}

#[test]
fn test_late_submission_needs_the_override() {
    let mut engine = engine();
    let assignment = active_assignment();
    let cycle = june_cycle();
    // Window closes 2025-07-06, grace 3 days: the 12th is out.
    let late = TemporalFixtures::after_june_window();

    let cmd = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .build();
    assert_err_variant!(
        engine.submit(cmd, &assignment, &cycle, late),
        MeteringError::LateSubmission { .. }
    );

    let with_override = SubmitReadingBuilder::new()
        .with_assignment_id(assignment.id)
        .with_cycle_id(cycle.id)
        .allowing_late()
        .build();
    assert_ok!(engine.submit(with_override, &assignment, &cycle, late));
}

proptest! {
    #[test]
    fn any_two_differing_values_on_a_slot_conflict(
        first in test_utils::low_volume_strategy(),
        second in test_utils::low_volume_strategy(),
    ) {
        prop_assume!(first != second);

        let mut engine = engine();
        let assignment = active_assignment();
        let cycle = june_cycle();
        let now = TemporalFixtures::mid_june();

        let a = SubmitReadingBuilder::new()
            .with_assignment_id(assignment.id)
            .with_cycle_id(cycle.id)
            .with_value(first)
            .build();
        engine.submit(a, &assignment, &cycle, now).unwrap();

        let b = SubmitReadingBuilder::new()
            .with_assignment_id(assignment.id)
            .with_cycle_id(cycle.id)
            .with_value(second)
            .build();
        let outcome = engine.submit(b, &assignment, &cycle, now).unwrap();
        let conflicted = matches!(&outcome, SubmissionOutcome::Conflicted { .. });
        prop_assert!(conflicted, "expected a conflict, got {:?}", outcome);
    }
}
