//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, Utc};
use core_kernel::{AssignmentId, ClientId, CycleId, Money, SubmissionKey, Volume};
use domain_metering::{ReadingSource, SubmitReading};

use crate::fixtures::{IdFixtures, MoneyFixtures, StringFixtures, TemporalFixtures, VolumeFixtures};

/// Builder for submission commands
///
/// Defaults to a field capture of a normal counter value against fresh
/// assignment and cycle ids, which matches the common unit-test setup of
/// one assignment in one open cycle.
pub struct SubmitReadingBuilder {
    submission_key: SubmissionKey,
    assignment_id: AssignmentId,
    cycle_id: CycleId,
    value: Volume,
    submitted_by: String,
    source: ReadingSource,
    note: Option<String>,
    allow_late: bool,
    expected_version: Option<u64>,
}

impl Default for SubmitReadingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmitReadingBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        Self {
            submission_key: SubmissionKey::new(),
            assignment_id: IdFixtures::assignment_id(),
            cycle_id: IdFixtures::cycle_id(),
            value: VolumeFixtures::after_one_month(),
            submitted_by: StringFixtures::collector(),
            source: ReadingSource::Capture,
            note: None,
            allow_late: false,
            expected_version: None,
        }
    }

    /// Sets the idempotency key
    pub fn with_submission_key(mut self, key: SubmissionKey) -> Self {
        self.submission_key = key;
        self
    }

    /// Sets the assignment the reading belongs to
    pub fn with_assignment_id(mut self, id: AssignmentId) -> Self {
        self.assignment_id = id;
        self
    }

    /// Sets the cycle the reading belongs to
    pub fn with_cycle_id(mut self, id: CycleId) -> Self {
        self.cycle_id = id;
        self
    }

    /// Sets the counter value
    pub fn with_value(mut self, value: Volume) -> Self {
        self.value = value;
        self
    }

    /// Sets who captured the reading
    pub fn with_submitted_by(mut self, submitted_by: impl Into<String>) -> Self {
        self.submitted_by = submitted_by.into();
        self
    }

    /// Marks the submission as arriving through device sync
    pub fn from_sync(mut self) -> Self {
        self.source = ReadingSource::Sync;
        self
    }

    /// Attaches a free-text note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Admits the submission past the cycle window
    pub fn allowing_late(mut self) -> Self {
        self.allow_late = true;
        self
    }

    /// Sets the slot version the caller observed
    pub fn with_expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Builds the submission command
    pub fn build(self) -> SubmitReading {
        SubmitReading {
            submission_key: self.submission_key,
            assignment_id: self.assignment_id,
            cycle_id: self.cycle_id,
            value: self.value,
            submitted_by: self.submitted_by,
            source: self.source,
            note: self.note,
            allow_late: self.allow_late,
            expected_version: self.expected_version,
        }
    }
}

/// Builder for constructing test payment data
pub struct TestPaymentDataBuilder {
    key: SubmissionKey,
    client_id: ClientId,
    amount: Money,
    received_from: String,
    recorded_by: String,
    received_at: DateTime<Utc>,
}

impl Default for TestPaymentDataBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPaymentDataBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        Self {
            key: SubmissionKey::new(),
            client_id: IdFixtures::client_id(),
            amount: MoneyFixtures::tzs_20_000(),
            received_from: StringFixtures::person_name(),
            recorded_by: StringFixtures::collector(),
            received_at: TemporalFixtures::mid_june(),
        }
    }

    /// Sets the idempotency key
    pub fn with_key(mut self, key: SubmissionKey) -> Self {
        self.key = key;
        self
    }

    /// Sets the paying client
    pub fn with_client_id(mut self, id: ClientId) -> Self {
        self.client_id = id;
        self
    }

    /// Sets the payment amount
    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    /// Sets the payer name
    pub fn with_received_from(mut self, name: impl Into<String>) -> Self {
        self.received_from = name.into();
        self
    }

    /// Sets the recording collector
    pub fn with_recorded_by(mut self, name: impl Into<String>) -> Self {
        self.recorded_by = name.into();
        self
    }

    /// Sets the receipt instant
    pub fn with_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }

    /// Builds the test payment data
    pub fn build(self) -> TestPaymentData {
        TestPaymentData {
            key: self.key,
            client_id: self.client_id,
            amount: self.amount,
            received_from: self.received_from,
            recorded_by: self.recorded_by,
            received_at: self.received_at,
        }
    }
}

/// Test payment data structure
///
/// Field-for-field arguments of `LedgerBook::record_payment`, bundled so a
/// test can thread one value through setup and assertions.
#[derive(Debug, Clone)]
pub struct TestPaymentData {
    pub key: SubmissionKey,
    pub client_id: ClientId,
    pub amount: Money,
    pub received_from: String,
    pub recorded_by: String,
    pub received_at: DateTime<Utc>,
}
