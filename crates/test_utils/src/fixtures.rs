//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common entities across the billing
//! system. These fixtures are designed to be consistent and predictable
//! for unit tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{
    AssignmentId, ClientId, CycleId, DateRange, MeterId, Money, ReadingId, SubmissionKey, Volume,
};
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// A standard charge-sized amount
    pub fn tzs_30_000() -> Money {
        Money::new(dec!(30000.00))
    }

    /// A typical field payment
    pub fn tzs_20_000() -> Money {
        Money::new(dec!(20000.00))
    }

    /// A typical penalty amount
    pub fn tzs_5_000() -> Money {
        Money::new(dec!(5000.00))
    }

    pub fn zero() -> Money {
        Money::zero()
    }
}

/// Fixture for meter counter values
pub struct VolumeFixtures;

impl VolumeFixtures {
    /// A fresh meter's first counter value
    pub fn baseline() -> Volume {
        Volume::new(dec!(100.0000)).expect("fixture volume is valid")
    }

    /// One month of normal household consumption past the baseline
    pub fn after_one_month() -> Volume {
        Volume::new(dec!(130.0000)).expect("fixture volume is valid")
    }

    /// A counter deep in the rollover high-water band
    pub fn near_rollover() -> Volume {
        Volume::new(dec!(99_000.0000)).expect("fixture volume is valid")
    }

    /// A counter value just after a wrap
    pub fn post_rollover() -> Volume {
        Volume::new(dec!(500.0000)).expect("fixture volume is valid")
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// A mid-period instant inside the June 2025 cycle
    pub fn mid_june() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap()
    }

    /// An instant past the June cycle's submission window and grace
    pub fn after_june_window() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 12, 9, 0, 0).unwrap()
    }

    /// The June 2025 billing period
    pub fn june_period() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        )
        .expect("fixture period is valid")
    }

    /// The July 2025 billing period
    pub fn july_period() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 31).unwrap(),
        )
        .expect("fixture period is valid")
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    pub fn meter_id() -> MeterId {
        MeterId::new()
    }

    pub fn client_id() -> ClientId {
        ClientId::new()
    }

    pub fn assignment_id() -> AssignmentId {
        AssignmentId::new()
    }

    pub fn cycle_id() -> CycleId {
        CycleId::new_v7()
    }

    pub fn reading_id() -> ReadingId {
        ReadingId::new_v7()
    }

    pub fn submission_key() -> SubmissionKey {
        SubmissionKey::new()
    }
}

/// Fixture for human-shaped string data
pub struct StringFixtures;

impl StringFixtures {
    /// A random Tanzanian-format mobile number
    pub fn phone_number() -> String {
        let digits: u32 = (0..10_000_000).fake();
        format!("+2557{digits:08}")
    }

    /// A random person name for payer/collector fields
    pub fn person_name() -> String {
        Name().fake()
    }

    /// A random gateway-style phone number (locale-generic)
    pub fn gateway_number() -> String {
        PhoneNumber().fake()
    }

    pub fn collector() -> String {
        "collector-1".to_string()
    }

    pub fn admin() -> String {
        "admin-1".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_numbers_have_the_tz_prefix() {
        let number = StringFixtures::phone_number();
        assert!(number.starts_with("+2557"));
        assert_eq!(number.len(), 13);
    }

    #[test]
    fn test_periods_abut() {
        assert!(TemporalFixtures::june_period().abuts(&TemporalFixtures::july_period()));
    }
}
