//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use core_kernel::{
    AssignmentId, ClientId, CycleId, DateRange, MeterId, Money, Volume, ROLLOVER_HIGH_WATER,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating valid counter values across the full meter scale
pub fn volume_strategy() -> impl Strategy<Value = Volume> {
    (0i64..1_000_000_000i64)
        .prop_map(|units| Volume::new(Decimal::new(units, 4)).expect("generated invalid volume"))
}

/// Strategy for counter values inside the rollover high-water band
pub fn high_water_volume_strategy() -> impl Strategy<Value = Volume> {
    (900_000_000i64..1_000_000_000i64)
        .prop_map(|units| Volume::new(Decimal::new(units, 4)).expect("generated invalid volume"))
}

/// Strategy for counter values safely below the high-water band
pub fn low_volume_strategy() -> impl Strategy<Value = Volume> {
    (0i64..900_000_000i64)
        .prop_map(|units| Volume::new(Decimal::new(units, 4)).expect("generated invalid volume"))
}

/// Strategy for generating positive amounts in whole shillings
pub fn positive_amount_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

/// Strategy for generating positive Money values
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_strategy().prop_map(|amount| Money::new(Decimal::new(amount, 0)))
}

/// Strategy for generating Money values (can be negative)
pub fn money_strategy() -> impl Strategy<Value = Money> {
    (-100_000_000i64..100_000_000i64).prop_map(|amount| Money::new(Decimal::new(amount, 0)))
}

/// Strategy for generating per-cubic-metre tariff rates
pub fn tariff_rate_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..5_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Strategy for generating valid timestamps within 2025
pub fn timestamp_2025_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..365i64, 0i64..86_400i64).prop_map(|(days, secs)| {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + Duration::days(days)
            + Duration::seconds(secs)
    })
}

/// Strategy for generating a calendar-month billing period in 2025
pub fn month_period_strategy() -> impl Strategy<Value = DateRange> {
    (1u32..=12u32).prop_map(|month| {
        let start = NaiveDate::from_ymd_opt(2025, month, 1).unwrap();
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        } else {
            NaiveDate::from_ymd_opt(2025, month + 1, 1).unwrap()
        }
        .pred_opt()
        .unwrap();
        DateRange::new(start, end).expect("generated invalid period")
    })
}

/// Strategy for generating valid date ranges (start on or before end)
pub fn date_range_strategy() -> impl Strategy<Value = DateRange> {
    (0i64..365i64, 0i64..365i64).prop_map(|(start_days, duration_days)| {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(start_days);
        let end = start + Duration::days(duration_days);
        DateRange::new(start, end).expect("generated invalid period")
    })
}

/// Strategy for generating MeterId
pub fn meter_id_strategy() -> impl Strategy<Value = MeterId> {
    any::<[u8; 16]>().prop_map(|bytes| MeterId::from(uuid::Uuid::from_bytes(bytes)))
}

/// Strategy for generating ClientId
pub fn client_id_strategy() -> impl Strategy<Value = ClientId> {
    any::<[u8; 16]>().prop_map(|bytes| ClientId::from(uuid::Uuid::from_bytes(bytes)))
}

/// Strategy for generating AssignmentId
pub fn assignment_id_strategy() -> impl Strategy<Value = AssignmentId> {
    any::<[u8; 16]>().prop_map(|bytes| AssignmentId::from(uuid::Uuid::from_bytes(bytes)))
}

/// Strategy for generating CycleId
pub fn cycle_id_strategy() -> impl Strategy<Value = CycleId> {
    any::<[u8; 16]>().prop_map(|bytes| CycleId::from(uuid::Uuid::from_bytes(bytes)))
}

/// Strategy for generating Tanzanian-format phone numbers
pub fn phone_strategy() -> impl Strategy<Value = String> {
    (0u32..10_000_000u32).prop_map(|digits| format!("+2557{digits:08}"))
}

/// Strategy for generating collector usernames
pub fn collector_strategy() -> impl Strategy<Value = String> {
    (1u32..100u32).prop_map(|n| format!("collector-{n}"))
}
