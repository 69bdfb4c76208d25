//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for domain types that give
//! more meaningful error messages than standard assertions.

use chrono::NaiveDate;
use core_kernel::{DateRange, Money, Volume, VolumeDelta, VOLUME_SCALE};
use rust_decimal::Decimal;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Arguments
///
/// * `actual` - The actual Money value
/// * `expected` - The expected Money value
/// * `tolerance` - The allowed difference in the amount
///
/// # Panics
///
/// Panics if the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts that a Money value is positive
pub fn assert_money_positive(money: &Money) {
    assert!(
        money.is_positive(),
        "Expected positive money, got {}",
        money
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(money.is_zero(), "Expected zero money, got {}", money);
}

/// Asserts that a Money value is negative
pub fn assert_money_negative(money: &Money) {
    assert!(
        money.is_negative(),
        "Expected negative money, got {}",
        money
    );
}

/// Asserts that money values sum to a total
///
/// # Arguments
///
/// * `parts` - The money values that should sum to total
/// * `total` - The expected total
///
/// # Panics
///
/// Panics if the sum doesn't equal the total
pub fn assert_money_sum_equals(parts: &[Money], total: &Money) {
    let sum = parts.iter().fold(Money::zero(), |acc, m| {
        acc.checked_add(m).expect("Overflow in sum")
    });

    assert_eq!(
        sum.amount(),
        total.amount(),
        "Sum of parts ({}) doesn't equal total ({})",
        sum.amount(),
        total.amount()
    );
}

/// Asserts that a counter value carries no more fractional digits
/// than the meter scale
pub fn assert_volume_precise(volume: &Volume) {
    let scale = volume.value().normalize().scale();
    assert!(
        scale <= VOLUME_SCALE,
        "Volume {} exceeds the meter precision of {} decimal places (scale={})",
        volume,
        VOLUME_SCALE,
        scale
    );
}

/// Asserts that a consumption delta is non-negative
pub fn assert_delta_non_negative(delta: &VolumeDelta) {
    assert!(
        !delta.is_negative(),
        "Expected non-negative consumption, got {}",
        delta
    );
}

/// Asserts that a DateRange contains a specific date
pub fn assert_period_contains(period: &DateRange, date: NaiveDate) {
    assert!(
        period.contains(date),
        "Period {:?} does not contain date {}",
        period,
        date
    );
}

/// Asserts that a DateRange does not contain a specific date
pub fn assert_period_excludes(period: &DateRange, date: NaiveDate) {
    assert!(
        !period.contains(date),
        "Period {:?} unexpectedly contains date {}",
        period,
        date
    );
}

/// Asserts that two DateRanges overlap
pub fn assert_periods_overlap(period1: &DateRange, period2: &DateRange) {
    assert!(
        period1.overlaps(period2),
        "Periods {:?} and {:?} do not overlap",
        period1,
        period2
    );
}

/// Asserts that two DateRanges do not overlap
pub fn assert_periods_disjoint(period1: &DateRange, period2: &DateRange) {
    assert!(
        !period1.overlaps(period2),
        "Periods {:?} and {:?} unexpectedly overlap",
        period1,
        period2
    );
}

/// Asserts that a decimal value is within a range
pub fn assert_decimal_in_range(value: Decimal, min: Decimal, max: Decimal) {
    assert!(
        value >= min && value <= max,
        "Decimal {} is not in range [{}, {}]",
        value,
        min,
        max
    );
}

/// Asserts that a decimal value is approximately equal to another
pub fn assert_decimal_approx_eq(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "Decimals differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual,
        expected,
        diff,
        tolerance
    );
}

/// Asserts that a result is Ok and returns the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Asserts that a result is Err and returns the error
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(value) => panic!("{}: got Ok({:?})", $msg, value),
            Err(e) => e,
        }
    };
}

/// Asserts that an error matches a specific variant
#[macro_export]
macro_rules! assert_err_variant {
    ($result:expr, $pattern:pat) => {
        match $result {
            Ok(value) => panic!(
                "Expected Err matching {}, got Ok({:?})",
                stringify!($pattern),
                value
            ),
            Err(ref e) => {
                assert!(
                    matches!(e, $pattern),
                    "Error {:?} does not match pattern {}",
                    e,
                    stringify!($pattern)
                );
            }
        }
    };
}
