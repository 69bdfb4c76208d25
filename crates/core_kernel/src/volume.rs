//! Volumetric reading types
//!
//! Meter counters report absolute cubic-metre values with four fractional
//! digits on a 99,999.9999 scale. All consumption arithmetic happens on
//! these fixed-point values; floating point never crosses a billing
//! boundary.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use thiserror::Error;

/// Number of fractional digits on a meter counter.
pub const VOLUME_SCALE: u32 = 4;

/// Maximum representable counter value before the counter wraps.
pub const METER_SCALE_MAX: Decimal = dec!(99_999.9999);

/// Counter values at or above this threshold make a backwards step a
/// rollover suspect rather than a plain negative delta.
pub const ROLLOVER_HIGH_WATER: Decimal = dec!(90_000);

/// Errors for volume construction
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VolumeError {
    #[error("Volume {0} exceeds the meter scale maximum {METER_SCALE_MAX}")]
    ExceedsScale(Decimal),

    #[error("Volume {0} carries more than {VOLUME_SCALE} fractional digits")]
    ExcessPrecision(Decimal),

    #[error("Volume must not be negative, got {0}")]
    Negative(Decimal),
}

/// An absolute counter value or a consumption delta, in cubic metres
///
/// Construction validates the meter scale; deltas produced by subtraction
/// may be negative and are represented by [`VolumeDelta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(Decimal);

impl Volume {
    /// Creates a counter value, validating scale and precision
    pub fn new(value: Decimal) -> Result<Self, VolumeError> {
        if value.is_sign_negative() {
            return Err(VolumeError::Negative(value));
        }
        if value > METER_SCALE_MAX {
            return Err(VolumeError::ExceedsScale(value));
        }
        if value.scale() > VOLUME_SCALE && value.normalize().scale() > VOLUME_SCALE {
            return Err(VolumeError::ExcessPrecision(value));
        }
        Ok(Self(value.round_dp(VOLUME_SCALE)))
    }

    /// Zero volume
    pub fn zero() -> Self {
        Self(dec!(0))
    }

    /// Returns the inner decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True if this counter value sits in the rollover high-water band
    pub fn is_near_rollover(&self) -> bool {
        self.0 >= ROLLOVER_HIGH_WATER
    }

    /// Signed difference between two counter values
    pub fn delta_from(&self, previous: Volume) -> VolumeDelta {
        VolumeDelta(self.0 - previous.0)
    }

    /// Consumption across a confirmed counter wrap
    ///
    /// consumption = (scale_max - previous) + current
    pub fn rollover_consumption(current: Volume, previous: Volume) -> VolumeDelta {
        VolumeDelta((METER_SCALE_MAX - previous.0) + current.0)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} m3", self.0)
    }
}

/// A signed consumption amount in cubic metres
///
/// Deltas are not bounded by the counter scale: a rollover consumption can
/// legitimately exceed a single counter span, and a negative delta is a
/// recordable anomaly rather than an invalid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeDelta(Decimal);

impl VolumeDelta {
    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp(VOLUME_SCALE))
    }

    pub fn zero() -> Self {
        Self(dec!(0))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
}

impl fmt::Display for VolumeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} m3", self.0)
    }
}

impl Add for VolumeDelta {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for VolumeDelta {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_validation() {
        assert!(Volume::new(dec!(120.0000)).is_ok());
        assert!(Volume::new(dec!(99_999.9999)).is_ok());
        assert!(matches!(
            Volume::new(dec!(100_000.0000)),
            Err(VolumeError::ExceedsScale(_))
        ));
        assert!(matches!(
            Volume::new(dec!(-1)),
            Err(VolumeError::Negative(_))
        ));
    }

    #[test]
    fn test_delta() {
        let previous = Volume::new(dec!(120.0000)).unwrap();
        let current = Volume::new(dec!(150.0000)).unwrap();

        assert_eq!(current.delta_from(previous).value(), dec!(30.0000));
        assert!(previous.delta_from(current).is_negative());
    }

    #[test]
    fn test_rollover_consumption() {
        let previous = Volume::new(dec!(99_000.0000)).unwrap();
        let current = Volume::new(dec!(500.0000)).unwrap();

        let consumption = Volume::rollover_consumption(current, previous);
        assert_eq!(consumption.value(), dec!(1_499.9999));
    }

    #[test]
    fn test_high_water_band() {
        assert!(Volume::new(dec!(90_000.0000)).unwrap().is_near_rollover());
        assert!(Volume::new(dec!(99_999.9999)).unwrap().is_near_rollover());
        assert!(!Volume::new(dec!(89_999.9999)).unwrap().is_near_rollover());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn rollover_consumption_is_positive(
            prev in 900_000_000i64..999_999_999i64,
            cur in 0i64..500_000_000i64
        ) {
            let previous = Volume::new(Decimal::new(prev, 4)).unwrap();
            let current = Volume::new(Decimal::new(cur, 4)).unwrap();
            prop_assert!(Volume::rollover_consumption(current, previous).is_positive());
        }

        #[test]
        fn delta_antisymmetry(a in 0i64..999_999_999i64, b in 0i64..999_999_999i64) {
            let va = Volume::new(Decimal::new(a, 4)).unwrap();
            let vb = Volume::new(Decimal::new(b, 4)).unwrap();
            prop_assert_eq!(va.delta_from(vb).value(), -vb.delta_from(va).value());
        }
    }
}
