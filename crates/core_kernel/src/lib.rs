//! Core kernel for the water billing system
//!
//! Provides the shared vocabulary every domain crate builds on: precise
//! decimal money and volume types, strongly-typed identifiers, temporal
//! utilities with a working-day calendar, and an injectable clock.

pub mod clock;
pub mod error;
pub mod identifiers;
pub mod money;
pub mod temporal;
pub mod volume;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use identifiers::*;
pub use money::{Money, MoneyError, Tariff};
pub use temporal::{
    local_date, local_end_of_day, DateRange, HolidayCalendar, TemporalError,
    WorkingDayPreference, LOCAL_TZ,
};
pub use volume::{
    Volume, VolumeDelta, VolumeError, METER_SCALE_MAX, ROLLOVER_HIGH_WATER, VOLUME_SCALE,
};
