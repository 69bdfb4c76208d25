//! Consumption assessment
//!
//! Pure functions classifying a submitted counter value against the
//! previous approved value on the same assignment. Consumption never
//! crosses assignment boundaries.

use core_kernel::{Volume, VolumeDelta};
use serde::{Deserialize, Serialize};

/// Outcome of comparing a submission against its anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumptionAssessment {
    /// First reading on the assignment: zero consumption, becomes anchor
    Baseline,
    /// Ordinary forward movement of the counter
    Normal(VolumeDelta),
    /// Counter moved backwards from the high-water band: likely a wrap.
    /// Routed to manual verification, never auto-approved.
    SuspectedRollover,
    /// Counter moved backwards outside the rollover band. Logged as an
    /// anomaly; billing proceeds on the raw delta unless an operator
    /// intervenes.
    NegativeAnomaly(VolumeDelta),
}

/// Verifier's verdict on a suspected rollover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RolloverVerdict {
    /// The counter genuinely wrapped: consumption spans the scale maximum
    GenuineRollover,
    /// The meter is faulty: the reading is rejected, resubmission required
    MeterFault,
}

/// Classifies a submitted value against the previous approved value
pub fn assess_consumption(
    current: Volume,
    previous: Option<Volume>,
) -> ConsumptionAssessment {
    let Some(previous) = previous else {
        return ConsumptionAssessment::Baseline;
    };

    let delta = current.delta_from(previous);
    if !delta.is_negative() {
        return ConsumptionAssessment::Normal(delta);
    }

    if previous.is_near_rollover() {
        ConsumptionAssessment::SuspectedRollover
    } else {
        ConsumptionAssessment::NegativeAnomaly(delta)
    }
}

/// Consumption for a verified genuine rollover:
/// `(scale_max - previous) + current`
pub fn rollover_consumption(current: Volume, previous: Volume) -> VolumeDelta {
    Volume::rollover_consumption(current, previous)
}
