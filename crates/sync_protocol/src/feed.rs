//! Bootstrap and delta assembly
//!
//! The feed reads the server's authoritative state through
//! [`AuthoritativeView`] and packages it for a field device. Bootstrap is
//! the client's whole working set (the most recent cycles, active
//! assignments, approved readings inside that window, unresolved
//! conflicts); delta is everything changed since a checkpoint plus the
//! tombstones for records that left the working set. Both are pure reads,
//! safely re-requestable with the same token.

use chrono::{DateTime, Utc};
use core_kernel::CycleId;
use domain_cycle::BillingCycle;
use domain_metering::{Conflict, MeterAssignment, Reading};

use crate::checkpoint::Checkpoint;
use crate::error::SyncError;
use crate::payload::{
    BootstrapResponse, DeltaResponse, EntityPayload, Tombstone, SCHEMA_VERSION,
};

/// Cycles included in a client's working set, newest first
pub const BOOTSTRAP_CYCLE_WINDOW: usize = 12;

/// Read access to the server's authoritative state
///
/// Implemented by the repository layer on the server and by in-memory
/// fixtures in tests.
pub trait AuthoritativeView {
    /// The most recent `limit` cycles, newest first
    fn recent_cycles(&self, limit: usize) -> Vec<BillingCycle>;

    fn active_assignments(&self) -> Vec<MeterAssignment>;

    /// Approved readings belonging to the given cycles
    fn approved_readings_in(&self, cycles: &[CycleId]) -> Vec<Reading>;

    fn unresolved_conflicts(&self) -> Vec<Conflict>;

    /// Records created or modified after `since`
    fn changed_since(&self, since: DateTime<Utc>) -> Vec<EntityPayload>;

    /// Working-set exits after `since`
    fn tombstones_since(&self, since: DateTime<Utc>) -> Vec<Tombstone>;
}

/// Assembles a full snapshot and the checkpoint to poll from
pub fn bootstrap(view: &dyn AuthoritativeView, now: DateTime<Utc>) -> BootstrapResponse {
    let cycles = view.recent_cycles(BOOTSTRAP_CYCLE_WINDOW);
    let cycle_ids: Vec<CycleId> = cycles.iter().map(|c| c.id).collect();
    let readings = view.approved_readings_in(&cycle_ids);

    tracing::debug!(
        cycles = cycles.len(),
        readings = readings.len(),
        "assembled bootstrap snapshot"
    );

    BootstrapResponse {
        schema_version: SCHEMA_VERSION,
        assignments: view.active_assignments(),
        conflicts: view.unresolved_conflicts(),
        cycles,
        readings,
        checkpoint: Checkpoint::at(now).encode(),
    }
}

/// Assembles the delta since a client-supplied checkpoint token
///
/// An undecodable token surfaces as [`SyncError::CheckpointInvalid`]; the
/// client reacts by running [`bootstrap`] again.
pub fn delta(
    view: &dyn AuthoritativeView,
    token: &str,
    now: DateTime<Utc>,
) -> Result<DeltaResponse, SyncError> {
    let checkpoint = Checkpoint::decode(token)?;

    Ok(DeltaResponse {
        schema_version: SCHEMA_VERSION,
        upserts: view.changed_since(checkpoint.since),
        tombstones: view.tombstones_since(checkpoint.since),
        checkpoint: Checkpoint::at(now).encode(),
    })
}
