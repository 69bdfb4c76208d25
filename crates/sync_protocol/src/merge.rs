//! Client-side merge
//!
//! Download merge policy is server-wins: every cached record is
//! overwritten by the server's copy, and tombstoned records are dropped.
//! The one exception is a local mutation still sitting in the upload
//! queue: its cached record is preserved untouched until the upload
//! resolves into an acceptance, a rejection, or a conflict.

use std::collections::HashMap;

use core_kernel::{AssignmentId, ConflictId, CycleId, ReadingId};
use domain_cycle::BillingCycle;
use domain_metering::{Conflict, MeterAssignment, Reading};

use crate::payload::{BootstrapResponse, DeltaResponse, EntityKind, EntityPayload, Tombstone};
use crate::queue::SyncQueue;

/// The device's disposable cache of server state
///
/// Fully reconstructable from a bootstrap; holds at most the server's
/// working-set window plus local not-yet-uploaded readings.
#[derive(Debug, Default)]
pub struct LocalCache {
    pub cycles: HashMap<CycleId, BillingCycle>,
    pub assignments: HashMap<AssignmentId, MeterAssignment>,
    pub readings: HashMap<ReadingId, Reading>,
    pub conflicts: HashMap<ConflictId, Conflict>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a locally captured reading before upload
    pub fn stage_local_reading(&mut self, reading: Reading) {
        self.readings.insert(reading.id, reading);
    }

    /// Replaces the cache with a bootstrap snapshot
    ///
    /// Local readings whose submission key is still queued survive the
    /// reset; everything else is rebuilt from the server.
    pub fn apply_bootstrap(&mut self, snapshot: BootstrapResponse, queue: &SyncQueue) {
        let kept: Vec<Reading> = self
            .readings
            .values()
            .filter(|r| queue.contains(r.submission_key))
            .cloned()
            .collect();

        self.cycles = snapshot.cycles.into_iter().map(|c| (c.id, c)).collect();
        self.assignments = snapshot
            .assignments
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        self.readings = snapshot.readings.into_iter().map(|r| (r.id, r)).collect();
        self.conflicts = snapshot
            .conflicts
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        for reading in kept {
            self.readings.entry(reading.id).or_insert(reading);
        }
    }

    /// Applies an incremental delta, server-wins
    ///
    /// Each entity write is independently idempotent, so a delta aborted
    /// partway through leaves the cache safe to re-merge.
    pub fn apply_delta(&mut self, delta: DeltaResponse, queue: &SyncQueue) {
        for payload in delta.upserts {
            self.apply_upsert(payload, queue);
        }
        for tombstone in delta.tombstones {
            self.apply_tombstone(&tombstone, queue);
        }
    }

    fn apply_upsert(&mut self, payload: EntityPayload, queue: &SyncQueue) {
        match payload {
            EntityPayload::Cycle(cycle) => {
                self.cycles.insert(cycle.id, cycle);
            }
            EntityPayload::Assignment(assignment) => {
                self.assignments.insert(assignment.id, assignment);
            }
            EntityPayload::Reading(reading) => {
                if self.is_pending_local(reading.id, queue) {
                    return;
                }
                self.readings.insert(reading.id, reading);
            }
            EntityPayload::Conflict(conflict) => {
                self.conflicts.insert(conflict.id, conflict);
            }
        }
    }

    fn apply_tombstone(&mut self, tombstone: &Tombstone, queue: &SyncQueue) {
        match tombstone.kind {
            EntityKind::Cycle => {
                self.cycles.remove(&CycleId::from(tombstone.entity_id));
            }
            EntityKind::Assignment => {
                self.assignments
                    .remove(&AssignmentId::from(tombstone.entity_id));
            }
            EntityKind::Reading => {
                let id = ReadingId::from(tombstone.entity_id);
                if self.is_pending_local(id, queue) {
                    return;
                }
                self.readings.remove(&id);
            }
            EntityKind::Conflict => {
                self.conflicts.remove(&ConflictId::from(tombstone.entity_id));
            }
        }
    }

    fn is_pending_local(&self, id: ReadingId, queue: &SyncQueue) -> bool {
        self.readings
            .get(&id)
            .map(|r| queue.contains(r.submission_key))
            .unwrap_or(false)
    }
}
