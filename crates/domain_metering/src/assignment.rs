//! Meter assignments
//!
//! An assignment links one meter to one client for a span of time. The
//! book enforces the core invariant: at most one ACTIVE assignment per
//! meter at any instant. Reassignment ends the old assignment; nothing is
//! ever deleted.

use chrono::{DateTime, Utc};
use core_kernel::{AssignmentId, ClientId, MeterId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::MeteringError;

/// Assignment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Active,
    Ended,
}

/// The link between one meter and one client for a time span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterAssignment {
    pub id: AssignmentId,
    pub meter_id: MeterId,
    pub client_id: ClientId,
    pub status: AssignmentStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MeterAssignment {
    pub fn start(meter_id: MeterId, client_id: ClientId, now: DateTime<Utc>) -> Self {
        Self {
            id: AssignmentId::new_v7(),
            meter_id,
            client_id,
            status: AssignmentStatus::Active,
            started_at: now,
            ended_at: None,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }

    /// Ends the assignment. Ended assignments are retained for history.
    pub fn end(&mut self, now: DateTime<Utc>) {
        self.status = AssignmentStatus::Ended;
        self.ended_at = Some(now);
        self.updated_at = now;
    }
}

/// Registry of assignments with the one-active-per-meter invariant
#[derive(Debug, Clone, Default)]
pub struct AssignmentBook {
    assignments: HashMap<AssignmentId, MeterAssignment>,
    active_by_meter: HashMap<MeterId, AssignmentId>,
}

impl AssignmentBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a meter to a client, ending any active assignment first
    pub fn assign(
        &mut self,
        meter_id: MeterId,
        client_id: ClientId,
        now: DateTime<Utc>,
    ) -> AssignmentId {
        if let Some(previous_id) = self.active_by_meter.remove(&meter_id) {
            if let Some(previous) = self.assignments.get_mut(&previous_id) {
                previous.end(now);
                tracing::info!(
                    assignment = %previous_id,
                    meter = %meter_id,
                    "ended assignment on reassignment"
                );
            }
        }

        let assignment = MeterAssignment::start(meter_id, client_id, now);
        let id = assignment.id;
        self.active_by_meter.insert(meter_id, id);
        self.assignments.insert(id, assignment);
        tracing::info!(assignment = %id, meter = %meter_id, client = %client_id, "meter assigned");
        id
    }

    /// Ends an active assignment without replacing it
    pub fn end_assignment(
        &mut self,
        id: AssignmentId,
        now: DateTime<Utc>,
    ) -> Result<(), MeteringError> {
        let assignment = self
            .assignments
            .get_mut(&id)
            .ok_or(MeteringError::AssignmentNotFound(id))?;

        if !assignment.is_active() {
            return Err(MeteringError::AssignmentInactive(id));
        }

        self.active_by_meter.remove(&assignment.meter_id);
        assignment.end(now);
        Ok(())
    }

    pub fn get(&self, id: AssignmentId) -> Result<&MeterAssignment, MeteringError> {
        self.assignments
            .get(&id)
            .ok_or(MeteringError::AssignmentNotFound(id))
    }

    pub fn active_for_meter(&self, meter_id: MeterId) -> Result<&MeterAssignment, MeteringError> {
        self.active_by_meter
            .get(&meter_id)
            .and_then(|id| self.assignments.get(id))
            .ok_or(MeteringError::NoActiveAssignment(meter_id))
    }

    pub fn active(&self) -> impl Iterator<Item = &MeterAssignment> {
        self.assignments.values().filter(|a| a.is_active())
    }

    pub fn all(&self) -> impl Iterator<Item = &MeterAssignment> {
        self.assignments.values()
    }

    pub fn changed_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &MeterAssignment> {
        self.assignments
            .values()
            .filter(move |a| a.updated_at > since)
    }
}
