//! Metering domain errors

use chrono::NaiveDate;
use core_kernel::{AnomalyId, AssignmentId, ConflictId, CycleId, MeterId, ReadingId};
use domain_cycle::CycleStatus;
use thiserror::Error;

use crate::reading::ReadingStatus;

/// Errors raised by assignment, reading, and conflict operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeteringError {
    #[error("Meter assignment {0} not found")]
    AssignmentNotFound(AssignmentId),

    #[error("Meter assignment {0} is not active")]
    AssignmentInactive(AssignmentId),

    #[error("Meter {0} has no active assignment")]
    NoActiveAssignment(MeterId),

    #[error("Submission for cycle {cycle} is late: window plus grace closed on {grace_ends}")]
    LateSubmission {
        cycle: CycleId,
        grace_ends: NaiveDate,
    },

    #[error("Cycle {cycle} no longer accepts submissions (status {status})")]
    CycleNotAccepting { cycle: CycleId, status: CycleStatus },

    #[error("Reading {0} not found")]
    ReadingNotFound(ReadingId),

    #[error("Reading {id} is {status:?} and cannot be modified")]
    ReadingImmutable { id: ReadingId, status: ReadingStatus },

    #[error("Reading {0} is not awaiting rollover verification")]
    NotPendingRollover(ReadingId),

    #[error("Reading {0} is a suspected rollover and must be verified, not approved")]
    RolloverPendingVerification(ReadingId),

    #[error("Reading {0} is locked by an open conflict")]
    ReadingConflicted(ReadingId),

    #[error("Conflict {0} not found")]
    ConflictNotFound(ConflictId),

    #[error("Anomaly {0} not found")]
    AnomalyNotFound(AnomalyId),

    #[error("Conflict {0} is already resolved")]
    ConflictAlreadyResolved(ConflictId),

    #[error("A justification note is required for this action")]
    InsufficientJustification,

    #[error("Stale write for ({assignment}, {cycle}): expected version {expected}, found {actual}")]
    VersionMismatch {
        assignment: AssignmentId,
        cycle: CycleId,
        expected: u64,
        actual: u64,
    },
}
