//! Metering Domain
//!
//! Everything between a field collector's counter photo and an approved,
//! billable consumption figure:
//!
//! - meter assignments (at most one ACTIVE assignment per meter),
//! - reading submission with baseline enforcement and window validation,
//! - consumption calculation with rollover detection and verification,
//! - competing-submission conflicts and their resolution,
//! - anomaly records for operator review.
//!
//! Recoverable conditions (late submission, suspected rollover, conflict)
//! are first-class states, not failures: the submitter always has a
//! queryable reason for "not yet approved".

pub mod anomaly;
pub mod assignment;
pub mod conflict;
pub mod consumption;
pub mod engine;
pub mod error;
pub mod reading;

pub use anomaly::{Anomaly, AnomalyKind, AnomalyStatus};
pub use assignment::{AssignmentBook, AssignmentStatus, MeterAssignment};
pub use conflict::{
    resolve_conflict, Conflict, ConflictStatus, Resolution, ResolutionDecision, Submission,
};
pub use consumption::{assess_consumption, ConsumptionAssessment, RolloverVerdict};
pub use engine::{MeteringConfig, MeteringEngine, SubmissionOutcome, SubmitReading};
pub use error::MeteringError;
pub use reading::{Reading, ReadingKind, ReadingSource, ReadingStatus};
