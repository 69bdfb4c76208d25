//! Billing Cycle Domain
//!
//! Owns the cycle lifecycle state machine and submission-window
//! enforcement:
//!
//! ```text
//! OPEN → PENDING_REVIEW → APPROVED → CLOSED → ARCHIVED
//! ```
//!
//! The window from OPEN to PENDING_REVIEW closes automatically once the
//! submission deadline passes, or earlier on explicit override. APPROVED
//! requires every reading in the cycle to have reached a terminal approval
//! status. ARCHIVED is age-gated from CLOSED and read-only thereafter.
//!
//! Scheduling produces contiguous, non-overlapping monthly cycles whose
//! target dates default to a fixed day of month, shifted backward to the
//! nearest working day unless explicitly overridden.

pub mod cycle;
pub mod error;
pub mod schedule;

pub use cycle::{BillingCycle, CycleStatus, SubmissionWindow, WindowStatus};
pub use error::CycleError;
pub use schedule::{CycleScheduler, ScheduleConfig};
