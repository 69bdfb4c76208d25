//! Billing cycle aggregate
//!
//! A cycle is one dated billing period with a submission window around its
//! target date. The aggregate validates every lifecycle transition; illegal
//! requests fail with [`CycleError::InvalidTransition`] naming both states.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use core_kernel::{local_date, CycleId, DateRange};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CycleError;

/// Cycle lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    /// Accepting reading submissions
    Open,
    /// Submission window closed, readings under review
    PendingReview,
    /// All readings terminal; charges generated
    Approved,
    /// Books closed for the period
    Closed,
    /// Read-only historical record
    Archived,
}

impl CycleStatus {
    /// True for states that accept no further mutation of cycle contents
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleStatus::Closed | CycleStatus::Archived)
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleStatus::Open => "OPEN",
            CycleStatus::PendingReview => "PENDING_REVIEW",
            CycleStatus::Approved => "APPROVED",
            CycleStatus::Closed => "CLOSED",
            CycleStatus::Archived => "ARCHIVED",
        };
        write!(f, "{s}")
    }
}

/// The submission window around a cycle's target date
///
/// Readings are due on the target date; the window admits submissions up to
/// `slack_days` either side of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionWindow {
    /// The official due date for readings
    pub target_date: NaiveDate,
    /// Days before/after the target date that remain in-window
    pub slack_days: u16,
}

impl SubmissionWindow {
    pub fn new(target_date: NaiveDate, slack_days: u16) -> Self {
        Self {
            target_date,
            slack_days,
        }
    }

    pub fn opens(&self) -> NaiveDate {
        self.target_date - Duration::days(self.slack_days as i64)
    }

    pub fn closes(&self) -> NaiveDate {
        self.target_date + Duration::days(self.slack_days as i64)
    }

    /// Classifies a submission date against the window and a grace period
    pub fn status_on(&self, date: NaiveDate, grace_days: u16) -> WindowStatus {
        if date <= self.closes() {
            WindowStatus::InWindow
        } else if date <= self.closes() + Duration::days(grace_days as i64) {
            WindowStatus::Grace
        } else {
            WindowStatus::Late
        }
    }
}

/// Where a submission date falls relative to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowStatus {
    /// On or before the window close
    InWindow,
    /// Past the window but inside the configured grace period
    Grace,
    /// Past the grace period; requires an override to admit
    Late,
}

/// One billing period with its submission window and lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCycle {
    pub id: CycleId,
    /// The dated period this cycle bills
    pub period: DateRange,
    pub window: SubmissionWindow,
    pub status: CycleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the cycle reaches APPROVED; tariff lookups use this instant
    pub approved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl BillingCycle {
    /// Creates a new OPEN cycle
    pub fn open(period: DateRange, window: SubmissionWindow, now: DateTime<Utc>) -> Self {
        Self {
            id: CycleId::new_v7(),
            period,
            window,
            status: CycleStatus::Open,
            created_at: now,
            updated_at: now,
            approved_at: None,
            closed_at: None,
            archived_at: None,
        }
    }

    fn guard(&self, from: CycleStatus, to: CycleStatus) -> Result<(), CycleError> {
        if self.status != from {
            return Err(CycleError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    /// OPEN → PENDING_REVIEW
    ///
    /// Happens automatically once the submission window has closed, or
    /// immediately on explicit override. Requesting it early without an
    /// override is an invalid transition.
    pub fn begin_review(&mut self, now: DateTime<Utc>, explicit: bool) -> Result<(), CycleError> {
        self.guard(CycleStatus::Open, CycleStatus::PendingReview)?;

        if !explicit && local_date(now) <= self.window.closes() {
            return Err(CycleError::InvalidTransition {
                from: self.status,
                to: CycleStatus::PendingReview,
            });
        }

        tracing::info!(cycle = %self.id, explicit, "cycle moved to pending review");
        self.status = CycleStatus::PendingReview;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING_REVIEW → APPROVED
    ///
    /// The caller attests how many readings remain non-terminal; approval is
    /// refused while any reading is still submitted/conflicted/pending.
    pub fn approve(&mut self, now: DateTime<Utc>, pending_readings: usize) -> Result<(), CycleError> {
        self.guard(CycleStatus::PendingReview, CycleStatus::Approved)?;

        if pending_readings > 0 {
            return Err(CycleError::ReadingsNotTerminal {
                pending: pending_readings,
            });
        }

        tracing::info!(cycle = %self.id, "cycle approved");
        self.status = CycleStatus::Approved;
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// APPROVED → CLOSED (manual)
    pub fn close(&mut self, now: DateTime<Utc>) -> Result<(), CycleError> {
        self.guard(CycleStatus::Approved, CycleStatus::Closed)?;

        tracing::info!(cycle = %self.id, "cycle closed");
        self.status = CycleStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// CLOSED → ARCHIVED, age-gated
    ///
    /// A cycle may only be archived once `retention_days` have elapsed since
    /// it was closed. Attempting it earlier is an invalid transition.
    pub fn archive(&mut self, now: DateTime<Utc>, retention_days: u32) -> Result<(), CycleError> {
        self.guard(CycleStatus::Closed, CycleStatus::Archived)?;

        let closed_at = self.closed_at.unwrap_or(self.updated_at);
        if now - closed_at < Duration::days(retention_days as i64) {
            return Err(CycleError::InvalidTransition {
                from: self.status,
                to: CycleStatus::Archived,
            });
        }

        tracing::info!(cycle = %self.id, "cycle archived");
        self.status = CycleStatus::Archived;
        self.archived_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// True while this cycle can accept reading submissions at all
    pub fn accepts_submissions(&self) -> bool {
        self.status == CycleStatus::Open
    }

    /// Classifies a submission instant against this cycle's window
    pub fn submission_status(&self, at: DateTime<Utc>, grace_days: u16) -> WindowStatus {
        self.window.status_on(local_date(at), grace_days)
    }

    /// True once the submission deadline has passed for an OPEN cycle
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == CycleStatus::Open && local_date(now) > self.window.closes()
    }
}
