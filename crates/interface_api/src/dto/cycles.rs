//! Cycle DTOs

use chrono::{DateTime, NaiveDate, Utc};
use domain_cycle::BillingCycle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleCyclesRequest {
    /// Any date inside the first month to schedule
    pub first_month: NaiveDate,
    #[validate(range(min = 1, max = 24))]
    pub count: u32,
}

/// Lifecycle action for one cycle
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleAction {
    BeginReview,
    Approve,
    Close,
    Archive,
}

#[derive(Debug, Deserialize)]
pub struct TransitionCycleRequest {
    pub action: CycleAction,
    /// Operator override moving an OPEN cycle to review before its window
    /// has closed
    #[serde(default)]
    pub explicit: bool,
}

#[derive(Debug, Serialize)]
pub struct CycleResponse {
    pub id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub target_date: NaiveDate,
    pub window_opens: NaiveDate,
    pub window_closes: NaiveDate,
    pub status: String,
    pub approved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl From<&BillingCycle> for CycleResponse {
    fn from(cycle: &BillingCycle) -> Self {
        Self {
            id: *cycle.id.as_uuid(),
            period_start: cycle.period.start,
            period_end: cycle.period.end,
            target_date: cycle.window.target_date,
            window_opens: cycle.window.opens(),
            window_closes: cycle.window.closes(),
            status: cycle.status.to_string(),
            approved_at: cycle.approved_at,
            closed_at: cycle.closed_at,
            archived_at: cycle.archived_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransitionCycleResponse {
    pub cycle: CycleResponse,
    /// Charges posted by an APPROVE action; zero for the rest
    pub charges_posted: usize,
}
