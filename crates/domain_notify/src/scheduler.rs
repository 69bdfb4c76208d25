//! Retry scheduling
//!
//! The retry policy is a pure decision table over (record, now): the same
//! inputs always yield the same decision, so the policy is tested without
//! timers. The outbox drives it with an injected [`Clock`] and advances a
//! message's state before any dispatch leaves the process.
//!
//! Schedule: attempt 1 dispatches immediately, attempt 2 thirty minutes
//! after the previous failure, attempt 3 four hours after. Three attempts
//! maximum inside a 24-hour window from the first dispatch; past either
//! bound the message is permanently failed and an operator alert raised.

use chrono::{DateTime, Duration, Utc};
use core_kernel::{ClientId, Clock, NotificationId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::NotifyError;
use crate::message::{
    AttemptOutcome, DeliveryState, MessageCategory, NotificationRecord,
};

pub const MAX_ATTEMPTS: u8 = 3;

/// Length of the retry window, anchored at the first dispatch
pub fn retry_window() -> Duration {
    Duration::hours(24)
}

/// Delay before the given attempt number, relative to the previous
/// failure (attempt 1 relative to creation)
pub fn delay_before_attempt(attempt: u8) -> Option<Duration> {
    match attempt {
        1 => Some(Duration::zero()),
        2 => Some(Duration::minutes(30)),
        3 => Some(Duration::hours(4)),
        _ => None,
    }
}

/// What the scheduler should do with a message right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryDecision {
    /// Dispatch the given attempt number
    DispatchNow { attempt: u8 },
    /// Next attempt is scheduled but not yet due
    WaitUntil(DateTime<Utc>),
    /// Dispatch is in flight, the gateway has not answered
    AwaitingGateway,
    /// Budget exhausted: mark permanently failed and alert an operator
    GiveUp,
    /// Delivered or already permanently failed
    Settled,
}

/// The retry decision table
pub fn next_action(record: &NotificationRecord, now: DateTime<Utc>) -> RetryDecision {
    match record.state {
        DeliveryState::Delivered | DeliveryState::PermanentlyFailed => RetryDecision::Settled,
        DeliveryState::Sent => RetryDecision::AwaitingGateway,
        DeliveryState::Pending => RetryDecision::DispatchNow { attempt: 1 },
        DeliveryState::Failed => {
            let attempt = record.attempt_count() + 1;
            let Some(delay) = delay_before_attempt(attempt) else {
                return RetryDecision::GiveUp;
            };
            let failed_at = record
                .last_failed_at()
                .unwrap_or(record.created_at);
            let window_ends = record
                .first_attempted_at()
                .unwrap_or(record.created_at)
                + retry_window();

            let due = failed_at + delay;
            if due > window_ends || now > window_ends {
                return RetryDecision::GiveUp;
            }
            if now >= due {
                RetryDecision::DispatchNow { attempt }
            } else {
                RetryDecision::WaitUntil(due)
            }
        }
    }
}

/// Work order for the gateway adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOrder {
    pub message_id: NotificationId,
    pub attempt: u8,
    pub recipient: String,
    pub body: String,
}

/// Raised when a message exhausts its retry budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub message_id: NotificationId,
    pub client_id: ClientId,
    pub attempts: u8,
    pub raised_at: DateTime<Utc>,
}

/// Outbound message store and scheduler driver
pub struct NotificationOutbox {
    clock: Arc<dyn Clock>,
    messages: HashMap<NotificationId, NotificationRecord>,
    alerts: Vec<OperatorAlert>,
}

impl NotificationOutbox {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            messages: HashMap::new(),
            alerts: Vec::new(),
        }
    }

    pub fn enqueue(
        &mut self,
        client_id: ClientId,
        category: MessageCategory,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> NotificationId {
        let record =
            NotificationRecord::new(client_id, category, recipient, body, self.clock.now());
        let id = record.id;
        self.messages.insert(id, record);
        id
    }

    /// One scheduler pass: dispatches everything due, permanently fails
    /// everything out of budget. Each returned order has already had its
    /// attempt recorded, so a concurrent pass cannot re-issue it.
    pub fn sweep(&mut self) -> Vec<DispatchOrder> {
        let now = self.clock.now();
        let mut orders = Vec::new();

        for record in self.messages.values_mut() {
            match next_action(record, now) {
                RetryDecision::DispatchNow { attempt } => {
                    // begin_attempt re-checks the state.
                    if record.begin_attempt(now).is_ok() {
                        orders.push(DispatchOrder {
                            message_id: record.id,
                            attempt,
                            recipient: record.recipient.clone(),
                            body: record.body.clone(),
                        });
                    }
                }
                RetryDecision::GiveUp => {
                    record.exhaust(now);
                    tracing::error!(
                        message = %record.id,
                        client = %record.client_id,
                        attempts = record.attempt_count(),
                        "notification retry budget exhausted"
                    );
                    self.alerts.push(OperatorAlert {
                        message_id: record.id,
                        client_id: record.client_id,
                        attempts: record.attempt_count(),
                        raised_at: now,
                    });
                }
                RetryDecision::WaitUntil(_)
                | RetryDecision::AwaitingGateway
                | RetryDecision::Settled => {}
            }
        }

        orders
    }

    /// Gateway delivery callback, idempotent by (message, attempt)
    pub fn delivery_callback(
        &mut self,
        message_id: NotificationId,
        attempt: u8,
        outcome: AttemptOutcome,
        gateway_reference: Option<String>,
        gateway_response: Option<String>,
    ) -> Result<&NotificationRecord, NotifyError> {
        let now = self.clock.now();
        let record = self
            .messages
            .get_mut(&message_id)
            .ok_or(NotifyError::MessageNotFound(message_id))?;
        record.conclude_attempt(attempt, outcome, gateway_reference, gateway_response, now)?;
        Ok(&*record)
    }

    pub fn message(&self, id: NotificationId) -> Result<&NotificationRecord, NotifyError> {
        self.messages.get(&id).ok_or(NotifyError::MessageNotFound(id))
    }

    pub fn alerts(&self) -> &[OperatorAlert] {
        &self.alerts
    }

    pub fn messages_changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl Iterator<Item = &NotificationRecord> {
        self.messages.values().filter(move |m| m.updated_at > since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_kernel::ManualClock;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 10, 9, 0, 0).unwrap()
    }

    fn outbox_with_message(clock: Arc<ManualClock>) -> (NotificationOutbox, NotificationId) {
        let mut outbox = NotificationOutbox::new(clock);
        let id = outbox.enqueue(
            ClientId::new(),
            MessageCategory::PaymentReminder,
            "+255700000001",
            "Payment due",
        );
        (outbox, id)
    }

    fn fail(outbox: &mut NotificationOutbox, id: NotificationId, attempt: u8) {
        outbox
            .delivery_callback(
                id,
                attempt,
                AttemptOutcome::Failed {
                    reason: "gateway timeout".to_string(),
                },
                None,
                None,
            )
            .unwrap();
    }

    #[test]
    fn test_pending_message_dispatches_immediately() {
        let clock = Arc::new(ManualClock::at(start()));
        let (mut outbox, id) = outbox_with_message(clock);

        let orders = outbox.sweep();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].message_id, id);
        assert_eq!(orders[0].attempt, 1);
        assert_eq!(outbox.message(id).unwrap().state, DeliveryState::Sent);

        // A second concurrent-style pass must not re-issue it.
        assert!(outbox.sweep().is_empty());
    }

    #[test]
    fn test_second_attempt_waits_thirty_minutes() {
        let clock = Arc::new(ManualClock::at(start()));
        let (mut outbox, id) = outbox_with_message(clock.clone());

        outbox.sweep();
        fail(&mut outbox, id, 1);

        // Not due yet.
        assert!(outbox.sweep().is_empty());

        clock.advance(Duration::minutes(30));
        let orders = outbox.sweep();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].attempt, 2);
    }

    #[test]
    fn test_third_attempt_waits_four_hours() {
        let clock = Arc::new(ManualClock::at(start()));
        let (mut outbox, id) = outbox_with_message(clock.clone());

        outbox.sweep();
        fail(&mut outbox, id, 1);
        clock.advance(Duration::minutes(30));
        outbox.sweep();
        fail(&mut outbox, id, 2);

        clock.advance(Duration::hours(3));
        assert!(outbox.sweep().is_empty());

        clock.advance(Duration::hours(1));
        let orders = outbox.sweep();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].attempt, 3);
    }

    #[test]
    fn test_fourth_attempt_becomes_permanent_failure_with_alert() {
        let clock = Arc::new(ManualClock::at(start()));
        let (mut outbox, id) = outbox_with_message(clock.clone());

        outbox.sweep();
        fail(&mut outbox, id, 1);
        clock.advance(Duration::minutes(30));
        outbox.sweep();
        fail(&mut outbox, id, 2);
        clock.advance(Duration::hours(4));
        outbox.sweep();
        fail(&mut outbox, id, 3);

        let orders = outbox.sweep();
        assert!(orders.is_empty());
        assert_eq!(
            outbox.message(id).unwrap().state,
            DeliveryState::PermanentlyFailed
        );
        assert_eq!(outbox.alerts().len(), 1);
        assert_eq!(outbox.alerts()[0].attempts, 3);
    }

    #[test]
    fn test_retry_past_the_window_gives_up() {
        let clock = Arc::new(ManualClock::at(start()));
        let (mut outbox, id) = outbox_with_message(clock.clone());

        outbox.sweep();
        clock.advance(Duration::hours(25));
        fail(&mut outbox, id, 1);

        outbox.sweep();
        assert_eq!(
            outbox.message(id).unwrap().state,
            DeliveryState::PermanentlyFailed
        );
        assert_eq!(outbox.alerts().len(), 1);
    }

    #[test]
    fn test_delivered_message_is_settled() {
        let clock = Arc::new(ManualClock::at(start()));
        let (mut outbox, id) = outbox_with_message(clock);

        outbox.sweep();
        outbox
            .delivery_callback(id, 1, AttemptOutcome::Delivered, Some("gw-9".to_string()), None)
            .unwrap();

        let record = outbox.message(id).unwrap();
        assert_eq!(record.state, DeliveryState::Delivered);
        assert_eq!(
            next_action(record, record.updated_at),
            RetryDecision::Settled
        );
        assert!(outbox.sweep().is_empty());
    }

    #[test]
    fn test_decision_table_is_pure() {
        let clock = Arc::new(ManualClock::at(start()));
        let (mut outbox, id) = outbox_with_message(clock);

        outbox.sweep();
        fail(&mut outbox, id, 1);

        let record = outbox.message(id).unwrap();
        let now = start() + Duration::minutes(10);
        assert_eq!(next_action(record, now), next_action(record, now));
        assert_eq!(
            next_action(record, now),
            RetryDecision::WaitUntil(record.last_failed_at().unwrap() + Duration::minutes(30))
        );
    }
}
