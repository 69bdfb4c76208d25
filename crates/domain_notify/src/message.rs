//! Outbound message records
//!
//! A record carries its full attempt history: every dispatch, every
//! gateway response, appended and never overwritten. Delivery callbacks
//! are idempotent by (message, attempt number).

use chrono::{DateTime, Utc};
use core_kernel::{ClientId, NotificationId};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// What the message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageCategory {
    BalanceAlert,
    PaymentReminder,
    ReadingConfirmation,
}

/// Delivery lifecycle of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    /// Created, no dispatch yet
    Pending,
    /// Dispatch attempted, awaiting the gateway's verdict
    Sent,
    /// Terminal: gateway confirmed delivery
    Delivered,
    /// Last attempt failed; a retry may still be scheduled
    Failed,
    /// Terminal: retry budget exhausted
    PermanentlyFailed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Delivered | DeliveryState::PermanentlyFailed)
    }
}

/// Outcome of one dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "outcome")]
pub enum AttemptOutcome {
    /// Dispatched, no callback yet
    AwaitingGateway,
    Delivered,
    Failed { reason: String },
}

/// One immutable entry in a message's attempt history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u8,
    pub dispatched_at: DateTime<Utc>,
    /// The gateway's id for this dispatch, once known
    pub gateway_reference: Option<String>,
    /// Raw gateway response, retained verbatim
    pub gateway_response: Option<String>,
    pub outcome: AttemptOutcome,
    pub concluded_at: Option<DateTime<Utc>>,
}

/// One outbound message and its attempt history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub client_id: ClientId,
    pub category: MessageCategory,
    /// Destination phone number
    pub recipient: String,
    pub body: String,
    pub state: DeliveryState,
    pub attempts: Vec<Attempt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn new(
        client_id: ClientId,
        category: MessageCategory,
        recipient: impl Into<String>,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new_v7(),
            client_id,
            category,
            recipient: recipient.into(),
            body: body.into(),
            state: DeliveryState::Pending,
            attempts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attempt_count(&self) -> u8 {
        self.attempts.len() as u8
    }

    /// When the first dispatch happened, anchoring the retry window
    pub fn first_attempted_at(&self) -> Option<DateTime<Utc>> {
        self.attempts.first().map(|a| a.dispatched_at)
    }

    /// When the most recent attempt failed
    pub fn last_failed_at(&self) -> Option<DateTime<Utc>> {
        self.attempts
            .iter()
            .rev()
            .find(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
            .and_then(|a| a.concluded_at)
    }

    /// Appends a new dispatch attempt and moves the message to SENT.
    /// The state advances before any gateway call is made, so concurrent
    /// scheduler runs cannot double-send an in-flight message.
    pub(crate) fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<u8, NotifyError> {
        if !matches!(self.state, DeliveryState::Pending | DeliveryState::Failed) {
            return Err(NotifyError::NotDispatchable(self.id));
        }
        let number = self.attempt_count() + 1;
        self.attempts.push(Attempt {
            number,
            dispatched_at: now,
            gateway_reference: None,
            gateway_response: None,
            outcome: AttemptOutcome::AwaitingGateway,
            concluded_at: None,
        });
        self.state = DeliveryState::Sent;
        self.updated_at = now;
        Ok(number)
    }

    /// Records the gateway's verdict for one attempt
    ///
    /// Idempotent by attempt number: once an attempt has concluded,
    /// replaying the same callback changes nothing.
    pub(crate) fn conclude_attempt(
        &mut self,
        attempt_number: u8,
        outcome: AttemptOutcome,
        gateway_reference: Option<String>,
        gateway_response: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        let id = self.id;
        let attempt = self
            .attempts
            .iter_mut()
            .find(|a| a.number == attempt_number)
            .ok_or(NotifyError::AttemptUnknown {
                message: id,
                attempt: attempt_number,
            })?;

        if !matches!(attempt.outcome, AttemptOutcome::AwaitingGateway) {
            return Ok(());
        }

        attempt.outcome = outcome.clone();
        attempt.concluded_at = Some(now);
        if attempt.gateway_reference.is_none() {
            attempt.gateway_reference = gateway_reference;
        }
        attempt.gateway_response = gateway_response;

        // Only the latest attempt steers the message state.
        if attempt_number == self.attempt_count() {
            self.state = match outcome {
                AttemptOutcome::Delivered => DeliveryState::Delivered,
                AttemptOutcome::Failed { .. } => DeliveryState::Failed,
                AttemptOutcome::AwaitingGateway => self.state,
            };
        }
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn exhaust(&mut self, now: DateTime<Utc>) {
        self.state = DeliveryState::PermanentlyFailed;
        self.updated_at = now;
    }
}
