//! Notification Domain
//!
//! Outbound SMS records with a bounded retry machine:
//! PENDING → SENT → DELIVERED, or → FAILED → PERMANENTLY_FAILED once the
//! retry budget (three attempts inside 24 hours) is spent. Every attempt
//! and every gateway response is appended to an immutable history. The
//! retry policy is a pure decision table driven by an injected clock.

pub mod error;
pub mod message;
pub mod scheduler;

pub use error::NotifyError;
pub use message::{
    Attempt, AttemptOutcome, DeliveryState, MessageCategory, NotificationRecord,
};
pub use scheduler::{
    delay_before_attempt, next_action, DispatchOrder, NotificationOutbox, OperatorAlert,
    RetryDecision, MAX_ATTEMPTS,
};
