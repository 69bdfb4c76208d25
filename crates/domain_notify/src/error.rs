//! Notification domain errors

use core_kernel::NotificationId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification {0} not found")]
    MessageNotFound(NotificationId),

    #[error("Notification {message} has no attempt {attempt}")]
    AttemptUnknown {
        message: NotificationId,
        attempt: u8,
    },

    #[error("Notification {0} is not awaiting dispatch")]
    NotDispatchable(NotificationId),
}
