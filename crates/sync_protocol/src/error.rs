//! Sync protocol errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The checkpoint token could not be decoded; the client must run a
    /// full bootstrap
    #[error("Invalid checkpoint token: {0}")]
    CheckpointInvalid(String),

    #[error("Unsupported sync schema version {got}, this server speaks {supported}")]
    UnsupportedSchemaVersion { got: u32, supported: u32 },

    #[error("Upload queue is empty")]
    QueueEmpty,

    #[error("An upload is already in flight")]
    UploadInFlight,
}
