//! Checkpoint tokens
//!
//! A checkpoint is an opaque token the client stores between sync passes.
//! It encodes the server instant the last delta covered. Any token the
//! server cannot decode maps to [`SyncError::CheckpointInvalid`], which
//! forces the client through a fresh bootstrap.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::payload::SCHEMA_VERSION;

/// Decoded checkpoint state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Token format version
    pub version: u32,
    /// Server instant the last delta covered
    pub since: DateTime<Utc>,
}

impl Checkpoint {
    pub fn at(since: DateTime<Utc>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            since,
        }
    }

    /// Encodes the checkpoint as an opaque url-safe token
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("checkpoint serialization is infallible");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes a client-supplied token
    pub fn decode(token: &str) -> Result<Self, SyncError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| SyncError::CheckpointInvalid(e.to_string()))?;
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::CheckpointInvalid(e.to_string()))?;
        if checkpoint.version != SCHEMA_VERSION {
            return Err(SyncError::UnsupportedSchemaVersion {
                got: checkpoint.version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(checkpoint)
    }
}
