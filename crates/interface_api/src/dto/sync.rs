//! Sync DTOs
//!
//! Bootstrap and delta responses come straight from `sync_protocol`; this
//! module only adds the request shapes around them.

use serde::{Deserialize, Serialize};

use crate::dto::metering::{SubmitReadingRequest, SubmitReadingResponse};

/// Query parameters for the delta endpoint
#[derive(Debug, Deserialize)]
pub struct DeltaQuery {
    /// Opaque token from the previous bootstrap or delta
    pub checkpoint: String,
}

/// A device's offline queue, uploaded oldest-first
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub readings: Vec<SubmitReadingRequest>,
}

/// Per-item outcomes in upload order
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub results: Vec<SubmitReadingResponse>,
}
