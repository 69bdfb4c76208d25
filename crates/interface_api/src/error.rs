//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use domain_cycle::CycleError;
use domain_ledger::LedgerError;
use domain_metering::MeteringError;
use domain_notify::NotifyError;
use infra_db::DatabaseError;
use sync_protocol::SyncError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
            ApiError::Database(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", msg.clone())
            }
            ApiError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone())
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<MeteringError> for ApiError {
    fn from(err: MeteringError) -> Self {
        match err {
            MeteringError::AssignmentNotFound(_)
            | MeteringError::NoActiveAssignment(_)
            | MeteringError::ReadingNotFound(_)
            | MeteringError::ConflictNotFound(_)
            | MeteringError::AnomalyNotFound(_) => ApiError::NotFound(err.to_string()),
            MeteringError::InsufficientJustification => ApiError::Validation(err.to_string()),
            MeteringError::AssignmentInactive(_)
            | MeteringError::LateSubmission { .. }
            | MeteringError::CycleNotAccepting { .. } => ApiError::Validation(err.to_string()),
            MeteringError::ReadingImmutable { .. }
            | MeteringError::NotPendingRollover(_)
            | MeteringError::RolloverPendingVerification(_)
            | MeteringError::ReadingConflicted(_)
            | MeteringError::ConflictAlreadyResolved(_)
            | MeteringError::VersionMismatch { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<CycleError> for ApiError {
    fn from(err: CycleError) -> Self {
        match err {
            CycleError::NotFound(_) => ApiError::NotFound(err.to_string()),
            CycleError::InvalidTransition { .. } | CycleError::ReadingsNotTerminal { .. } => {
                ApiError::Conflict(err.to_string())
            }
            CycleError::Overlap { .. }
            | CycleError::Gap { .. }
            | CycleError::InvalidSchedule(_) => ApiError::Validation(err.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::EntryNotFound(_) | LedgerError::PenaltyNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            LedgerError::ActivePenaltyExists(_)
            | LedgerError::PenaltyNotActive(_)
            | LedgerError::DuplicateTariffDate(_) => ApiError::Conflict(err.to_string()),
            LedgerError::NonPositiveAmount
            | LedgerError::NoTariffInForce(_)
            | LedgerError::InsufficientJustification
            | LedgerError::Money(_) => ApiError::Validation(err.to_string()),
        }
    }
}

impl From<NotifyError> for ApiError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::MessageNotFound(_) | NotifyError::AttemptUnknown { .. } => {
                ApiError::NotFound(err.to_string())
            }
            NotifyError::NotDispatchable(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        // An undecodable or stale checkpoint tells the client to bootstrap
        // again; it is a client-side problem, not a server fault.
        ApiError::BadRequest(err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else {
            ApiError::Database(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}
