//! Metering handlers
//!
//! Thin translations over [`CoreService`]: take the lock, apply one
//! operation, write the changed records through, answer with DTOs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use core_kernel::{
    AnomalyId, AssignmentId, ClientId, ConflictId, CycleId, MeterId, ReadingId, SubmissionKey,
    Volume,
};
use domain_metering::{SubmissionOutcome, SubmitReading};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, roles, Claims};
use crate::dto::metering::*;
use crate::error::ApiError;
use crate::AppState;

/// Assigns a meter to a client, ending any previous assignment
pub async fn assign_meter(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<AssignMeterRequest>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    let meter_id = MeterId::from(request.meter_id);

    let mut core = state.core.write().await;
    let tombstones_before = core.tombstones().len();
    let previous_id = core.assignments.active_for_meter(meter_id).ok().map(|a| a.id);

    let id = core.assign_meter(meter_id, ClientId::from(request.client_id));
    let assignment = core.assignments.get(id)?.clone();
    let previous = previous_id.and_then(|pid| core.assignments.get(pid).ok().cloned());
    let new_tombstones = core.tombstones()[tombstones_before..].to_vec();
    drop(core);

    if let Some(previous) = &previous {
        state.persist.assignment_updated(previous).await?;
    }
    state.persist.assignment_created(&assignment).await?;
    state.persist.tombstones_recorded(&new_tombstones).await?;

    Ok((StatusCode::CREATED, Json(AssignmentResponse::from(&assignment))))
}

/// Ends an assignment without replacing it
pub async fn end_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    let id = AssignmentId::from(id);

    let mut core = state.core.write().await;
    let tombstones_before = core.tombstones().len();
    core.end_assignment(id)?;
    let assignment = core.assignments.get(id)?.clone();
    let new_tombstones = core.tombstones()[tombstones_before..].to_vec();
    drop(core);

    state.persist.assignment_updated(&assignment).await?;
    state.persist.tombstones_recorded(&new_tombstones).await?;

    Ok(Json(AssignmentResponse::from(&assignment)))
}

/// Submits a reading
///
/// Every submission outcome is a legitimate state: a competing value
/// answers 409 with the conflict id rather than an error body.
pub async fn submit_reading(
    State(state): State<AppState>,
    Json(request): Json<SubmitReadingRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;

    let value = Volume::new(request.value)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let assignment_id = AssignmentId::from(request.assignment_id);
    let cycle_id = CycleId::from(request.cycle_id);
    let cmd = SubmitReading {
        submission_key: SubmissionKey::from(request.submission_key),
        assignment_id,
        cycle_id,
        value,
        submitted_by: request.submitted_by,
        source: request.source,
        note: request.note,
        allow_late: request.allow_late,
        expected_version: request.expected_version,
    };

    let submission_key = cmd.submission_key;
    let mut core = state.core.write().await;
    let anomalies_before = core.metering.anomalies().len();
    let replayed_key = core.metering.known_submission(&submission_key);
    let outcome = core.submit_reading(cmd)?;
    let slot_version = core.metering.slot_version(assignment_id, cycle_id);
    let reading = core.metering.reading(outcome.reading_id())?.clone();
    let new_anomalies = core.metering.anomalies()[anomalies_before..].to_vec();
    let conflict = match &outcome {
        SubmissionOutcome::Conflicted { conflict_id, .. } => {
            Some(core.metering.conflict(*conflict_id)?.clone())
        }
        _ => None,
    };
    let competitor = conflict
        .as_ref()
        .and_then(|c| core.metering.reading(c.first.reading_id).ok().cloned());
    drop(core);

    let body = SubmitReadingResponse::from_outcome(&outcome, slot_version);
    let status = match &outcome {
        SubmissionOutcome::Replayed(_) => {
            return Ok((StatusCode::OK, Json(body)).into_response());
        }
        SubmissionOutcome::Conflicted { .. } => StatusCode::CONFLICT,
        _ => StatusCode::CREATED,
    };

    // A replayed key changed nothing; the original write-through covered it.
    if !replayed_key {
        state.persist.reading_created(&reading).await?;
        if let Some(conflict) = &conflict {
            state.persist.conflict_created(conflict).await?;
        }
        if let Some(competitor) = &competitor {
            state.persist.reading_updated(competitor).await?;
        }
        for anomaly in &new_anomalies {
            state.persist.anomaly_created(anomaly).await?;
        }
    }

    Ok((status, Json(body)).into_response())
}

/// Gets a reading by ID
pub async fn get_reading(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReadingResponse>, ApiError> {
    let core = state.core.read().await;
    let reading = core.metering.reading(ReadingId::from(id))?;
    Ok(Json(ReadingResponse::from(reading)))
}

/// Approves a submitted reading
pub async fn approve_reading(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReadingResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;

    let reading = {
        let mut core = state.core.write().await;
        core.approve_reading(ReadingId::from(id), &claims.sub)?
    };
    state.persist.reading_updated(&reading).await?;

    Ok(Json(ReadingResponse::from(&reading)))
}

/// Rejects a reading with a mandatory reason
pub async fn reject_reading(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectReadingRequest>,
) -> Result<Json<ReadingResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    request.validate()?;

    let mut core = state.core.write().await;
    let tombstones_before = core.tombstones().len();
    let reading = core.reject_reading(ReadingId::from(id), &request.reason)?;
    let new_tombstones = core.tombstones()[tombstones_before..].to_vec();
    drop(core);

    state.persist.reading_updated(&reading).await?;
    state.persist.tombstones_recorded(&new_tombstones).await?;

    Ok(Json(ReadingResponse::from(&reading)))
}

/// Applies a verifier's verdict to a suspected rollover
pub async fn verify_rollover(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<VerifyRolloverRequest>,
) -> Result<Json<ReadingResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;

    let mut core = state.core.write().await;
    let tombstones_before = core.tombstones().len();
    let reading = core.verify_rollover(ReadingId::from(id), request.verdict, &claims.sub)?;
    let new_tombstones = core.tombstones()[tombstones_before..].to_vec();
    drop(core);

    state.persist.reading_updated(&reading).await?;
    state.persist.tombstones_recorded(&new_tombstones).await?;

    Ok(Json(ReadingResponse::from(&reading)))
}

/// Lists unresolved conflicts
pub async fn list_conflicts(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConflictResponse>>, ApiError> {
    let core = state.core.read().await;
    Ok(Json(
        core.metering
            .open_conflicts()
            .map(ConflictResponse::from)
            .collect(),
    ))
}

/// Adjudicates a conflict
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveConflictRequest>,
) -> Result<Json<ResolutionResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    request.validate()?;
    let id = ConflictId::from(id);

    let mut core = state.core.write().await;
    let tombstones_before = core.tombstones().len();
    let resolution = core.resolve_conflict(id, request.decision, &claims.sub, &request.reason)?;
    let conflict = core.metering.conflict(id)?.clone();
    let winner = core.metering.reading(resolution.winning_reading)?.clone();
    let losers: Vec<_> = resolution
        .rejected_readings
        .iter()
        .filter_map(|rid| core.metering.reading(*rid).ok().cloned())
        .collect();
    let new_tombstones = core.tombstones()[tombstones_before..].to_vec();
    drop(core);

    state.persist.conflict_updated(&conflict).await?;
    state.persist.reading_updated(&winner).await?;
    for loser in &losers {
        state.persist.reading_updated(loser).await?;
    }
    state.persist.tombstones_recorded(&new_tombstones).await?;

    Ok(Json(ResolutionResponse::from(&resolution)))
}

/// Lists anomaly records for operator review
pub async fn list_anomalies(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnomalyResponse>>, ApiError> {
    let core = state.core.read().await;
    Ok(Json(
        core.metering
            .anomalies()
            .iter()
            .map(AnomalyResponse::from)
            .collect(),
    ))
}

/// Marks an anomaly as seen
pub async fn acknowledge_anomaly(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnomalyResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    let id = AnomalyId::from(id);

    let mut core = state.core.write().await;
    let anomaly = core.metering.acknowledge_anomaly(id, &claims.sub)?.clone();
    drop(core);

    state.persist.anomaly_updated(&anomaly).await?;
    Ok(Json(AnomalyResponse::from(&anomaly)))
}

/// Closes an anomaly with the operator's conclusion
pub async fn resolve_anomaly(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveAnomalyRequest>,
) -> Result<Json<AnomalyResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    request.validate()?;
    let id = AnomalyId::from(id);

    let mut core = state.core.write().await;
    let anomaly = core
        .metering
        .resolve_anomaly(id, &claims.sub, &request.note)?
        .clone();
    drop(core);

    state.persist.anomaly_updated(&anomaly).await?;
    Ok(Json(AnomalyResponse::from(&anomaly)))
}
