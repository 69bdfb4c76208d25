//! Device sync handlers
//!
//! Bootstrap and delta are pure reads over the core service; upload drains
//! a device's offline queue through the same submission path interactive
//! clients use, so idempotency keys and conflict detection apply unchanged.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use core_kernel::{AssignmentId, CycleId, SubmissionKey, Volume};
use domain_metering::{SubmissionOutcome, SubmitReading};
use sync_protocol::{AuthoritativeView, BootstrapResponse, DeltaResponse};

use crate::auth::{self, roles, Claims};
use crate::dto::metering::SubmitReadingResponse;
use crate::dto::sync::*;
use crate::error::ApiError;
use crate::AppState;

/// Full working-set snapshot for a device
pub async fn bootstrap(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<BootstrapResponse>, ApiError> {
    auth::require_role(&claims, roles::DEVICE)?;

    let core = state.core.read().await;
    let now = core.now();
    let response = sync_protocol::bootstrap(&*core as &dyn AuthoritativeView, now);
    tracing::info!(device = %claims.sub, cycles = response.cycles.len(), "bootstrap served");
    Ok(Json(response))
}

/// Changes and tombstones since a checkpoint
pub async fn delta(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<DeltaResponse>, ApiError> {
    auth::require_role(&claims, roles::DEVICE)?;

    let core = state.core.read().await;
    let now = core.now();
    let response = sync_protocol::delta(&*core as &dyn AuthoritativeView, &query.checkpoint, now)?;
    Ok(Json(response))
}

/// Drains a device's offline queue, oldest-first
///
/// Each item is submitted and written through on its own: when an item
/// midway through the batch is refused, everything accepted before it is
/// already durable, and the device's retry replays the accepted keys
/// without posting anything new.
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<UploadRequest>,
) -> Result<Response, ApiError> {
    auth::require_role(&claims, roles::DEVICE)?;

    let mut results = Vec::with_capacity(request.readings.len());
    for item in request.readings {
        let value = Volume::new(item.value).map_err(|e| ApiError::Validation(e.to_string()))?;
        let assignment_id = AssignmentId::from(item.assignment_id);
        let cycle_id = CycleId::from(item.cycle_id);
        let submission_key = SubmissionKey::from(item.submission_key);
        let cmd = SubmitReading {
            submission_key,
            assignment_id,
            cycle_id,
            value,
            submitted_by: item.submitted_by,
            source: item.source,
            note: item.note,
            allow_late: item.allow_late,
            expected_version: item.expected_version,
        };

        let mut core = state.core.write().await;
        let anomalies_before = core.metering.anomalies().len();
        let replayed_key = core.metering.known_submission(&submission_key);
        let outcome = core.submit_reading(cmd)?;
        let slot_version = core.metering.slot_version(assignment_id, cycle_id);
        let mut created = None;
        let mut conflict = None;
        let mut competitor = None;
        let mut anomalies = Vec::new();
        if !replayed_key && !matches!(outcome, SubmissionOutcome::Replayed(_)) {
            created = Some(core.metering.reading(outcome.reading_id())?.clone());
            anomalies = core.metering.anomalies()[anomalies_before..].to_vec();
            if let SubmissionOutcome::Conflicted { conflict_id, .. } = &outcome {
                let c = core.metering.conflict(*conflict_id)?.clone();
                competitor = core.metering.reading(c.first.reading_id).ok().cloned();
                conflict = Some(c);
            }
        }
        drop(core);

        if let Some(reading) = &created {
            state.persist.reading_created(reading).await?;
        }
        if let Some(conflict) = &conflict {
            state.persist.conflict_created(conflict).await?;
        }
        if let Some(competitor) = &competitor {
            state.persist.reading_updated(competitor).await?;
        }
        for anomaly in &anomalies {
            state.persist.anomaly_created(anomaly).await?;
        }

        results.push(SubmitReadingResponse::from_outcome(&outcome, slot_version));
    }

    tracing::info!(device = %claims.sub, accepted = results.len(), "offline queue drained");
    Ok((StatusCode::OK, Json(UploadResponse { results })).into_response())
}
