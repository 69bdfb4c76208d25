//! Cycle handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use core_kernel::CycleId;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, roles, Claims};
use crate::dto::cycles::*;
use crate::error::ApiError;
use crate::AppState;

/// Schedules a run of contiguous monthly cycles
pub async fn schedule_cycles(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<ScheduleCyclesRequest>,
) -> Result<(StatusCode, Json<Vec<CycleResponse>>), ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    request.validate()?;

    let scheduled = {
        let mut core = state.core.write().await;
        core.schedule_cycles(request.first_month, request.count)?
    };

    for cycle in &scheduled {
        state.persist.cycle_created(cycle).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(scheduled.iter().map(CycleResponse::from).collect()),
    ))
}

/// Lists all cycles in period order
pub async fn list_cycles(
    State(state): State<AppState>,
) -> Result<Json<Vec<CycleResponse>>, ApiError> {
    let core = state.core.read().await;
    Ok(Json(
        core.cycles_sorted().iter().map(CycleResponse::from).collect(),
    ))
}

/// Gets a cycle by ID
pub async fn get_cycle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CycleResponse>, ApiError> {
    let core = state.core.read().await;
    let cycle = core.cycle(CycleId::from(id))?;
    Ok(Json(CycleResponse::from(cycle)))
}

/// Applies a lifecycle action to a cycle
///
/// APPROVE also posts the cycle's charges at the tariff in force today.
pub async fn transition_cycle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionCycleRequest>,
) -> Result<Json<TransitionCycleResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    let id = CycleId::from(id);

    let mut core = state.core.write().await;
    let tombstones_before = core.tombstones().len();

    let (cycle, entries) = match request.action {
        CycleAction::BeginReview => (core.begin_review(id, request.explicit)?, Vec::new()),
        CycleAction::Approve => core.approve_cycle(id, &claims.sub)?,
        CycleAction::Close => (core.close_cycle(id)?, Vec::new()),
        CycleAction::Archive => (core.archive_cycle(id)?, Vec::new()),
    };
    let new_tombstones = core.tombstones()[tombstones_before..].to_vec();
    drop(core);

    state.persist.cycle_updated(&cycle).await?;
    state.persist.entries_created(&entries).await?;
    state.persist.tombstones_recorded(&new_tombstones).await?;

    Ok(Json(TransitionCycleResponse {
        cycle: CycleResponse::from(&cycle),
        charges_posted: entries.len(),
    }))
}
