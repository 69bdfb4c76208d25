//! Ledger handlers

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use core_kernel::{ClientId, LedgerEntryId, Money, PenaltyId, SubmissionKey};
use domain_ledger::LedgerEntry;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, roles, Claims};
use crate::dto::ledger::*;
use crate::error::ApiError;
use crate::AppState;

/// Adds a tariff rate taking effect on a date
pub async fn add_tariff(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<AddTariffRequest>,
) -> Result<StatusCode, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;

    let mut core = state.core.write().await;
    core.add_tariff(request.effective, request.rate)?;
    Ok(StatusCode::CREATED)
}

/// Records a received payment and applies it FIFO
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    auth::require_role(&claims, roles::COLLECTOR)?;
    request.validate()?;
    let client_id = ClientId::from(request.client_id);
    let key = SubmissionKey::from(request.submission_key);

    let mut core = state.core.write().await;
    let before: HashSet<LedgerEntryId> = core.entries_for(client_id).iter().map(|e| e.id).collect();
    let payment = core.record_payment(
        key,
        client_id,
        Money::new(request.amount),
        &request.received_from,
        &claims.sub,
    )?;
    let new_entries: Vec<LedgerEntry> = core
        .entries_for(client_id)
        .into_iter()
        .filter(|e| !before.contains(&e.id))
        .collect();
    drop(core);

    state.persist.entries_created(&new_entries).await?;
    state.persist.payment_created(key, &payment).await?;

    Ok((StatusCode::CREATED, Json(PaymentResponse::from(&payment))))
}

/// Applies a manual penalty with a mandatory justification
pub async fn apply_penalty(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<ApplyPenaltyRequest>,
) -> Result<(StatusCode, Json<PenaltyResponse>), ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    request.validate()?;
    let client_id = ClientId::from(request.client_id);

    let mut core = state.core.write().await;
    let before: HashSet<LedgerEntryId> = core.entries_for(client_id).iter().map(|e| e.id).collect();
    let penalty = core.apply_penalty(
        client_id,
        Money::new(request.amount),
        &request.reason,
        &claims.sub,
    )?;
    let new_entries: Vec<LedgerEntry> = core
        .entries_for(client_id)
        .into_iter()
        .filter(|e| !before.contains(&e.id))
        .collect();
    drop(core);

    state.persist.entries_created(&new_entries).await?;
    state.persist.penalty_created(&penalty).await?;

    Ok((StatusCode::CREATED, Json(PenaltyResponse::from(&penalty))))
}

/// Waives an active penalty
pub async fn waive_penalty(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<WaivePenaltyRequest>,
) -> Result<Json<PenaltyResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    request.validate()?;
    let id = PenaltyId::from(id);

    let mut core = state.core.write().await;
    let client_id = core.ledger.penalty(id)?.client_id;
    // The waiver may post an ADJUSTMENT credit for the unpaid remainder.
    let before: HashSet<LedgerEntryId> = core.entries_for(client_id).iter().map(|e| e.id).collect();
    let penalty = core.waive_penalty(id, &claims.sub, &request.note)?;
    let new_entries: Vec<LedgerEntry> = core
        .entries_for(client_id)
        .into_iter()
        .filter(|e| !before.contains(&e.id))
        .collect();
    drop(core);

    state.persist.entries_created(&new_entries).await?;
    state.persist.penalty_updated(&penalty).await?;

    Ok(Json(PenaltyResponse::from(&penalty)))
}

/// A client's balance and outstanding debits
pub async fn get_balance(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let core = state.core.read().await;
    let id = ClientId::from(client_id);
    let balance = core.balance_for(id);
    let outstanding = core.outstanding_for(id);
    Ok(Json(BalanceResponse::new(
        client_id,
        balance.amount(),
        &outstanding,
    )))
}

/// A client's ledger entries in posting order
pub async fn list_entries(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Vec<EntryResponse>>, ApiError> {
    let core = state.core.read().await;
    Ok(Json(
        core.entries_for(ClientId::from(client_id))
            .iter()
            .map(EntryResponse::from)
            .collect(),
    ))
}
