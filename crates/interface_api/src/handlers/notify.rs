//! Notification handlers
//!
//! The sweep endpoint exists alongside the periodic background task so an
//! operator can force a scheduler pass after a gateway outage.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use core_kernel::{ClientId, NotificationId};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, roles, Claims};
use crate::dto::notify::*;
use crate::error::ApiError;
use crate::AppState;

/// Queues an outbound message for delivery
pub async fn enqueue_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<EnqueueNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationResponse>), ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    request.validate()?;

    let record = {
        let mut core = state.core.write().await;
        let id = core.enqueue_notification(
            ClientId::from(request.client_id),
            request.category,
            &request.recipient,
            &request.body,
        );
        core.outbox.message(id)?.clone()
    };
    state.persist.notification_created(&record).await?;

    Ok((StatusCode::CREATED, Json(NotificationResponse::from(&record))))
}

/// Gets a message by ID
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let core = state.core.read().await;
    let record = core.outbox.message(NotificationId::from(id))?;
    Ok(Json(NotificationResponse::from(record)))
}

/// Runs one scheduler pass over the outbox
pub async fn sweep_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SweepResponse>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;

    let mut core = state.core.write().await;
    let alerts_before = core.alerts().len();
    let orders = core.sweep_notifications();
    let exhausted = core.alerts().len() - alerts_before;

    // Everything the sweep touched: dispatched messages plus the ones it
    // permanently failed.
    let mut changed = Vec::with_capacity(orders.len() + exhausted);
    for order in &orders {
        changed.push(core.outbox.message(order.message_id)?.clone());
    }
    for alert in &core.alerts()[alerts_before..] {
        changed.push(core.outbox.message(alert.message_id)?.clone());
    }
    drop(core);

    for record in &changed {
        state.persist.notification_updated(record).await?;
    }

    Ok(Json(SweepResponse {
        dispatched: orders.iter().map(DispatchOrderResponse::from).collect(),
        exhausted,
    }))
}

/// Gateway delivery callback for one attempt
pub async fn delivery_callback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<DeliveryCallbackRequest>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let record = {
        let mut core = state.core.write().await;
        core.delivery_callback(
            NotificationId::from(id),
            request.attempt,
            request.outcome,
            request.gateway_reference,
            request.gateway_response,
        )?
    };
    state.persist.notification_updated(&record).await?;

    Ok(Json(NotificationResponse::from(&record)))
}

/// Lists operator alerts raised for exhausted messages
pub async fn list_alerts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<AlertResponse>>, ApiError> {
    auth::require_role(&claims, roles::ADMIN)?;
    let core = state.core.read().await;
    Ok(Json(core.alerts().iter().map(AlertResponse::from).collect()))
}
