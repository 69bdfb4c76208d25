//! Notification DTOs

use chrono::{DateTime, Utc};
use domain_notify::{
    AttemptOutcome, DispatchOrder, MessageCategory, NotificationRecord, OperatorAlert,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct EnqueueNotificationRequest {
    pub client_id: Uuid,
    pub category: MessageCategory,
    /// Destination phone number
    #[validate(length(min = 1))]
    pub recipient: String,
    #[validate(length(min = 1))]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub category: MessageCategory,
    pub state: String,
    pub attempts: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&NotificationRecord> for NotificationResponse {
    fn from(r: &NotificationRecord) -> Self {
        Self {
            id: *r.id.as_uuid(),
            client_id: *r.client_id.as_uuid(),
            category: r.category,
            state: serde_json::to_value(r.state)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            attempts: r.attempt_count(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Gateway verdict for one dispatch attempt
#[derive(Debug, Deserialize)]
pub struct DeliveryCallbackRequest {
    pub attempt: u8,
    pub outcome: AttemptOutcome,
    pub gateway_reference: Option<String>,
    pub gateway_response: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DispatchOrderResponse {
    pub message_id: Uuid,
    pub attempt: u8,
    pub recipient: String,
    pub body: String,
}

impl From<&DispatchOrder> for DispatchOrderResponse {
    fn from(o: &DispatchOrder) -> Self {
        Self {
            message_id: *o.message_id.as_uuid(),
            attempt: o.attempt,
            recipient: o.recipient.clone(),
            body: o.body.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub dispatched: Vec<DispatchOrderResponse>,
    /// Messages that exhausted their retry budget during this pass
    pub exhausted: usize,
}

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub message_id: Uuid,
    pub client_id: Uuid,
    pub attempts: u8,
    pub raised_at: DateTime<Utc>,
}

impl From<&OperatorAlert> for AlertResponse {
    fn from(a: &OperatorAlert) -> Self {
        Self {
            message_id: *a.message_id.as_uuid(),
            client_id: *a.client_id.as_uuid(),
            attempts: a.attempts,
            raised_at: a.raised_at,
        }
    }
}
