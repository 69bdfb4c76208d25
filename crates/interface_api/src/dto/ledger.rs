//! Ledger DTOs

use chrono::{DateTime, NaiveDate, Utc};
use domain_ledger::{LedgerEntry, Outstanding, PaymentRecord, Penalty};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct AddTariffRequest {
    pub effective: NaiveDate,
    /// TZS per cubic metre
    pub rate: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    /// Client-assigned idempotency key
    pub submission_key: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    #[validate(length(min = 1))]
    pub received_from: String,
}

#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub entry_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub entry_id: Uuid,
    pub allocations: Vec<AllocationResponse>,
    pub credit_remainder: Decimal,
    pub recorded_at: DateTime<Utc>,
}

impl From<&PaymentRecord> for PaymentResponse {
    fn from(p: &PaymentRecord) -> Self {
        Self {
            payment_id: *p.id.as_uuid(),
            client_id: *p.client_id.as_uuid(),
            amount: p.amount.amount(),
            entry_id: *p.entry_id.as_uuid(),
            allocations: p
                .allocations
                .iter()
                .map(|a| AllocationResponse {
                    entry_id: *a.entry_id.as_uuid(),
                    amount: a.amount.amount(),
                })
                .collect(),
            credit_remainder: p.credit_remainder.amount(),
            recorded_at: p.recorded_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyPenaltyRequest {
    pub client_id: Uuid,
    pub amount: Decimal,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WaivePenaltyRequest {
    #[validate(length(min = 1))]
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct PenaltyResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub entry_id: Uuid,
    pub amount: Decimal,
    pub reason: String,
    pub status: String,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&Penalty> for PenaltyResponse {
    fn from(p: &Penalty) -> Self {
        Self {
            id: *p.id.as_uuid(),
            client_id: *p.client_id.as_uuid(),
            entry_id: *p.entry_id.as_uuid(),
            amount: p.amount.amount(),
            reason: p.reason.clone(),
            status: format!("{:?}", p.status).to_uppercase(),
            applied_by: p.applied_by.clone(),
            applied_at: p.applied_at,
            resolved_at: p.resolved_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutstandingResponse {
    pub entry_id: Uuid,
    pub remaining: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub client_id: Uuid,
    /// Net amount owed; negative when the client is in credit
    pub balance: Decimal,
    pub outstanding: Vec<OutstandingResponse>,
}

impl BalanceResponse {
    pub fn new(client_id: Uuid, balance: Decimal, outstanding: &[Outstanding]) -> Self {
        Self {
            client_id,
            balance,
            outstanding: outstanding
                .iter()
                .map(|o| OutstandingResponse {
                    entry_id: *o.entry_id.as_uuid(),
                    remaining: o.remaining.amount(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub kind: serde_json::Value,
    pub amount: Decimal,
    pub cycle_id: Option<Uuid>,
    pub reading_id: Option<Uuid>,
    pub reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<&LedgerEntry> for EntryResponse {
    fn from(e: &LedgerEntry) -> Self {
        Self {
            id: *e.id.as_uuid(),
            kind: serde_json::to_value(e.kind).unwrap_or(serde_json::Value::Null),
            amount: e.amount.amount(),
            cycle_id: e.cycle_id.map(|c| *c.as_uuid()),
            reading_id: e.reading_id.map(|r| *r.as_uuid()),
            reason: e.reason.clone(),
            created_by: e.created_by.clone(),
            created_at: e.created_at,
        }
    }
}
