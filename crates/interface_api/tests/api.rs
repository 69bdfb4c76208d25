//! End-to-end API tests
//!
//! Runs the full router against the in-process books with write-through
//! persistence disabled, driving billing periods with a manual clock.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum_test::TestServer;
use chrono::{DateTime, Duration, TimeZone, Utc};
use core_kernel::ManualClock;
use interface_api::{auth, config::ApiConfig, create_router, AppState};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap()
}

fn server() -> (TestServer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at(start()));
    let state = AppState::new(clock.clone(), None, ApiConfig::default());
    (TestServer::new(create_router(state)).unwrap(), clock)
}

fn bearer(role: &str) -> HeaderValue {
    let token = auth::create_token(
        &format!("{role}-1"),
        vec![role.to_string()],
        &ApiConfig::default().jwt_secret,
        3600,
    )
    .unwrap();
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

fn decimal(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).unwrap()
}

/// Schedules cycles and returns their ids in period order.
async fn schedule_cycles(server: &TestServer, first_month: &str, count: u32) -> Vec<Uuid> {
    let response = server
        .post("/api/v1/cycles")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({ "first_month": first_month, "count": count }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    body.as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap().parse().unwrap())
        .collect()
}

async fn assign_meter(server: &TestServer) -> (Uuid, Uuid) {
    let client_id = Uuid::new_v4();
    let response = server
        .post("/api/v1/assignments")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({ "meter_id": Uuid::new_v4(), "client_id": client_id }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    (body["id"].as_str().unwrap().parse().unwrap(), client_id)
}

async fn add_tariff(server: &TestServer, effective: &str, rate: Decimal) {
    let response = server
        .post("/api/v1/ledger/tariffs")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({ "effective": effective, "rate": rate }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
}

async fn submit_reading(
    server: &TestServer,
    assignment_id: Uuid,
    cycle_id: Uuid,
    value: Decimal,
) -> (axum::http::StatusCode, Value) {
    let response = server
        .post("/api/v1/readings")
        .add_header(axum::http::header::AUTHORIZATION, bearer("collector"))
        .json(&json!({
            "submission_key": Uuid::new_v4(),
            "assignment_id": assignment_id,
            "cycle_id": cycle_id,
            "value": value,
            "submitted_by": "collector-1",
            "source": "CAPTURE",
        }))
        .await;
    (response.status_code(), response.json())
}

async fn transition(server: &TestServer, cycle_id: Uuid, body: Value) -> Value {
    let response = server
        .post(&format!("/api/v1/cycles/{cycle_id}/transition"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&body)
        .await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn test_health_is_public_but_api_is_not() {
    let (server, _clock) = server();

    server.get("/health").await.assert_status_ok();
    server.get("/health/ready").await.assert_status_ok();

    let response = server.get("/api/v1/cycles").await;
    response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_cycle_answers_404() {
    let (server, _clock) = server();

    let response = server
        .get(&format!("/api/v1/cycles/{}", Uuid::new_v4()))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_guards() {
    let (server, _clock) = server();

    // A collector cannot schedule cycles.
    let response = server
        .post("/api/v1/cycles")
        .add_header(axum::http::header::AUTHORIZATION, bearer("collector"))
        .json(&json!({ "first_month": "2025-06-01", "count": 1 }))
        .await;
    response.assert_status(axum::http::StatusCode::FORBIDDEN);

    // A collector cannot bootstrap the device feed either.
    let response = server
        .get("/api/v1/sync/bootstrap")
        .add_header(axum::http::header::AUTHORIZATION, bearer("collector"))
        .await;
    response.assert_status(axum::http::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_billing_flow_end_to_end() {
    let (server, clock) = server();

    let cycles = schedule_cycles(&server, "2025-06-01", 2).await;
    let (june, july) = (cycles[0], cycles[1]);
    add_tariff(&server, "2025-01-01", dec!(1000)).await;
    let (assignment, client) = assign_meter(&server).await;

    // First reading anchors the meter: auto-approved, zero consumption.
    let (status, body) = submit_reading(&server, assignment, june, dec!(100)).await;
    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["outcome"], "BASELINE");
    assert_eq!(body["slot_version"], 1);

    // A baseline produces no charge when the cycle is approved.
    let body = transition(&server, june, json!({ "action": "BEGIN_REVIEW", "explicit": true })).await;
    assert_eq!(body["cycle"]["status"], "PENDING_REVIEW");
    let body = transition(&server, june, json!({ "action": "APPROVE" })).await;
    assert_eq!(body["cycle"]["status"], "APPROVED");
    assert_eq!(body["charges_posted"], 0);

    // The next month's reading bills its consumption.
    let (status, body) = submit_reading(&server, assignment, july, dec!(130)).await;
    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["outcome"], "ACCEPTED");
    let reading_id = body["reading_id"].as_str().unwrap().to_string();

    server
        .post(&format!("/api/v1/readings/{reading_id}/approve"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await
        .assert_status_ok();

    // Window for July closes in early August; review begins naturally then.
    clock.advance(Duration::days(62));
    let body = transition(&server, july, json!({ "action": "BEGIN_REVIEW" })).await;
    assert_eq!(body["cycle"]["status"], "PENDING_REVIEW");
    let body = transition(&server, july, json!({ "action": "APPROVE" })).await;
    assert_eq!(body["charges_posted"], 1);

    // 30 m3 at 1000 TZS/m3.
    let response = server
        .get(&format!("/api/v1/ledger/clients/{client}/balance"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(decimal(&body["balance"]), dec!(30000));
    assert_eq!(body["outstanding"].as_array().unwrap().len(), 1);

    // Partial payment allocates FIFO and leaves the remainder outstanding.
    let response = server
        .post("/api/v1/ledger/payments")
        .add_header(axum::http::header::AUTHORIZATION, bearer("collector"))
        .json(&json!({
            "submission_key": Uuid::new_v4(),
            "client_id": client,
            "amount": dec!(20000),
            "received_from": "Asha Mwakasege",
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["allocations"].as_array().unwrap().len(), 1);
    assert_eq!(decimal(&body["credit_remainder"]), dec!(0));

    let response = server
        .get(&format!("/api/v1/ledger/clients/{client}/balance"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert_eq!(decimal(&body["balance"]), dec!(10000));
}

#[tokio::test]
async fn test_competing_submission_answers_409_and_is_adjudicated() {
    let (server, _clock) = server();

    let cycles = schedule_cycles(&server, "2025-06-01", 1).await;
    let june = cycles[0];
    let (assignment, _client) = assign_meter(&server).await;

    submit_reading(&server, assignment, june, dec!(100)).await;
    let (status, body) = submit_reading(&server, assignment, june, dec!(105)).await;
    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    assert_eq!(body["outcome"], "CONFLICTED");
    let conflict_id = body["conflict_id"].as_str().unwrap().to_string();

    let response = server
        .get("/api/v1/conflicts")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = server
        .post(&format!("/api/v1/conflicts/{conflict_id}/resolve"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({
            "decision": { "decision": "ACCEPT_SECOND" },
            "reason": "second photo is legible",
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(decimal(&body["selected_value"]), dec!(105));
    assert_eq!(body["rejected_readings"].as_array().unwrap().len(), 1);

    let response = server
        .get("/api/v1/conflicts")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_replayed_submission_key_answers_200() {
    let (server, _clock) = server();

    let cycles = schedule_cycles(&server, "2025-06-01", 1).await;
    let (assignment, _client) = assign_meter(&server).await;
    let key = Uuid::new_v4();

    let payload = json!({
        "submission_key": key,
        "assignment_id": assignment,
        "cycle_id": cycles[0],
        "value": dec!(100),
        "submitted_by": "collector-1",
        "source": "CAPTURE",
    });

    let first = server
        .post("/api/v1/readings")
        .add_header(axum::http::header::AUTHORIZATION, bearer("collector"))
        .json(&payload)
        .await;
    first.assert_status(axum::http::StatusCode::CREATED);

    let replay = server
        .post("/api/v1/readings")
        .add_header(axum::http::header::AUTHORIZATION, bearer("collector"))
        .json(&payload)
        .await;
    replay.assert_status_ok();
    let body: Value = replay.json();
    assert_eq!(body["outcome"], "REPLAYED");
}

#[tokio::test]
async fn test_rollover_held_until_verified() {
    let (server, _clock) = server();

    let cycles = schedule_cycles(&server, "2025-06-01", 2).await;
    let (assignment, _client) = assign_meter(&server).await;

    submit_reading(&server, assignment, cycles[0], dec!(99000)).await;
    let (status, body) = submit_reading(&server, assignment, cycles[1], dec!(500)).await;
    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["outcome"], "PENDING_ROLLOVER");
    let reading_id = body["reading_id"].as_str().unwrap().to_string();

    // Plain approval is refused while verification is pending.
    let response = server
        .post(&format!("/api/v1/readings/{reading_id}/approve"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);

    let response = server
        .post(&format!("/api/v1/readings/{reading_id}/rollover"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({ "verdict": "GENUINE_ROLLOVER" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"]["state"], "APPROVED");
    assert_eq!(decimal(&body["consumption"]), dec!(1499.9999));
}

#[tokio::test]
async fn test_penalty_applied_and_waived() {
    let (server, _clock) = server();
    let client = Uuid::new_v4();

    let response = server
        .post("/api/v1/ledger/penalties")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({
            "client_id": client,
            "amount": dec!(5000),
            "reason": "illegal reconnection",
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    let penalty_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "ACTIVE");

    let response = server
        .get(&format!("/api/v1/ledger/clients/{client}/balance"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert_eq!(decimal(&body["balance"]), dec!(5000));

    let response = server
        .post(&format!("/api/v1/ledger/penalties/{penalty_id}/waive"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({ "note": "hardship waiver approved" }))
        .await;
    response.assert_status_ok();

    let response = server
        .get(&format!("/api/v1/ledger/clients/{client}/balance"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert_eq!(decimal(&body["balance"]), dec!(0));
}

#[tokio::test]
async fn test_notification_retry_lifecycle() {
    let (server, clock) = server();
    let client = Uuid::new_v4();

    let response = server
        .post("/api/v1/notifications")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({
            "client_id": client,
            "category": "PAYMENT_REMINDER",
            "recipient": "+255700000001",
            "body": "Payment due",
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    let message_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["state"], "PENDING");

    // First sweep dispatches attempt 1.
    let response = server
        .post("/api/v1/notifications/sweep")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert_eq!(body["dispatched"].as_array().unwrap().len(), 1);
    assert_eq!(body["dispatched"][0]["attempt"], 1);

    // Gateway reports a failure; the retry is due 30 minutes later.
    let response = server
        .post(&format!("/api/v1/notifications/{message_id}/delivery"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({
            "attempt": 1,
            "outcome": { "outcome": "FAILED", "reason": "gateway timeout" },
        }))
        .await;
    response.assert_status_ok();

    let response = server
        .post("/api/v1/notifications/sweep")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert!(body["dispatched"].as_array().unwrap().is_empty());

    clock.advance(Duration::minutes(30));
    let response = server
        .post("/api/v1/notifications/sweep")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert_eq!(body["dispatched"][0]["attempt"], 2);

    // Second attempt delivers.
    let response = server
        .post(&format!("/api/v1/notifications/{message_id}/delivery"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({
            "attempt": 2,
            "outcome": { "outcome": "DELIVERED" },
            "gateway_reference": "gw-42",
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["state"], "DELIVERED");

    let response = server
        .get("/api/v1/notifications/alerts")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    let body: Value = response.json();
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_bootstrap_delta_and_upload() {
    let (server, clock) = server();

    let cycles = schedule_cycles(&server, "2025-06-01", 2).await;
    let (assignment, _client) = assign_meter(&server).await;

    let response = server
        .get("/api/v1/sync/bootstrap")
        .add_header(axum::http::header::AUTHORIZATION, bearer("device"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["schema_version"], 1);
    assert_eq!(body["cycles"].as_array().unwrap().len(), 2);
    assert_eq!(body["assignments"].as_array().unwrap().len(), 1);
    let checkpoint = body["checkpoint"].as_str().unwrap().to_string();

    // An offline queue drains through the same submission path.
    clock.advance(Duration::minutes(5));
    let response = server
        .post("/api/v1/sync/upload")
        .add_header(axum::http::header::AUTHORIZATION, bearer("device"))
        .json(&json!({ "readings": [
            {
                "submission_key": Uuid::new_v4(),
                "assignment_id": assignment,
                "cycle_id": cycles[0],
                "value": dec!(100),
                "submitted_by": "device-1",
                "source": "SYNC",
            },
            {
                "submission_key": Uuid::new_v4(),
                "assignment_id": assignment,
                "cycle_id": cycles[1],
                "value": dec!(130),
                "submitted_by": "device-1",
                "source": "SYNC",
            },
        ]}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["outcome"], "BASELINE");
    assert_eq!(results[1]["outcome"], "ACCEPTED");

    // The delta picks the uploaded readings up as upserts.
    let response = server
        .get(&format!("/api/v1/sync/delta?checkpoint={checkpoint}"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("device"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(!body["upserts"].as_array().unwrap().is_empty());

    // Garbage checkpoints force a fresh bootstrap.
    let response = server
        .get("/api/v1/sync/delta?checkpoint=garbage")
        .add_header(axum::http::header::AUTHORIZATION, bearer("device"))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_keeps_items_accepted_before_a_failing_one() {
    let (server, _clock) = server();

    let cycles = schedule_cycles(&server, "2025-06-01", 1).await;
    let (assignment, _client) = assign_meter(&server).await;
    let key = Uuid::new_v4();

    // The second item references a meter the server has never seen, so
    // the batch fails after the first item has been accepted.
    let response = server
        .post("/api/v1/sync/upload")
        .add_header(axum::http::header::AUTHORIZATION, bearer("device"))
        .json(&json!({ "readings": [
            {
                "submission_key": key,
                "assignment_id": assignment,
                "cycle_id": cycles[0],
                "value": dec!(100),
                "submitted_by": "device-1",
                "source": "SYNC",
            },
            {
                "submission_key": Uuid::new_v4(),
                "assignment_id": Uuid::new_v4(),
                "cycle_id": cycles[0],
                "value": dec!(120),
                "submitted_by": "device-1",
                "source": "SYNC",
            },
        ]}))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);

    // The retry replays the accepted key instead of posting a duplicate.
    let response = server
        .post("/api/v1/sync/upload")
        .add_header(axum::http::header::AUTHORIZATION, bearer("device"))
        .json(&json!({ "readings": [
            {
                "submission_key": key,
                "assignment_id": assignment,
                "cycle_id": cycles[0],
                "value": dec!(100),
                "submitted_by": "device-1",
                "source": "SYNC",
            },
        ]}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["results"][0]["outcome"], "REPLAYED");
}

#[tokio::test]
async fn test_rejection_emits_a_tombstone_in_the_delta() {
    let (server, clock) = server();

    let cycles = schedule_cycles(&server, "2025-06-01", 2).await;
    let (assignment, _client) = assign_meter(&server).await;

    let response = server
        .get("/api/v1/sync/bootstrap")
        .add_header(axum::http::header::AUTHORIZATION, bearer("device"))
        .await;
    let body: Value = response.json();
    let checkpoint = body["checkpoint"].as_str().unwrap().to_string();

    submit_reading(&server, assignment, cycles[0], dec!(100)).await;
    let (_, body) = submit_reading(&server, assignment, cycles[1], dec!(130)).await;
    let reading_id = body["reading_id"].as_str().unwrap().to_string();

    clock.advance(Duration::minutes(1));
    let response = server
        .post(&format!("/api/v1/readings/{reading_id}/reject"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({ "reason": "photo does not match the meter" }))
        .await;
    response.assert_status_ok();

    clock.advance(Duration::minutes(1));
    let response = server
        .get(&format!("/api/v1/sync/delta?checkpoint={checkpoint}"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("device"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let tombstones = body["tombstones"].as_array().unwrap();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0]["reason"], "READING_REJECTED");
    assert_eq!(tombstones[0]["entity_id"].as_str().unwrap(), reading_id);
}

#[tokio::test]
async fn test_negative_consumption_is_queued_for_operator_review() {
    let (server, _clock) = server();
    let cycles = schedule_cycles(&server, "2025-06-01", 2).await;
    let (assignment_id, _client_id) = assign_meter(&server).await;

    let (status, _) = submit_reading(&server, assignment_id, cycles[0], dec!(100)).await;
    assert_eq!(status, axum::http::StatusCode::CREATED);

    // Counter moved backwards, well below the rollover band.
    let (status, body) = submit_reading(&server, assignment_id, cycles[1], dec!(80)).await;
    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["outcome"], "ACCEPTED");

    let response = server
        .get("/api/v1/anomalies")
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    response.assert_status_ok();
    let anomalies: Value = response.json();
    assert_eq!(anomalies.as_array().unwrap().len(), 1);
    assert_eq!(anomalies[0]["kind"], "NEGATIVE_CONSUMPTION");
    assert_eq!(anomalies[0]["status"], "DETECTED");
    let anomaly_id = anomalies[0]["id"].as_str().unwrap().to_string();

    // Only admins adjudicate anomalies.
    let response = server
        .post(&format!("/api/v1/anomalies/{anomaly_id}/acknowledge"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("collector"))
        .await;
    response.assert_status(axum::http::StatusCode::FORBIDDEN);

    let response = server
        .post(&format!("/api/v1/anomalies/{anomaly_id}/acknowledge"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ACKNOWLEDGED");

    let response = server
        .post(&format!("/api/v1/anomalies/{anomaly_id}/resolve"))
        .add_header(axum::http::header::AUTHORIZATION, bearer("admin"))
        .json(&json!({ "note": "meter inspected, reading confirmed" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "RESOLVED");
    assert_eq!(body["resolved_by"], "admin-1");
}
