//! # Integration Tests for vos-api
//!
//! Drives the full router with `oneshot`: fact ingestion, inline and queued
//! trigger handling, approval decisions, the dispatch ledger and auth.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use vos_api::AppState;
use vos_bus::{BusConfig, EventBus};
use vos_runtime::{RulesHandler, Runtime, RuntimeConfig};

fn test_runtime() -> Runtime {
    Runtime::from_config(&RuntimeConfig::default()).unwrap()
}

fn test_app() -> (Router, Runtime) {
    let runtime = test_runtime();
    (vos_api::app(AppState::new(runtime.clone())), runtime)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

async fn record(app: &Router, product: &str, values: Value) {
    let (status, body) = send(
        app,
        "POST",
        "/v1/facts",
        Some(json!({ "product_id": product, "values": values })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

async fn optimize(app: &Router, product: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/v1/events",
        Some(json!({ "event_type": "schedule.ads_optimization", "product_id": product })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "handled");
    body
}

fn first_action(body: &Value) -> &Value {
    &body["report"]["products"][0]["dispatched"][0]
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn liveness_and_readiness() {
    let (app, _) = test_app();
    let (status, body) = send(&app, "GET", "/health/liveness", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, body) = send(&app, "GET", "/health/readiness", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["rules"], 12);
}

// -- Facts --------------------------------------------------------------------

#[tokio::test]
async fn recorded_facts_are_queryable() {
    let (app, _) = test_app();
    record(&app, "acme", json!({ "spend": "$120.50", "conversions": 4 })).await;

    let (status, body) = send(&app, "GET", "/v1/facts/acme/spend", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["type"], "currency");
    assert_eq!(body["value"]["value"], "120.5");

    let (status, body) = send(&app, "GET", "/v1/facts/acme/conversions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], json!({ "type": "integer", "value": 4 }));
}

#[tokio::test]
async fn wrong_typed_values_are_rejected_whole() {
    let (app, _) = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/facts",
        Some(json!({ "product_id": "acme", "values": { "conversions": 3, "ctr": 0.02 } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Nothing from the rejected request was recorded.
    let (status, _) = send(&app, "GET", "/v1/facts/acme/conversions", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_metric_and_empty_values_are_rejected() {
    let (app, _) = test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/v1/facts",
        Some(json!({ "product_id": "acme", "values": { "mystery": 1 } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        "POST",
        "/v1/facts",
        Some(json!({ "product_id": "acme", "values": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, "POST", "/v1/facts", Some(json!({ "values": {} }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn window_returns_facts_in_timestamp_order() {
    let (app, _) = test_app();
    for (at, spend) in [("2026-03-01T10:00:00Z", "10"), ("2026-03-01T09:00:00Z", "5"), ("2026-03-01T11:00:00Z", "20")] {
        let (status, _) = send(
            &app,
            "POST",
            "/v1/facts",
            Some(json!({ "product_id": "acme", "observed_at": at, "values": { "spend": spend } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app,
        "GET",
        "/v1/facts/acme/spend/window?since=2026-03-01T09:30:00Z",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<&str> = body["facts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["value"]["value"].as_str().unwrap())
        .collect();
    assert_eq!(values, vec!["10", "20"]);

    let (status, _) = send(&app, "GET", "/v1/facts/acme/spend/window?since=yesterday", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn snapshot_lists_latest_values() {
    let (app, _) = test_app();
    record(&app, "acme", json!({ "spend": "10", "target_cpa": "50" })).await;
    let (status, body) = send(&app, "GET", "/v1/facts/acme", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["product_id"], "acme");
    assert_eq!(body["values"]["target_cpa"]["type"], "currency");
}

#[tokio::test]
async fn invalid_product_id_is_422() {
    let (app, _) = test_app();
    let (status, _) = send(&app, "GET", "/v1/facts/Not%20An%20Id/spend", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// -- Triggers -----------------------------------------------------------------

#[tokio::test]
async fn kill_rule_pauses_inline() {
    let (app, _) = test_app();
    record(&app, "acme", json!({ "spend": "200", "target_cpa": "50", "conversions": 0 })).await;

    let body = optimize(&app, "acme").await;
    let dispatched = body["report"]["products"][0]["dispatched"].as_array().unwrap();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0]["action"]["kind"], "pause");
    assert_eq!(dispatched[0]["action"]["origin_rule_id"], "ads.three_x_kill");
    assert_eq!(dispatched[0]["result"]["status"], "succeeded");
}

#[tokio::test]
async fn resubmitted_event_is_replayed() {
    let (app, runtime) = test_app();
    record(&app, "acme", json!({ "spend": "200", "target_cpa": "50", "conversions": 0 })).await;

    let event_id = "4f1c2a8e-0b1d-4c5e-9a7f-3d2b1c0e9f8a";
    let submission = json!({
        "event_type": "schedule.ads_optimization",
        "product_id": "acme",
        "event_id": event_id,
    });
    let (_, first) = send(&app, "POST", "/v1/events", Some(submission.clone())).await;
    let (_, second) = send(&app, "POST", "/v1/events", Some(submission)).await;

    assert_eq!(first["report"]["products"][0]["outcome"]["replayed"], false);
    assert_eq!(second["report"]["products"][0]["outcome"]["replayed"], true);
    assert_eq!(first_action(&first)["action"], first_action(&second)["action"]);

    let dispatched = runtime
        .dispatcher()
        .audit_entries()
        .into_iter()
        .filter(|e| e.entry_type == vos_core::AuditEntryType::ActionDispatched)
        .count();
    assert_eq!(dispatched, 1);
}

#[tokio::test]
async fn facts_with_trigger_flag_evaluate_immediately() {
    let (app, runtime) = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/facts",
        Some(json!({
            "product_id": "acme",
            "values": { "spend": "200", "target_cpa": "50", "conversions": 0 },
            "trigger": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["event_id"].is_string());
    assert_eq!(body["recorded"].as_array().unwrap().len(), 3);

    let dispatched = runtime
        .dispatcher()
        .audit_entries()
        .into_iter()
        .filter(|e| e.entry_type == vos_core::AuditEntryType::ActionDispatched)
        .count();
    assert_eq!(dispatched, 1);
}

#[tokio::test]
async fn event_validation() {
    let (app, _) = test_app();
    let (status, _) = send(&app, "POST", "/v1/events", Some(json!({ "event_type": "  " }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        "POST",
        "/v1/events",
        Some(json!({ "event_type": "schedule.hourly", "colour": "blue" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bus_status_unavailable_without_bus() {
    let (app, _) = test_app();
    let (status, body) = send(&app, "GET", "/v1/events/bus", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn events_are_queued_when_a_bus_is_running() {
    let runtime = test_runtime();
    let bus = Arc::new(EventBus::new(BusConfig::default()));
    bus.subscribe(Arc::new(RulesHandler::new(runtime.clone()))).unwrap();
    let app = vos_api::app(AppState::new(runtime.clone()).with_bus(Arc::clone(&bus)));

    record(&app, "acme", json!({ "spend": "200", "target_cpa": "50", "conversions": 0 })).await;
    let (status, body) = send(
        &app,
        "POST",
        "/v1/events",
        Some(json!({ "event_type": "schedule.ads_optimization", "product_id": "acme" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["handlers"], 1);

    let (status, body) = send(&app, "GET", "/v1/events/bus", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handlers"], json!(["rules_engine"]));

    bus.shutdown().await;
    let (_, body) = send(&app, "GET", "/v1/events/bus", None).await;
    assert_eq!(body["stats"]["delivered"], 1);
    assert_eq!(runtime.dispatcher().failures().len(), 0);
}

// -- Approvals ----------------------------------------------------------------

async fn deferred_scale(app: &Router) -> String {
    record(app, "acme", json!({ "cpa": "30", "target_cpa": "50", "conversions": 12 })).await;
    let body = optimize(app, "acme").await;
    let report = first_action(&body);
    assert_eq!(report["action"]["kind"], "scale_20pct");
    assert_eq!(report["action"]["requires_approval"], true);
    assert_eq!(report["result"]["status"], "deferred");
    report["action"]["action_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn approve_dispatches_deferred_action() {
    let (app, _) = test_app();
    let action_id = deferred_scale(&app).await;

    let (status, body) = send(&app, "GET", "/v1/approvals", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["gate"]["status"], "pending");

    let (_, body) = send(&app, "GET", "/v1/actions/deferred", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (status, body) = send(&app, "GET", "/v1/actions/in_flight", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty(), "a deferred action is not in flight");

    let uri = format!("/v1/approvals/{action_id}/approve");
    let (status, body) = send(&app, "POST", &uri, Some(json!({ "approver": "growth-lead" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "succeeded");

    let (status, body) = send(&app, "POST", &uri, Some(json!({ "approver": "growth-lead" }))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = send(&app, "GET", &format!("/v1/actions/{action_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["status"], "succeeded");

    let (_, body) = send(&app, "GET", "/v1/approvals", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reject_records_failure() {
    let (app, _) = test_app();
    let action_id = deferred_scale(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/approvals/{action_id}/reject"),
        Some(json!({ "approver": "cfo", "reason": "quarter end" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["reason"]["code"], "gate_rejected");

    let (_, body) = send(&app, "GET", "/v1/actions/failed", None).await;
    let failed = body.as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["result"]["reason"]["reason"], "quarter end");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/approvals/{action_id}/approve"),
        Some(json!({ "approver": "growth-lead" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn approval_errors() {
    let (app, _) = test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/v1/approvals/not-a-uuid/approve",
        Some(json!({ "approver": "ops" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let unknown = "00000000-0000-4000-8000-000000000000";
    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/approvals/{unknown}/approve"),
        Some(json!({ "approver": "ops" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/approvals/{unknown}/approve"),
        Some(json!({ "approver": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, "GET", &format!("/v1/actions/{unknown}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Catalog and audit --------------------------------------------------------

#[tokio::test]
async fn rules_list_reports_effective_approval() {
    let (app, _) = test_app();
    let (status, body) = send(&app, "GET", "/v1/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    let rules = body.as_array().unwrap();
    assert_eq!(rules.len(), 12);
    let scale = rules
        .iter()
        .find(|r| r["id"] == "ads.scale_winner")
        .unwrap();
    assert_eq!(scale["requires_approval"], true);
    assert_eq!(scale["priority"], 50);
    let kill = rules.iter().find(|r| r["id"] == "ads.three_x_kill").unwrap();
    assert_eq!(kill["requires_approval"], false);
}

#[tokio::test]
async fn products_list_is_empty_without_registry() {
    let (app, _) = test_app();
    let (status, body) = send(&app, "GET", "/v1/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn audit_merges_engine_and_dispatcher_entries() {
    let (app, _) = test_app();
    record(&app, "acme", json!({ "spend": "200", "target_cpa": "50", "conversions": 0 })).await;
    optimize(&app, "acme").await;

    let (status, body) = send(&app, "GET", "/v1/audit", None).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["entry_type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"action_dispatched"), "{types:?}");
    assert!(types.len() >= 2, "{types:?}");
}

// -- Auth ---------------------------------------------------------------------

#[tokio::test]
async fn token_protects_api_but_not_health() {
    let runtime = test_runtime();
    let app = vos_api::app(AppState::new(runtime).with_auth_token(Some("s3cret".into())));

    let (status, _) = send(&app, "GET", "/v1/rules", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/health/liveness", None).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri("/v1/rules")
        .header("authorization", "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
