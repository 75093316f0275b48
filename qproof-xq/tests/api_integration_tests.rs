//! Integration tests for qproof-xq API endpoints
//!
//! Drives the full router over in-memory SQLite. The verification agent
//! points at a closed port, so agent-tier records exercise the degraded
//! path rather than hanging on the network.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use qproof_common::events::EventBus;
use qproof_xq::services::VerificationAgent;
use qproof_xq::AppState;

/// Test helper: create test app with in-memory database
async fn create_test_app() -> (axum::Router, sqlx::SqlitePool) {
    // Single connection so every handle sees the same in-memory database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    qproof_xq::db::init_tables(&pool)
        .await
        .expect("Failed to initialize database schema");

    let event_bus = EventBus::new(100);
    let agent = VerificationAgent::new("http://127.0.0.1:1", 200);
    let state = AppState::new(pool.clone(), event_bus, agent, None);

    (qproof_xq::build_router(state), pool)
}

fn record_json(amount_confidence: f64) -> Value {
    json!({
        "record_id": Uuid::new_v4(),
        "document_id": Uuid::new_v4(),
        "fields": {
            "amount": { "value": "42.00", "confidence": amount_confidence }
        },
        "raw_text": "Invoice total 42.00",
        "complexity_score": 0.2,
        "ocr_quality": 0.7,
        "missing_entities": [],
        "calc_error": false,
        "user_id": null
    })
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_endpoint_reports_module_identity() {
    let (app, _pool) = create_test_app().await;

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "qproof-xq");
}

#[tokio::test]
async fn process_endpoint_routes_a_record() {
    let (app, _pool) = create_test_app().await;

    let (status, body) = post_json(&app, "/process", record_json(0.95)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["routing"]["tier"], "AUTO_ACCEPT");
    assert_eq!(body["pricing"]["outcome"], "skipped");
}

#[tokio::test]
async fn low_confidence_record_routes_to_human_review() {
    let (app, _pool) = create_test_app().await;

    let (status, body) = post_json(&app, "/process", record_json(0.45)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["routing"]["tier"], "HUMAN_REVIEW");
    assert!(body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r.as_str().unwrap().contains("human review")));
}

#[tokio::test]
async fn route_endpoint_is_a_dry_run() {
    let (app, pool) = create_test_app().await;

    // 0.75 sits in the agent-extract band
    let (status, body) = post_json(&app, "/route", record_json(0.75)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], "AGENT_EXTRACT");

    // No outcome was recorded
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM extraction_outcomes")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn batch_endpoint_processes_records_independently() {
    let (app, _pool) = create_test_app().await;

    let (status, body) = post_json(
        &app,
        "/process/batch",
        json!([record_json(0.95), record_json(0.45)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert!(body["failed"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_failures_create_a_pattern_visible_over_http() {
    let (app, _pool) = create_test_app().await;

    // Default minimum occurrences is 5; distinct records, same failure shape
    for _ in 0..5 {
        let (status, _) = post_json(&app, "/process", record_json(0.65)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = get_json(&app, "/patterns?status=NEW").await;
    assert_eq!(status, StatusCode::OK);
    let patterns = body.as_array().unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0]["signature"], "amount:0.60-0.70:OCR_FAILURE");
    assert_eq!(patterns[0]["frequency"], 5);

    let (status, timeline) =
        get_json(&app, "/patterns/amount:0.60-0.70:OCR_FAILURE/timeline").await;
    assert_eq!(status, StatusCode::OK);
    let total: i64 = timeline
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["count"].as_i64().unwrap())
        .sum();
    assert_eq!(total, 5);
}

#[tokio::test]
async fn unknown_pattern_returns_404() {
    let (app, _pool) = create_test_app().await;
    let (status, _) = get_json(&app, "/patterns/amount:0.10-0.20:NER_MISS").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// The payload gate only admits fields the router configuration knows
async fn seed_known_fields(pool: &sqlx::SqlitePool) {
    sqlx::query("INSERT INTO settings (key, value) VALUES ('field_weights', '{\"amount\":3.0}')")
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn fix_lifecycle_over_http() {
    let (app, pool) = create_test_app().await;
    seed_known_fields(&pool).await;

    for _ in 0..5 {
        post_json(&app, "/process", record_json(0.65)).await;
    }

    // Propose
    let (status, fix) = post_json(
        &app,
        "/fixes",
        json!({
            "pattern_signature": "amount:0.60-0.70:OCR_FAILURE",
            "payload": {
                "fix_type": "CONFIDENCE_THRESHOLD",
                "field": "amount",
                "floor": 0.75
            },
            "test_success_rate": 0.92,
            "admin_confidence_score": 0.88,
            "created_by": "anna"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fix["status"], "DRAFT");
    let fix_id = fix["id"].as_str().unwrap().to_string();

    // Skipping staging is a conflict
    let (status, _) = post_json(
        &app,
        &format!("/fixes/{}/promote", fix_id),
        json!({"actor": "anna"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Checklist is advisory and complete
    let (status, checklist) = get_json(&app, &format!("/fixes/{}/checklist", fix_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(checklist.as_array().unwrap().len(), 5);

    // Impact projection reflects the five observed outcomes
    let (status, impact) = get_json(&app, &format!("/fixes/{}/impact", fix_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(impact["recent_frequency"], 5);

    // Apply, promote, rollback in order
    let (status, staged) = post_json(
        &app,
        &format!("/fixes/{}/apply", fix_id),
        json!({"actor": "anna"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(staged["status"], "STAGING");

    let (status, promoted) = post_json(
        &app,
        &format!("/fixes/{}/promote", fix_id),
        json!({"actor": "anna"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["status"], "PRODUCTION");

    let (status, rolled) = post_json(
        &app,
        &format!("/fixes/{}/rollback", fix_id),
        json!({"actor": "anna"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rolled["status"], "ROLLED_BACK");

    // Audit trail has all three entries
    let (status, history) = get_json(&app, &format!("/fixes/{}/history", fix_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn failed_gate_returns_422_with_the_check_name() {
    let (app, _pool) = create_test_app().await;

    for _ in 0..5 {
        post_json(&app, "/process", record_json(0.65)).await;
    }

    let (status, fix) = post_json(
        &app,
        "/fixes",
        json!({
            "pattern_signature": "amount:0.60-0.70:OCR_FAILURE",
            "payload": {
                "fix_type": "CONFIDENCE_THRESHOLD",
                "field": "amount",
                "floor": 0.75
            },
            "test_success_rate": 0.80,
            "admin_confidence_score": 0.90,
            "created_by": "anna"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let fix_id = fix["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        &format!("/fixes/{}/apply", fix_id),
        json!({"actor": "anna"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("test success rate"));
}

#[tokio::test]
async fn proposing_a_fix_for_an_unknown_pattern_is_404() {
    let (app, _pool) = create_test_app().await;

    let (status, _) = post_json(
        &app,
        "/fixes",
        json!({
            "pattern_signature": "vendor:0.50-0.60:NER_MISS",
            "payload": {
                "fix_type": "FIELD_WEIGHT",
                "field": "vendor",
                "weight": 2.0
            },
            "test_success_rate": 0.9,
            "admin_confidence_score": 0.9,
            "created_by": "anna"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn check_health_endpoint_returns_rolled_back_ids() {
    let (app, _pool) = create_test_app().await;
    let (status, body) = post_json(&app, "/fixes/check-health", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn pattern_report_is_plain_text() {
    let (app, _pool) = create_test_app().await;

    for _ in 0..5 {
        post_json(&app, "/process", record_json(0.65)).await;
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/patterns/report")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("amount:0.60-0.70:OCR_FAILURE"));
}
