//! Integration tests for gss-sv API endpoints
//!
//! Each test runs against a fresh database in a temporary directory and
//! drives the router directly with `oneshot`.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use gss_common::assignment::FillLedger;
use gss_common::catalog::{QuotaTarget, KPC_ATTRIBUTES, RETAILERS};
use gss_common::config::ZipEntry;
use gss_common::db::{
    get_quota, get_respondent, init_database, list_fill_counts, seed_zip_codes, CompletionStatus,
};
use gss_common::Segment;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinSet;
use tower::util::ServiceExt; // for `oneshot` method
use gss_sv::{build_router, AppState};

struct TestApp {
    _dir: TempDir,
    pool: SqlitePool,
    router: Router,
}

async fn setup() -> TestApp {
    let dir = TempDir::new().unwrap();
    let quotas: Vec<(Segment, QuotaTarget)> = Segment::ALL
        .iter()
        .map(|s| (*s, gss_common::catalog::default_quota(*s)))
        .collect();
    let pool = init_database(&dir.path().join("gss.db"), &quotas).await.unwrap();
    seed_zip_codes(
        &pool,
        &[ZipEntry {
            code: "50010".to_string(),
            dma: "Des Moines-Ames".to_string(),
            state: "IA".to_string(),
        }],
    )
    .await
    .unwrap();

    let router = build_router(AppState::new(pool.clone()));
    TestApp {
        _dir: dir,
        pool,
        router,
    }
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

async fn post(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::USER_AGENT,
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148",
        )
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

async fn submit(app: &TestApp, id: &str, answers: Value) -> Value {
    let (status, body) = post(app, &format!("/api/survey/{}/submit", id), answers.clone()).await;
    assert_eq!(status, StatusCode::OK, "submit {} failed: {}", answers, body);
    body
}

fn funnel(stages: &[(&str, i64)]) -> Value {
    let mut map = Map::new();
    for retailer in RETAILERS {
        let stage = stages
            .iter()
            .find(|(code, _)| *code == retailer.code)
            .map(|(_, stage)| *stage)
            .unwrap_or(1);
        map.insert(retailer.code.to_string(), json!(stage));
    }
    Value::Object(map)
}

fn attributes(value: i64) -> Value {
    let map: Map<String, Value> = KPC_ATTRIBUTES
        .iter()
        .map(|a| (a.code.to_string(), json!(value)))
        .collect();
    Value::Object(map)
}

/// Answer consent through S7 for a respondent who shops the given stores
async fn drive_to_household(
    app: &TestApp,
    id: &str,
    stages: &[(&str, i64)],
    allocation: Value,
) -> Value {
    let (status, _) = post(app, "/api/survey/init", json!({"respondent_id": id})).await;
    assert_eq!(status, StatusCode::CREATED);

    submit(app, id, json!({"block": "consent"})).await;
    submit(app, id, json!({"block": "block1_s1", "zip_code": "50010"})).await;
    submit(app, id, json!({"block": "block1_s2", "grocery_decisionmaker": 1})).await;
    submit(app, id, json!({"block": "block1_s3", "funnel": funnel(stages)})).await;
    let after_sow = submit(
        app,
        id,
        json!({"block": "block1_s4", "stores": allocation, "other_pct": 10}),
    )
    .await;

    let frequency: Map<String, Value> = after_sow["sow_stores"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| (entry["code"].as_str().unwrap().to_string(), json!(2)))
        .collect();
    submit(app, id, json!({"block": "block1_s4a", "frequency": frequency})).await;
    submit(app, id, json!({"block": "block1_s5", "switched_out_any": 0})).await;
    submit(app, id, json!({"block": "block1_s6", "income_band": 4})).await;
    submit(app, id, json!({"block": "block1_s7", "age_cohort": 3})).await
}

async fn household(app: &TestApp, id: &str) -> Value {
    submit(app, id, json!({"block": "block1_s8", "household_type": 2})).await
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup().await;
    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "gss-sv");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_init_detects_device_and_rejects_duplicates() {
    let app = setup().await;
    let (status, body) = post(
        &app,
        "/api/survey/init",
        json!({"respondent_id": "panel-1", "panel_source": "dynata", "phase": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["current_block"], "consent");
    assert_eq!(body["device_type"], "mobile");

    let record = get_respondent(&app.pool, "panel-1").await.unwrap();
    assert_eq!(record.panel_source, "dynata");
    assert_eq!(record.phase, 2);

    let (status, body) = post(&app, "/api/survey/init", json!({"respondent_id": "panel-1"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = post(&app, "/api/survey/init", json!({"phase": 3})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_init_without_id_generates_one() {
    let app = setup().await;
    let (status, body) = post(&app, "/api/survey/init", json!({})).await;
    assert_eq!(status, StatusCode::CREATED);

    let id = body["respondent_id"].as_str().unwrap();
    let record = get_respondent(&app.pool, id).await.unwrap();
    assert_eq!(record.panel_source, "direct");
    assert_eq!(record.phase, 1);
}

#[tokio::test]
async fn test_unknown_respondent_is_not_found() {
    let app = setup().await;
    let (status, body) = get(&app, "/api/survey/ghost/progress").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_out_of_order_and_invalid_submissions() {
    let app = setup().await;
    post(&app, "/api/survey/init", json!({"respondent_id": "order-1"})).await;

    let (status, _) = post(
        &app,
        "/api/survey/order-1/submit",
        json!({"block": "block1_s2", "grocery_decisionmaker": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    submit(&app, "order-1", json!({"block": "consent"})).await;
    let (status, body) = post(
        &app,
        "/api/survey/order-1/submit",
        json!({"block": "block1_s1", "zip_code": "abc"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = post(&app, "/api/survey/order-1/submit", json!({"block": "block99"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app,
        "/api/survey/order-1/submit",
        json!({"block": "block1_s1", "zip_cod": "50010"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Rejected submissions leave the cursor where it was
    let (_, progress) = get(&app, "/api/survey/order-1/progress").await;
    assert_eq!(progress["current_block"], "block1_s1");
}

#[tokio::test]
async fn test_zip_outside_trade_area_terminates() {
    let app = setup().await;
    post(&app, "/api/survey/init", json!({"respondent_id": "zip-1"})).await;
    submit(&app, "zip-1", json!({"block": "consent"})).await;

    let body = submit(&app, "zip-1", json!({"block": "block1_s1", "zip_code": "90210"})).await;
    assert_eq!(body["current_block"], "terminated");
    assert_eq!(body["termination_point"], "S1");
    assert!(body["message"].as_str().unwrap().starts_with("Thank you"));

    // Terminal records accept nothing further
    let (status, _) = post(
        &app,
        "/api/survey/zip-1/submit",
        json!({"block": "block1_s1", "zip_code": "50010"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_zip_lookup_endpoint() {
    let app = setup().await;
    let (status, body) = post(&app, "/api/zip-lookup", json!({"zip_code": "50010"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"valid": true, "dma": "Des Moines-Ames", "state": "IA"}));

    let (_, body) = post(&app, "/api/zip-lookup", json!({"zip_code": "1234"})).await;
    assert_eq!(body, json!({"valid": false}));
}

#[tokio::test]
async fn test_client_termination() {
    let app = setup().await;
    post(&app, "/api/survey/init", json!({"respondent_id": "term-1"})).await;

    let (status, _) = post(
        &app,
        "/api/survey/term-1/terminate",
        json!({"reason": "bored"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &app,
        "/api/survey/term-1/terminate",
        json!({"reason": "S7", "answers": {"age_cohort": 1}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["termination_point"], "S7");

    let record = get_respondent(&app.pool, "term-1").await.unwrap();
    assert_eq!(record.completion_status, CompletionStatus::Terminated);
    assert_eq!(record.answer_i64("age_cohort"), Some(1));
}

#[tokio::test]
async fn test_full_survey_round_trip() {
    let app = setup().await;
    let id = "e2e-1";

    drive_to_household(
        &app,
        id,
        &[("fareway", 6), ("hyvee", 6), ("aldi", 3)],
        json!({"fareway": 70, "hyvee": 20}),
    )
    .await;
    let progress = household(&app, id).await;
    assert_eq!(progress["current_block"], "block2");
    assert_eq!(progress["segment"], "primary_shopper");
    assert_eq!(progress["assigned_retailers"], json!(["fareway", "hyvee"]));

    submit(
        &app,
        id,
        json!({"block": "block2", "ratings": [
            {"retailer": "fareway", "score": 9, "verbatim": "Friendly staff and fresh meat"},
            {"retailer": "hyvee", "score": 7, "verbatim": "Good selection overall"}
        ]}),
    )
    .await;
    submit(&app, id, json!({"block": "block3_k1", "importance": attributes(4)})).await;
    submit(
        &app,
        id,
        json!({"block": "block3_k2", "performance": {"fareway": attributes(5), "hyvee": attributes(3)}}),
    )
    .await;

    let unchanged = json!({"dir": 2});
    submit(
        &app,
        id,
        json!({"block": "block4", "stores": [
            {"store": "fareway", "retro": {"dir": 1, "reason": 2}, "fwd": unchanged},
            {"store": "hyvee", "retro": unchanged, "fwd": {"dir": 3, "reason": 6, "reason_text": "Too far away"}}
        ]}),
    )
    .await;
    submit(
        &app,
        id,
        json!({
            "block": "block5",
            "churn_risk_reason": 1,
            "fareway_improve_verbatim": "Longer opening hours",
            "channel_current": 1,
            "channel_change": 2
        }),
    )
    .await;
    submit(
        &app,
        id,
        json!({"block": "block6", "freq_total": 3, "freq_fareway": 2, "avg_basket": 3, "trip_trend": 2}),
    )
    .await;
    submit(
        &app,
        id,
        json!({
            "block": "block7",
            "budget_trend": 2,
            "macro_response": 1,
            "tradedowns": ["tradedown_none"],
            "best_value": ["fareway"],
            "price_raised": ["hyvee"],
            "price_stable": ["fareway", "aldi"]
        }),
    )
    .await;
    let done = submit(&app, id, json!({"block": "block8", "gender": 1})).await;
    assert_eq!(done["current_block"], "complete");
    assert_eq!(done["completion_status"], "complete");
    assert_eq!(done["progress"], 1.0);

    let record = get_respondent(&app.pool, id).await.unwrap();
    assert_eq!(record.completion_status, CompletionStatus::Complete);
    let end = record.end_timestamp.unwrap();
    let elapsed = (end - record.start_timestamp).num_seconds();
    assert!((record.duration_seconds.unwrap() - elapsed).abs() <= 1);
    assert_eq!(record.answer_i64("qc_speeder"), Some(1));
    assert_eq!(record.answer_i64("qc_straightliner_k1"), Some(1));
    assert_eq!(record.answer_str("nps_r1_category"), Some("promoter"));
    assert_eq!(record.answer_i64("sow_fwd_store2_reason_dec"), Some(6));
    assert_eq!(record.answer_i64("tradedown_count"), Some(0));
    assert_eq!(record.answer_str("nps_r1_store_name"), Some("Fareway"));
}

#[tokio::test]
async fn test_secondary_shopper_rates_target_brand_second() {
    let app = setup().await;
    drive_to_household(
        &app,
        "sec-1",
        &[("fareway", 6), ("hyvee", 6), ("aldi", 6), ("kroger", 6)],
        json!({"hyvee": 50, "fareway": 10, "aldi": 20, "kroger": 10}),
    )
    .await;
    let progress = household(&app, "sec-1").await;

    assert_eq!(progress["segment"], "secondary_shopper");
    let assigned = progress["assigned_retailers"].as_array().unwrap();
    assert_eq!(assigned.len(), 3);
    assert_eq!(assigned[0], "hyvee");
    assert_eq!(assigned[1], "fareway");
    assert_ne!(assigned[2], "hyvee");
    assert_ne!(assigned[2], "fareway");
}

#[tokio::test]
async fn test_last_quota_place_then_quota_full() {
    let app = setup().await;
    sqlx::query("UPDATE segment_quotas SET current_count = 2999 WHERE segment = 'primary_shopper'")
        .execute(&app.pool)
        .await
        .unwrap();

    for id in ["quota-a", "quota-b"] {
        drive_to_household(
            &app,
            id,
            &[("fareway", 6), ("hyvee", 5)],
            json!({"fareway": 90}),
        )
        .await;
    }

    let first = household(&app, "quota-a").await;
    assert_eq!(first["current_block"], "block2");
    assert_eq!(
        get_quota(&app.pool, Segment::PrimaryShopper).await.unwrap().current_count,
        3000
    );

    let second = household(&app, "quota-b").await;
    assert_eq!(second["current_block"], "terminated");
    assert_eq!(second["termination_point"], "quota_full");
    assert!(second["message"].as_str().unwrap().contains("enough responses"));
    assert_eq!(
        get_quota(&app.pool, Segment::PrimaryShopper).await.unwrap().current_count,
        3000
    );

    // The refused respondent keeps the household answer given before the gate
    let record = get_respondent(&app.pool, "quota-b").await.unwrap();
    assert_eq!(record.answer_i64("household_type"), Some(2));
    assert!(!record.quota_admitted);
}

/// Fill ledger whose every call fails
struct UnavailableLedger;

#[async_trait]
impl FillLedger for UnavailableLedger {
    async fn take_least_filled(&self, _candidates: &[String]) -> gss_common::Result<Option<String>> {
        Err(gss_common::Error::Internal("ledger offline".to_string()))
    }

    async fn record_fill(&self, _retailer: &str) -> gss_common::Result<()> {
        Err(gss_common::Error::Internal("ledger offline".to_string()))
    }
}

#[tokio::test]
async fn test_fill_ledger_failure_keeps_primary_store() {
    let base = setup().await;
    let app = TestApp {
        router: build_router(AppState::with_ledger(base.pool.clone(), Arc::new(UnavailableLedger))),
        pool: base.pool,
        _dir: base._dir,
    };

    drive_to_household(
        &app,
        "ledger-1",
        &[("fareway", 6), ("hyvee", 6), ("aldi", 5)],
        json!({"fareway": 70, "hyvee": 20}),
    )
    .await;
    let progress = household(&app, "ledger-1").await;

    assert_eq!(progress["current_block"], "block2");
    assert_eq!(progress["assigned_retailers"], json!(["fareway"]));
}

#[tokio::test]
async fn test_progress_resumes_with_context() {
    let app = setup().await;
    drive_to_household(
        &app,
        "resume-1",
        &[("fareway", 2), ("hyvee", 6), ("aldi", 6)],
        json!({"hyvee": 60, "aldi": 30}),
    )
    .await;

    let (status, body) = get(&app, "/api/survey/resume-1/progress").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_block"], "block1_s8");
    assert_eq!(body["completion_status"], "in_progress");
    assert_eq!(body["segment"], "aware_non_customer");
    assert_eq!(body["stores_last_3m"], json!(["hyvee", "aldi"]));
    assert_eq!(body["sow_stores"][0]["code"], "hyvee");
    assert_eq!(body["progress"], 0.2);
}

async fn total_fills(pool: &SqlitePool) -> i64 {
    list_fill_counts(pool).await.unwrap().iter().map(|f| f.count).sum()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_household_submit_assigns_once() {
    let app = Arc::new(setup().await);
    let ids: Vec<String> = (0..6).map(|i| format!("dup-{}", i)).collect();
    for id in &ids {
        drive_to_household(
            &app,
            id,
            &[("fareway", 6), ("hyvee", 6), ("aldi", 5), ("kroger", 5)],
            json!({"fareway": 60, "hyvee": 30}),
        )
        .await;
    }
    let fills_before = total_fills(&app.pool).await;

    let mut tasks = JoinSet::new();
    for id in ids.iter().chain(ids.iter()) {
        let app = Arc::clone(&app);
        let uri = format!("/api/survey/{}/submit", id);
        tasks.spawn(async move {
            post(&app, &uri, json!({"block": "block1_s8", "household_type": 2})).await.0
        });
    }

    let mut statuses = Vec::new();
    while let Some(result) = tasks.join_next().await {
        statuses.push(result.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), ids.len());
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), ids.len());

    let mut slots = 0;
    for id in &ids {
        let record = get_respondent(&app.pool, id).await.unwrap();
        assert_eq!(record.current_block, "block2");
        assert_eq!(record.nps_r1_store.as_deref(), Some("fareway"));
        slots += record.assigned_retailers().len() as i64;
    }
    // One counter increment per assigned slot, none from the losing submission
    assert_eq!(slots, 3 * ids.len() as i64);
    assert_eq!(total_fills(&app.pool).await - fills_before, slots);
    assert_eq!(
        get_quota(&app.pool, Segment::PrimaryShopper).await.unwrap().current_count,
        ids.len() as i64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_respondents_share_quota_and_fills() {
    let app = Arc::new(setup().await);
    sqlx::query("UPDATE segment_quotas SET current_count = 2995 WHERE segment = 'primary_shopper'")
        .execute(&app.pool)
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let app = Arc::clone(&app);
        tasks.spawn(async move {
            let id = format!("crowd-{}", i);
            drive_to_household(
                &app,
                &id,
                &[("fareway", 6), ("hyvee", 6), ("aldi", 5)],
                json!({"fareway": 50, "hyvee": 40}),
            )
            .await;
            household(&app, &id).await
        });
    }

    let mut admitted = 0;
    let mut quota_full = 0;
    while let Some(result) = tasks.join_next().await {
        let progress = result.unwrap();
        match progress["current_block"].as_str() {
            Some("block2") => admitted += 1,
            Some("terminated") => {
                assert_eq!(progress["termination_point"], "quota_full");
                quota_full += 1;
            }
            other => panic!("unexpected block after household: {:?}", other),
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(quota_full, 3);
    assert_eq!(
        get_quota(&app.pool, Segment::PrimaryShopper).await.unwrap().current_count,
        3000
    );
    // Fareway is every admitted respondent's R1 and nobody else's draw
    let fareway = list_fill_counts(&app.pool)
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.retailer_code == "fareway")
        .unwrap();
    assert_eq!(fareway.count, 5);
}
