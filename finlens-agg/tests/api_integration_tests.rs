//! HTTP API integration tests for finlens-agg
//!
//! Router is driven in-process with `oneshot`; upstreams are fakes.

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use finlens_agg::config::ServiceSettings;
use finlens_agg::types::{Chamber, Endpoint, FetchError, GenerationHint, ReasoningEffort};
use finlens_common::events::EventBus;
use helpers::{fast_retry, test_pool, trade, FakeFeed, FakeFinancial, Fakes, ScriptedCompletion};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

/// Test helper: app over fakes and a temp database
async fn create_test_app(fakes: &Fakes) -> (Router, finlens_agg::AppState, tempfile::TempDir) {
    create_test_app_with(
        fakes,
        ServiceSettings {
            retry: fast_retry(),
            ..ServiceSettings::default()
        },
    )
    .await
}

async fn create_test_app_with(
    fakes: &Fakes,
    settings: ServiceSettings,
) -> (Router, finlens_agg::AppState, tempfile::TempDir) {
    let (dir, pool) = test_pool().await;
    let state = finlens_agg::AppState::new(pool, EventBus::new(100), fakes.providers(), &settings);
    let app = finlens_agg::build_router(state.clone());
    (app, state, dir)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let fakes = Fakes::new(FakeFinancial::new());
    let (app, _state, _dir) = create_test_app(&fakes).await;

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "finlens-agg");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["active_runs"], 0);
}

#[tokio::test]
async fn test_aggregate_endpoint_reports_statuses() {
    let fakes = Fakes::new(FakeFinancial::new().empty(Endpoint::Ratios));
    let (app, _state, _dir) = create_test_app(&fakes).await;

    let (status, body) = send(&app, get("/symbols/aapl/aggregate")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "AAPL");
    assert_eq!(body["statuses"]["profile"], "success");
    assert_eq!(body["statuses"]["ratios"], "empty");
    assert_eq!(body["values"]["ratios"], json!([]));
    assert_eq!(
        body["values"].as_object().unwrap().len(),
        body["statuses"].as_object().unwrap().len()
    );
}

#[tokio::test]
async fn test_aggregate_core_failure_is_bad_gateway() {
    let fakes = Fakes::new(
        FakeFinancial::new().failing(Endpoint::Profile, FetchError::NotAvailable("unknown".into())),
    );
    let (app, state, _dir) = create_test_app(&fakes).await;

    let (status, body) = send(&app, get("/symbols/ZZZZ/aggregate")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "UPSTREAM_UNAVAILABLE");
    assert!(state.last_error.read().await.is_some());
}

#[tokio::test]
async fn test_invalid_symbol_is_bad_request() {
    let fakes = Fakes::new(FakeFinancial::new());
    let (app, _state, _dir) = create_test_app(&fakes).await;

    let (status, body) = send(&app, get("/symbols/NOT%20A%20TICKER/aggregate")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(fakes.financial.calls().is_empty());
}

#[tokio::test]
async fn test_alternative_endpoint_sorted_by_date() {
    let fakes = Fakes::new(FakeFinancial::new())
        .with_feed(FakeFeed::new(
            "senate_trades",
            Chamber::Senate,
            Ok(vec![trade("Old Senator", "Senator", Some((2023, 6, 1)))]),
        ))
        .with_feed(FakeFeed::new(
            "house_trades",
            Chamber::House,
            Ok(vec![trade("New Rep", "Representative", Some((2024, 6, 1)))]),
        ));
    let (app, _state, _dir) = create_test_app(&fakes).await;

    let (status, body) = send(&app, get("/symbols/AAPL/alternative?client=tab-1&sort_by_date=true")).await;

    assert_eq!(status, StatusCode::OK);
    let records = body["congressional_trades"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["politician"], "New Rep");
    assert_eq!(records[0]["source"], "house_trades");
    assert_eq!(records[0]["position"], "Representative (House)");
    assert_eq!(records[1]["position"], "Senator (Senate)");
    assert_eq!(body["congressional_trades"]["status"], "success");
}

#[tokio::test]
async fn test_artifact_crud_round() {
    let fakes = Fakes::new(FakeFinancial::new());
    let (app, _state, _dir) = create_test_app(&fakes).await;

    let put = Request::builder()
        .method("PUT")
        .uri("/owners/alice/artifacts/reports/aapl")
        .header("content-type", "application/json")
        .body(Body::from(json!({"summary": "hi"}).to_string()))
        .unwrap();
    let (status, saved) = send(&app, put).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["updated"], false);
    let id = saved["artifact_id"].as_str().unwrap().to_string();

    let (status, listed) = send(&app, get("/owners/alice/artifacts/report")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["symbol"], "AAPL");

    let (status, fetched) = send(&app, get(&format!("/artifacts/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["payload"]["summary"], "hi");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/artifacts/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get(&format!("/artifacts/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_artifact_kind_is_bad_request() {
    let fakes = Fakes::new(FakeFinancial::new());
    let (app, _state, _dir) = create_test_app(&fakes).await;

    let (status, _) = send(&app, get("/owners/alice/artifacts/memos")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_prediction_created() {
    let reply = r#"Prediction: {"direction": "down", "confidence": "low"}"#;
    let fakes = Fakes::new(FakeFinancial::new()).with_completion(ScriptedCompletion::replying(reply));
    let (app, state, _dir) = create_test_app(&fakes).await;

    let post = Request::builder()
        .method("POST")
        .uri("/owners/alice/predictions/msft")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, post).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["kind"], "prediction");
    assert_eq!(body["symbol"], "MSFT");
    assert_eq!(body["payload"]["content"]["direction"], "down");
    let backfilled: Vec<&str> = body["backfilled"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(backfilled, vec!["price_target", "horizon", "rationale"]);

    assert_eq!(
        state
            .store
            .count("alice", finlens_agg::db::ArtifactKind::Prediction)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_generate_malformed_reply_is_bad_gateway() {
    let fakes = Fakes::new(FakeFinancial::new())
        .with_completion(ScriptedCompletion::replying("no structured answer today"));
    let (app, _state, _dir) = create_test_app(&fakes).await;

    let post = Request::builder()
        .method("POST")
        .uri("/owners/alice/reports/AAPL")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, post).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "MALFORMED_GENERATION");
}

#[tokio::test]
async fn test_configured_hint_reaches_completion_request() {
    let reply = r#"{"direction": "up"}"#;
    let fakes = Fakes::new(FakeFinancial::new()).with_completion(ScriptedCompletion::replying(reply));
    let settings = ServiceSettings {
        retry: fast_retry(),
        completion_hint: GenerationHint::Effort(ReasoningEffort::High),
        ..ServiceSettings::default()
    };
    let (app, _state, _dir) = create_test_app_with(&fakes, settings).await;

    let post = Request::builder()
        .method("POST")
        .uri("/owners/alice/predictions/AAPL")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, post).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        fakes.completion.hints(),
        vec![GenerationHint::Effort(ReasoningEffort::High)]
    );
}
