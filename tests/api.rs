//! End-to-end tests through the Axum router (no network, `oneshot` only).

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use decision_engine::{
    auth::{ApiKey, API_KEY_HEADER},
    config::{ConfigStore, DecisionConfig},
    models::examples,
    predictor::QuotedPredictor,
    rationale::HeuristicRationale,
    routes::router,
    state::AppState,
};

fn app_with_key(api_key: ApiKey) -> Router {
    let store = ConfigStore::new(DecisionConfig::default()).unwrap();
    let state = AppState::new(store, Arc::new(QuotedPredictor), Some(Arc::new(HeuristicRationale)))
        .with_api_key(api_key);
    router(Arc::new(state))
}

fn app() -> Router {
    app_with_key(ApiKey::disabled())
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with_key(app, method, uri, body, None).await
}

async fn send_with_key(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    api_key: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_bull_entry_allows() {
    let request = serde_json::to_value(examples::bull_entry_request()).unwrap();
    let (status, body) = send(app(), "POST", "/decide/enter", Some(request)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["allow"], true, "{body}");
    assert_eq!(body["side"], "long");
    assert!((body["alloc_equity_pct"].as_f64().unwrap() - 0.74).abs() < 1e-9);
    assert_eq!(body["exec"]["type"], "post_only_limit_or_mpo");
    assert!(!body["reason_chain"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_vol_reject_denies() {
    let request = serde_json::to_value(examples::vol_reject_entry_request()).unwrap();
    let (status, body) = send(app(), "POST", "/decide/enter", Some(request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allow"], false);
    assert!(body["side"].is_null());
    assert!(body["alloc_equity_pct"].is_null());
    assert_eq!(body["reason_chain"][0], "✗ Gate FAILURE: 1/4 gates failed");
}

#[tokio::test]
async fn test_invalid_symbol_is_bad_request() {
    let mut request = serde_json::to_value(examples::bull_entry_request()).unwrap();
    request["symbol"] = json!("btc-usd");
    let (status, body) = send(app(), "POST", "/decide/enter", Some(request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("btc-usd"));
}

#[tokio::test]
async fn test_exit_example_reduces() {
    let request = serde_json::to_value(examples::exit_request()).unwrap();
    let (status, body) = send(app(), "POST", "/decide/exit", Some(request)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["action"], "reduce");
    let reduce = body["reduce_pct"].as_f64().unwrap();
    assert!(reduce > 0.5 && reduce <= 1.0, "reduce_pct={reduce}");
}

#[tokio::test]
async fn test_exit_scenarios_without_body() {
    let (status, body) = send(app(), "POST", "/decide/exit/test", None).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scenarios_tested"], 5);
    assert_eq!(body["results"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_enter_scenarios() {
    let app = app();
    let (status, body) = send(app.clone(), "POST", "/decide/enter/test", None).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scenarios_tested"], 3);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["scenario"], "Bull Scenario");
    assert_eq!(results[0]["result"]["allow"], true);
    assert_eq!(results[1]["result"]["side"], "short");
    assert_eq!(results[2]["result"]["allow"], false);
    assert!(results[2]["result"]["allocation"].is_null());
    assert_eq!(results[2]["result"]["reason_count"], 5);

    // scenario runs stay out of the live counters
    let (_, metrics) = send(app, "GET", "/metrics", None).await;
    assert_eq!(metrics["entry_requests_total"], 0);
    assert!(metrics["latency_seconds"]["decision"].is_null());
}

#[tokio::test]
async fn test_exit_scenarios_skip_live_latency() {
    let app = app();
    send(app.clone(), "POST", "/decide/exit/test", None).await;
    let (_, metrics) = send(app, "GET", "/metrics", None).await;
    assert!(metrics["latency_seconds"]["exit_decision"].is_null());
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = app_with_key(ApiKey::new("s3cret"));
    let request = serde_json::to_value(examples::bull_entry_request()).unwrap();

    let (status, body) = send(app.clone(), "POST", "/decide/enter", Some(request.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], false);

    let (status, _) = send_with_key(app.clone(), "POST", "/decide/enter", Some(request.clone()), Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send_with_key(app.clone(), "POST", "/decide/enter", Some(request), Some("s3cret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allow"], true);

    let (status, _) = send(app.clone(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(app, "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_count_requests() {
    let app = app();
    let request = serde_json::to_value(examples::bull_entry_request()).unwrap();
    send(app.clone(), "POST", "/decide/enter", Some(request)).await;

    let (status, body) = send(app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry_requests_total"], 1);
    assert_eq!(body["entry_approvals_total"], 1);
    assert_eq!(body["latency_seconds"]["decision"]["count"], 1);
}

#[tokio::test]
async fn test_reload_without_source_is_rejected() {
    let app = app();
    let (status, body) = send(app.clone(), "POST", "/config/reload", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["ok"], false);

    let (status, body) = send(app, "GET", "/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["latency_slo_ms"], 70);
}
