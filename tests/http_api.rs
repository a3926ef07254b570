use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use tower::ServiceExt;

use creditgate::credits::{CreditGate, LedgerStore, SqliteLedger, UserId, DEFAULT_CREDITS};
use creditgate::http::{build_router, AppState};
use creditgate::vision::{MockVisionClient, VisionOutcome, VisionResult, VisionService};

const API_KEY: &str = "test-api-key";
const IMAGE: &str = "/9j/4AAQSkZJRgABAQAAAQABAAD";

struct TestApp {
    router: Router,
    gate: CreditGate,
    ledger: Arc<SqliteLedger>,
    vision: MockVisionClient,
}

fn test_app_with(vision: MockVisionClient, api_key: Option<&str>) -> TestApp {
    test_app_limited(vision, api_key, 1024 * 1024)
}

fn test_app_limited(vision: MockVisionClient, api_key: Option<&str>, max_body_bytes: usize) -> TestApp {
    let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
    let gate = CreditGate::new(ledger.clone());
    let state = AppState::new(
        gate.clone(),
        Arc::new(vision.clone()),
        api_key.map(str::to_string),
    );

    TestApp {
        router: build_router(state, max_body_bytes),
        gate,
        ledger,
        vision,
    }
}

/// Vision backend that crashes on every call.
struct CrashingVision;

#[async_trait]
impl VisionService for CrashingVision {
    async fn describe(&self, _lang: &str, _image_base64: &str) -> VisionResult<VisionOutcome> {
        panic!("vision backend crashed");
    }
}

fn test_app(vision: MockVisionClient) -> TestApp {
    test_app_with(vision, Some(API_KEY))
}

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

fn credits_request(user_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::get("/credits").header("X-Api-Key", API_KEY);
    if let Some(user_id) = user_id {
        builder = builder.header("X-User-Id", user_id);
    }
    builder.body(Body::empty()).unwrap()
}

fn analyze_request(user_id: &str, body: Value) -> Request<Body> {
    Request::post("/analyze/image")
        .header("X-Api-Key", API_KEY)
        .header("X-User-Id", user_id)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn valid_body() -> Value {
    json!({ "lang": "en", "image": IMAGE })
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_unknown_user_has_zero_credits_and_no_entry() {
    let app = test_app(MockVisionClient::new());

    for _ in 0..2 {
        let (status, body) = send(&app.router, credits_request(Some("u1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "credits": 0 }));
    }

    assert_eq!(app.ledger.get_balance(&user("u1")).await.unwrap(), None);
}

#[tokio::test]
async fn test_credits_reflect_spent_allowance() {
    let app = test_app(MockVisionClient::new());

    let (status, _) = send(&app.router, analyze_request("u1", valid_body())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, credits_request(Some("u1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "credits": 9 }));
}

#[tokio::test]
async fn test_missing_user_id_is_rejected() {
    let app = test_app(MockVisionClient::new());

    let (status, body) = send(&app.router, credits_request(None)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Missing required user ID" }));
}

#[tokio::test]
async fn test_invalid_api_key_is_rejected_before_body_validation() {
    let app = test_app(MockVisionClient::new());

    let missing_key = Request::post("/analyze/image")
        .header("X-User-Id", "u1")
        .body(Body::from("garbage"))
        .unwrap();
    let (status, body) = send(&app.router, missing_key).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Invalid API key" }));

    let wrong_key = Request::get("/credits")
        .header("X-Api-Key", "nope")
        .header("X-User-Id", "u1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, wrong_key).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Invalid API key" }));
}

#[tokio::test]
async fn test_api_key_not_required_when_unconfigured() {
    let app = test_app_with(MockVisionClient::new(), None);

    let request = Request::get("/credits")
        .header("X-User-Id", "u1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "credits": 0 }));
}

#[tokio::test]
async fn test_successful_analysis_spends_one_credit() {
    let app = test_app(MockVisionClient::new());

    let (status, body) = send(&app.router, analyze_request("u1", json!({ "lang": "de", "image": IMAGE }))).await;

    let sample = MockVisionClient::sample_description();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], sample.name);
    assert_eq!(body["description"], sample.description);
    assert_eq!(body["funFacts"], json!(sample.fun_facts));
    assert_eq!(app.gate.balance(&user("u1")).await.unwrap(), 9);
    assert_eq!(app.vision.languages(), vec!["de"]);
}

#[tokio::test]
async fn test_refusal_still_costs_a_credit() {
    let vision = MockVisionClient::new().with_outcome(VisionOutcome::Refused("no".to_string()));
    let app = test_app(vision);

    let (status, body) = send(&app.router, analyze_request("u1", valid_body())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Image is not processable" }));
    assert_eq!(app.gate.balance(&user("u1")).await.unwrap(), 9);
}

#[tokio::test]
async fn test_unidentified_image() {
    let app = test_app(MockVisionClient::new().with_outcome(VisionOutcome::Unidentified));

    let (status, body) = send(&app.router, analyze_request("u1", valid_body())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Image cannot be identified" }));
}

#[tokio::test]
async fn test_oversized_image() {
    let app = test_app(MockVisionClient::new().with_image_too_large());

    let (status, body) = send(&app.router, analyze_request("u1", valid_body())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Image too big" }));
    assert_eq!(app.gate.balance(&user("u1")).await.unwrap(), 9);
}

#[tokio::test]
async fn test_collaborator_failure_is_opaque_500() {
    let app = test_app(MockVisionClient::new().with_failure("upstream exploded at /srv/secret"));

    let (status, body) = send(&app.router, analyze_request("u1", valid_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));
    assert_eq!(app.gate.balance(&user("u1")).await.unwrap(), 9);
}

#[tokio::test]
async fn test_invalid_payload_never_costs_credit() {
    let app = test_app(MockVisionClient::new());

    let cases = [
        (json!({ "lang": "en" }), "Missing required fields"),
        (json!({ "image": IMAGE }), "Missing required fields"),
        (json!({ "lang": "", "image": IMAGE }), "Missing required fields"),
        (json!({}), "No data provided"),
    ];

    for (payload, expected) in cases {
        let (status, body) = send(&app.router, analyze_request("u1", payload)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, json!({ "error": expected }));
    }

    assert_eq!(app.ledger.get_balance(&user("u1")).await.unwrap(), None);

    app.gate.set_balance(&user("u2"), 3).await.unwrap();
    let (status, _) = send(&app.router, analyze_request("u2", json!({ "lang": "en" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.gate.balance(&user("u2")).await.unwrap(), 3);
    assert_eq!(app.vision.get_call_count(), 0);
}

#[tokio::test]
async fn test_empty_balance_returns_payment_required() {
    let app = test_app(MockVisionClient::new());
    app.gate.set_balance(&user("u1"), 0).await.unwrap();

    let (status, body) = send(&app.router, analyze_request("u1", valid_body())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body, json!({ "error": "No more credits left" }));
    assert_eq!(app.gate.balance(&user("u1")).await.unwrap(), 0);
    assert_eq!(app.vision.get_call_count(), 0);
}

#[tokio::test]
async fn test_allowance_exhausts_after_ten_requests() {
    let app = test_app(MockVisionClient::new());

    for expected in (0..DEFAULT_CREDITS).rev() {
        let (status, _) = send(&app.router, analyze_request("u1", valid_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.gate.balance(&user("u1")).await.unwrap(), expected);
    }

    let (status, _) = send(&app.router, analyze_request("u1", valid_body())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(app.vision.get_call_count(), DEFAULT_CREDITS as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_exceed_allowance() {
    let app = test_app(MockVisionClient::new());

    let responses = join_all(
        (0..16).map(|_| send(&app.router, analyze_request("burst", valid_body()))),
    )
    .await;

    let ok = responses.iter().filter(|(s, _)| *s == StatusCode::OK).count();
    let denied = responses
        .iter()
        .filter(|(s, _)| *s == StatusCode::PAYMENT_REQUIRED)
        .count();

    assert_eq!(ok, 10);
    assert_eq!(denied, 6);
    assert_eq!(app.gate.balance(&user("burst")).await.unwrap(), 0);
    assert_eq!(app.vision.get_call_count(), 10);
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = test_app(MockVisionClient::new());

    let request = Request::get("/nope").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Not found" }));
}

#[tokio::test]
async fn test_index_reports_timestamp() {
    let app = test_app(MockVisionClient::new());

    let request = Request::get("/").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn test_body_over_limit_is_image_too_big() {
    let app = test_app_limited(MockVisionClient::new(), Some(API_KEY), 1024);
    let oversized = json!({ "lang": "en", "image": "A".repeat(4096) });

    let (status, body) = send(&app.router, analyze_request("u1", oversized.clone())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Image too big" }));
    assert_eq!(app.ledger.get_balance(&user("u1")).await.unwrap(), None);

    app.gate.set_balance(&user("u2"), 3).await.unwrap();
    let (status, _) = send(&app.router, analyze_request("u2", oversized)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.gate.balance(&user("u2")).await.unwrap(), 3);
    assert_eq!(app.vision.get_call_count(), 0);

    let (status, _) = send(&app.router, analyze_request("u2", valid_body())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_handler_panic_is_opaque_500() {
    let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
    let gate = CreditGate::new(ledger);
    let state = AppState::new(gate.clone(), Arc::new(CrashingVision), Some(API_KEY.to_string()));
    let router = build_router(state, 1024 * 1024);

    let (status, body) = send(&router, analyze_request("u1", valid_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));

    let (status, body) = send(&router, credits_request(Some("u1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "credits": DEFAULT_CREDITS - 1 }));
    assert_eq!(gate.active_locks(), 0);
}

#[tokio::test]
async fn test_wrong_method_returns_json_405() {
    let app = test_app(MockVisionClient::new());

    let request = Request::get("/analyze/image")
        .header("X-Api-Key", API_KEY)
        .header("X-User-Id", "u1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({ "error": "Method not allowed" }));

    let request = Request::delete("/credits").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({ "error": "Method not allowed" }));
    assert_eq!(app.ledger.get_balance(&user("u1")).await.unwrap(), None);
}
