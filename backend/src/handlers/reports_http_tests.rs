//! HTTP tests for the observation endpoint.

use std::sync::atomic::Ordering;

use actix_web::{test, web, App};
use serde_json::json;

use crate::config::Config;
use crate::handlers::configure_report_routes;
use crate::services::CounterStore;
use crate::AppState;

fn dead_store_state() -> AppState {
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        redis_url: String::new(),
        global_rps: 50,
        route_rps: 5,
        min_retry_ms: 50,
        counter_ttl_ms: 1500,
        invalid_threshold: 8000,
        guardrail_cooldown_ms: 30_000,
        fail_open: true,
        redis_required_for_health: true,
        fallback_global_rps: 45,
        fallback_route_rps: 5,
    };
    let store = CounterStore::with_prefix("redis://127.0.0.1:1/", "rategate_dead")
        .expect("url should parse");
    AppState::with_store(config, store)
}

fn report_body(status_code: u16, scope: Option<&str>) -> serde_json::Value {
    json!({
        "request_id": uuid::Uuid::new_v4().to_string(),
        "discord_identity": "bot-a",
        "group_id": "egress-1",
        "method": "GET",
        "route": "/gateway",
        "major_parameter": "",
        "status_code": status_code,
        "x_ratelimit_scope": scope,
        "observed_at_unix_ms": 1_700_000_000_000u64
    })
}

#[actix_web::test]
async fn reports_always_answer_ok_even_without_a_store() {
    let state = dead_store_state();
    let metrics = state.metrics.clone();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_report_routes),
    )
    .await;

    let request = test::TestRequest::post()
        .uri("/report_result")
        .set_json(report_body(401, None))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;

    assert_eq!(body["ok"], true);
    assert_eq!(metrics.observations_dropped.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.invalid_401.load(Ordering::Relaxed), 1);
}

#[actix_web::test]
async fn shared_scope_429_counts_as_shared_not_invalid() {
    let state = dead_store_state();
    let metrics = state.metrics.clone();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_report_routes),
    )
    .await;

    let request = test::TestRequest::post()
        .uri("/report_result")
        .set_json(report_body(429, Some("shared")))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;

    assert_eq!(body["ok"], true);
    assert_eq!(metrics.observed_429_shared.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.invalid_429.load(Ordering::Relaxed), 0);
}

#[actix_web::test]
async fn user_scope_429_counts_toward_invalid() {
    let state = dead_store_state();
    let metrics = state.metrics.clone();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_report_routes),
    )
    .await;

    let request = test::TestRequest::post()
        .uri("/report_result")
        .set_json(report_body(429, Some("user")))
        .to_request();
    let _body: serde_json::Value = test::call_and_read_body_json(&app, request).await;

    assert_eq!(metrics.observed_429_user.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.invalid_429.load(Ordering::Relaxed), 1);
}

#[actix_web::test]
async fn malformed_report_is_rejected() {
    let state = dead_store_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_report_routes),
    )
    .await;

    let request = test::TestRequest::post()
        .uri("/report_result")
        .set_json(json!({ "status_code": "not-a-number" }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert!(response.status().is_client_error());
}
