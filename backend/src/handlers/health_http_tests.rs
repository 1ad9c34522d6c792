//! HTTP tests for the health and metrics endpoints.

use actix_web::{test, web, App};

use crate::config::Config;
use crate::handlers::{healthz, metrics};
use crate::services::CounterStore;
use crate::AppState;

fn dead_store_state(redis_required_for_health: bool) -> AppState {
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
        redis_required_for_health,
        fallback_global_rps: 45,
        fallback_route_rps: 5,
    };
    let store = CounterStore::with_prefix("redis://127.0.0.1:1/", "rategate_dead")
        .expect("url should parse");
    AppState::with_store(config, store)
}

#[actix_web::test]
async fn healthz_fails_when_the_store_is_required_and_down() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(dead_store_state(true)))
            .route("/healthz", web::get().to(healthz)),
    )
    .await;

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/healthz").to_request()).await;
    assert_eq!(response.status(), 503);

    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["redis"], "down");
}

#[actix_web::test]
async fn healthz_tolerates_a_down_store_when_not_required() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(dead_store_state(false)))
            .route("/healthz", web::get().to(healthz)),
    )
    .await;

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/healthz").to_request()).await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["redis"], "down");
}

#[actix_web::test]
async fn metrics_render_as_prometheus_text() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(dead_store_state(true)))
            .route("/metrics", web::get().to(metrics)),
    )
    .await;

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(response.status(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = test::read_body(response).await;
    let text = std::str::from_utf8(&body).expect("metrics body should be utf-8");
    assert!(text.contains("rategate_request_token_total"));
    assert!(text.contains("rategate_guardrail_trips_total"));
}
