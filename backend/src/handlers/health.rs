//! Health and metrics endpoints

use actix_web::http::header;
use actix_web::{web, HttpResponse};

use crate::AppState;

/// GET /healthz
pub async fn healthz(state: web::Data<AppState>) -> HttpResponse {
    let status = state.health.check().await;
    if status.ok {
        HttpResponse::Ok().json(status)
    } else {
        HttpResponse::ServiceUnavailable().json(status)
    }
}

/// GET /metrics
pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        ))
        .body(state.metrics.render())
}
