//! Observation report handlers

use std::sync::atomic::Ordering;

use actix_web::{web, HttpResponse};

use crate::models::ObservationReport;
use crate::services::Metrics;
use crate::AppState;

/// POST /report_result
///
/// Observations are advisory. This endpoint always answers `{"ok": true}`
/// so clients never retry a report; ingestion failures only show up in the
/// internal counters.
pub async fn report_result(
    state: web::Data<AppState>,
    body: web::Json<ObservationReport>,
) -> HttpResponse {
    let report = body.into_inner();
    record_report_metrics(&state.metrics, &report);

    match state.observations.apply(&report).await {
        Ok(outcome) => {
            state
                .metrics
                .observations_applied
                .fetch_add(1, Ordering::Relaxed);
            if outcome.guardrail_tripped {
                state.metrics.guardrail_trips.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    group = %report.group_id,
                    invalid_count = outcome.invalid_count,
                    "invalid-request guardrail engaged"
                );
            }
        }
        Err(err) => {
            state.metrics.redis_errors.fetch_add(1, Ordering::Relaxed);
            state
                .metrics
                .observations_dropped
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %err, "dropped observation, counter store unreachable");
        }
    }

    HttpResponse::Ok().json(serde_json::json!({ "ok": true }))
}

fn record_report_metrics(metrics: &Metrics, report: &ObservationReport) {
    if report.status_code == 429 {
        let counter = match report.x_ratelimit_scope.as_deref() {
            Some("global") => &metrics.observed_429_global,
            Some("user") => &metrics.observed_429_user,
            Some("shared") => &metrics.observed_429_shared,
            _ => &metrics.observed_429_unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    match report.status_code {
        401 => {
            metrics.invalid_401.fetch_add(1, Ordering::Relaxed);
        }
        403 => {
            metrics.invalid_403.fetch_add(1, Ordering::Relaxed);
        }
        429 if report.counts_toward_invalid_limit() => {
            metrics.invalid_429.fetch_add(1, Ordering::Relaxed);
        }
        _ => {}
    }
}

/// Configure report routes
pub fn configure_report_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/report_result", web::post().to(report_result));
}
