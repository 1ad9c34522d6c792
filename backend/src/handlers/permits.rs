//! Permit handlers

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use actix_web::{web, HttpResponse};
use tokio::time::sleep;

use crate::error::AppError;
use crate::models::{PermitReason, PermitRequest, PermitResponse};
use crate::services::store::unix_ms;
use crate::services::InflightGuard;
use crate::AppState;

struct Decision {
    granted: bool,
    retry_after_ms: u64,
    reason: PermitReason,
}

/// POST /request_token
///
/// Runs the atomic admission decision. A denial whose retry horizon fits
/// inside the caller's `max_wait_ms` is waited out server-side, then decided
/// one more time before answering.
pub async fn request_token(
    state: web::Data<AppState>,
    body: web::Json<PermitRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    validate(&request)?;

    let _inflight = InflightGuard::new(state.metrics.clone());
    let started_ms = unix_ms();

    let mut decision = decide_with_policy(&state, &request).await;

    if !decision.granted
        && request.max_wait_ms > 0
        && decision.retry_after_ms <= request.max_wait_ms
    {
        let wait_ms = decision.retry_after_ms.min(request.max_wait_ms);
        state.metrics.queue_depth.fetch_add(1, Ordering::Relaxed);
        sleep(Duration::from_millis(wait_ms)).await;
        state.metrics.queue_depth.fetch_sub(1, Ordering::Relaxed);
        decision = decide_with_policy(&state, &request).await;
    }

    let now = unix_ms();
    state
        .metrics
        .observe_request_wait_ms(now.saturating_sub(started_ms));

    let response = if decision.granted {
        state.metrics.permits_granted.fetch_add(1, Ordering::Relaxed);
        PermitResponse {
            granted: true,
            not_before_unix_ms: now,
            retry_after_ms: None,
            lease_id: Some(uuid::Uuid::new_v4().to_string()),
            reason: decision.reason,
        }
    } else {
        if decision.reason == PermitReason::ScsUnavailable {
            state.metrics.permit_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            state.metrics.permits_denied.fetch_add(1, Ordering::Relaxed);
        }
        let retry_after_ms = decision.retry_after_ms.max(state.config.min_retry_ms);
        PermitResponse {
            granted: false,
            not_before_unix_ms: now.saturating_add(retry_after_ms),
            retry_after_ms: Some(retry_after_ms),
            lease_id: None,
            reason: decision.reason,
        }
    };

    Ok(HttpResponse::Ok().json(response))
}

/// Run the decision script, applying the configured store-failure policy.
async fn decide_with_policy(state: &AppState, request: &PermitRequest) -> Decision {
    let started = Instant::now();
    match state.permits.decide(request).await {
        Ok(decision) => {
            state
                .metrics
                .observe_redis_latency_ms(started.elapsed().as_millis() as u64);
            Decision {
                granted: decision.granted,
                retry_after_ms: decision.retry_after_ms,
                reason: decision.reason,
            }
        }
        Err(err) => {
            state.metrics.redis_errors.fetch_add(1, Ordering::Relaxed);
            if state.config.fail_open {
                tracing::warn!(error = %err, "counter store unreachable, granting under local pacing");
                state
                    .fallback_pacer
                    .acquire(
                        &request.identity,
                        &request.method,
                        &request.route,
                        &request.major_parameter,
                    )
                    .await;
                state.metrics.fallback_grants.fetch_add(1, Ordering::Relaxed);
                Decision {
                    granted: true,
                    retry_after_ms: 0,
                    reason: PermitReason::ScsUnavailable,
                }
            } else {
                tracing::warn!(error = %err, "counter store unreachable, denying");
                Decision {
                    granted: false,
                    retry_after_ms: state.config.min_retry_ms,
                    reason: PermitReason::ScsUnavailable,
                }
            }
        }
    }
}

fn validate(request: &PermitRequest) -> Result<(), AppError> {
    if request.identity.trim().is_empty() {
        return Err(AppError::Validation(
            "discord_identity must not be empty".to_string(),
        ));
    }
    if request.method.trim().is_empty() || request.route.trim().is_empty() {
        return Err(AppError::Validation(
            "method and route must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Configure permit routes
pub fn configure_permit_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/request_token", web::post().to(request_token));
}
