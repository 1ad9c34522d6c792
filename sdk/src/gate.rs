//! Admission gate
//!
//! Wraps every outbound call in the permit protocol: request a permit,
//! execute, report what the server answered. Denials are retried on the
//! arbiter's own schedule; an unreachable arbiter degrades the call to the
//! local pacer. Exactly one observation report is emitted per admitted
//! call, including when the executor itself fails.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::client::ArbiterApi;
use crate::error::Error;
use crate::pacer::{LocalPacer, PacerConfig};
use crate::types::{CallMeta, CallOutcome, ObservationReport, PermitRequest};

/// Tunables for the admission loop.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// How many denials to absorb before giving up on a call.
    pub max_retries: u32,
    /// Floor for every sleep between denied attempts.
    pub min_retry_ms: u64,
    /// Local pacer used while the arbiter is unreachable.
    pub pacer: PacerConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_retries: 100,
            min_retry_ms: 50,
            pacer: PacerConfig::default(),
        }
    }
}

/// Counters kept by the gate; useful for telemetry and tests.
#[derive(Debug, Default)]
pub struct GateStats {
    pub grants: AtomicU64,
    pub denials: AtomicU64,
    pub fallbacks: AtomicU64,
    pub reports_failed: AtomicU64,
    pub retries_exhausted: AtomicU64,
}

enum Admission {
    Granted { lease_id: Option<String> },
    Fallback { reason: String },
}

/// Per-call wrapper around the permit protocol.
pub struct AdmissionGate {
    arbiter: Arc<dyn ArbiterApi>,
    pacer: Arc<LocalPacer>,
    config: GateConfig,
    stats: GateStats,
    client_id: String,
}

impl AdmissionGate {
    pub fn new(arbiter: Arc<dyn ArbiterApi>, client_id: &str, config: GateConfig) -> Self {
        let pacer = LocalPacer::new(config.pacer.clone());
        Self {
            arbiter,
            pacer,
            config,
            stats: GateStats::default(),
            client_id: client_id.to_string(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> &GateStats {
        &self.stats
    }

    /// Admit one call, run it, and report the outcome.
    ///
    /// The executor performs the actual external call and returns the
    /// response status and headers, or its own error. An executor error is
    /// re-raised as [`Error::Executor`] after a synthetic status-500
    /// observation has been reported.
    ///
    /// # Errors
    ///
    /// [`Error::RetryExhausted`] when every permitted attempt was denied,
    /// [`Error::Executor`] when the wrapped call failed.
    pub async fn with_permit<F, Fut, E>(
        &self,
        meta: &CallMeta,
        executor: F,
    ) -> Result<CallOutcome, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CallOutcome, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let request = self.permit_request(meta);
        let admission = self.admit(&request, meta).await?;

        let executed = executor().await;

        let (status_code, headers, body_retry_ms) = match &executed {
            Ok(outcome) => (
                outcome.status_code,
                Some(&outcome.headers),
                outcome.retry_after_ms,
            ),
            // A throwing executor is reported as a synthetic server error.
            Err(_) => (500, None, None),
        };
        let report = self.build_report(
            meta,
            &request.request_id,
            &admission,
            status_code,
            headers,
            body_retry_ms,
        );
        if let Err(err) = self.arbiter.report_result(&report).await {
            self.stats.reports_failed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %err, "failed to report observation");
        }

        match executed {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(Error::Executor(err.into())),
        }
    }

    async fn admit(&self, request: &PermitRequest, meta: &CallMeta) -> Result<Admission, Error> {
        let mut denials = 0u32;
        loop {
            match self.arbiter.request_token(request).await {
                Ok(response) if response.granted => {
                    self.stats.grants.fetch_add(1, Ordering::Relaxed);
                    return Ok(Admission::Granted {
                        lease_id: response.lease_id,
                    });
                }
                Ok(response) => {
                    denials += 1;
                    self.stats.denials.fetch_add(1, Ordering::Relaxed);
                    if denials >= self.config.max_retries {
                        self.stats.retries_exhausted.fetch_add(1, Ordering::Relaxed);
                        return Err(Error::RetryExhausted { attempts: denials });
                    }
                    let wait_ms = response
                        .retry_after_ms
                        .unwrap_or(0)
                        .max(self.config.min_retry_ms);
                    sleep(Duration::from_millis(wait_ms)).await;
                }
                Err(err) if err.is_arbiter_unavailable() => {
                    let reason = match &err {
                        Error::Status { status } => format!("orchestrator_http_{status}"),
                        _ => "orchestrator_down".to_string(),
                    };
                    tracing::debug!(error = %err, "arbiter unavailable, pacing locally");
                    self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                    self.pacer
                        .acquire(
                            &meta.identity,
                            &meta.method,
                            &meta.route,
                            &meta.major_parameter,
                        )
                        .await;
                    return Ok(Admission::Fallback { reason });
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn permit_request(&self, meta: &CallMeta) -> PermitRequest {
        PermitRequest {
            client_id: self.client_id.clone(),
            group_id: meta.group_id.clone(),
            identity: meta.identity.clone(),
            method: meta.method.clone(),
            route: meta.route.clone(),
            major_parameter: meta.major_parameter.clone(),
            priority: meta.priority,
            max_wait_ms: meta.max_wait_ms,
            request_id: meta
                .request_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    fn build_report(
        &self,
        meta: &CallMeta,
        request_id: &str,
        admission: &Admission,
        status_code: u16,
        headers: Option<&HashMap<String, String>>,
        body_retry_ms: Option<u64>,
    ) -> ObservationReport {
        let empty = HashMap::new();
        let headers = headers.unwrap_or(&empty);

        let header_retry_ms =
            header_f64(headers, "retry-after").map(|seconds| (seconds * 1000.0).round() as u64);
        // The external API is known to send conflicting header and body
        // retry hints; the longer one is the safe one.
        let retry_after_ms = match (header_retry_ms, body_retry_ms) {
            (Some(from_header), Some(from_body)) => Some(from_header.max(from_body)),
            (from_header, from_body) => from_header.or(from_body),
        };

        let (lease_id, fallback_reason) = match admission {
            Admission::Granted { lease_id } => (lease_id.clone(), None),
            Admission::Fallback { reason } => (None, Some(reason.clone())),
        };

        ObservationReport {
            request_id: request_id.to_string(),
            lease_id,
            identity: meta.identity.clone(),
            group_id: meta.group_id.clone(),
            method: meta.method.clone(),
            route: meta.route.clone(),
            major_parameter: meta.major_parameter.clone(),
            status_code,
            x_ratelimit_bucket: header(headers, "x-ratelimit-bucket").map(str::to_string),
            x_ratelimit_limit: header_f64(headers, "x-ratelimit-limit"),
            x_ratelimit_remaining: header_f64(headers, "x-ratelimit-remaining"),
            x_ratelimit_reset_after_s: header_f64(headers, "x-ratelimit-reset-after"),
            x_ratelimit_scope: header(headers, "x-ratelimit-scope").map(str::to_string),
            retry_after_ms,
            fallback_reason,
            observed_at_unix_ms: unix_ms(),
        }
    }
}

/// Case-insensitive header lookup.
fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find_map(|(key, value)| key.eq_ignore_ascii_case(name).then_some(value.as_str()))
}

fn header_f64(headers: &HashMap<String, String>, name: &str) -> Option<f64> {
    header(headers, name).and_then(|value| value.trim().parse().ok())
}

fn unix_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
