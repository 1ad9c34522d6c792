//! Internal counters and Prometheus text exposition
//!
//! Plain atomics rendered by hand; the counter set is small enough that a
//! metrics framework would outweigh it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Metrics {
    pub permits_granted: AtomicU64,
    pub permits_denied: AtomicU64,
    pub permit_errors: AtomicU64,
    pub fallback_grants: AtomicU64,
    pub queue_depth: AtomicU64,
    pub inflight_requests: AtomicU64,
    pub observations_applied: AtomicU64,
    pub observations_dropped: AtomicU64,
    pub guardrail_trips: AtomicU64,
    pub observed_429_global: AtomicU64,
    pub observed_429_user: AtomicU64,
    pub observed_429_shared: AtomicU64,
    pub observed_429_unknown: AtomicU64,
    pub invalid_401: AtomicU64,
    pub invalid_403: AtomicU64,
    pub invalid_429: AtomicU64,
    pub redis_errors: AtomicU64,
    pub request_wait_ms_sum: AtomicU64,
    pub request_wait_ms_count: AtomicU64,
    pub redis_latency_ms_sum: AtomicU64,
    pub redis_latency_ms_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn observe_request_wait_ms(&self, value: u64) {
        self.request_wait_ms_sum.fetch_add(value, Ordering::Relaxed);
        self.request_wait_ms_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_redis_latency_ms(&self, value: u64) {
        self.redis_latency_ms_sum.fetch_add(value, Ordering::Relaxed);
        self.redis_latency_ms_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Render all counters in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        format!(
            "# HELP rategate_request_token_total request_token outcomes\n\
# TYPE rategate_request_token_total counter\n\
rategate_request_token_total{{outcome=\"granted\"}} {}\n\
rategate_request_token_total{{outcome=\"denied\"}} {}\n\
rategate_request_token_total{{outcome=\"error\"}} {}\n\
# HELP rategate_fallback_grants_total Permits granted by the fail-open pacer\n\
# TYPE rategate_fallback_grants_total counter\n\
rategate_fallback_grants_total {}\n\
# HELP rategate_queue_depth Permit requests in a server-side wait\n\
# TYPE rategate_queue_depth gauge\n\
rategate_queue_depth {}\n\
# HELP rategate_inflight_requests Inflight request_token handlers\n\
# TYPE rategate_inflight_requests gauge\n\
rategate_inflight_requests {}\n\
# HELP rategate_observations_total Observation report outcomes\n\
# TYPE rategate_observations_total counter\n\
rategate_observations_total{{outcome=\"applied\"}} {}\n\
rategate_observations_total{{outcome=\"dropped\"}} {}\n\
# HELP rategate_guardrail_trips_total Times the invalid-request guardrail engaged\n\
# TYPE rategate_guardrail_trips_total counter\n\
rategate_guardrail_trips_total {}\n\
# HELP rategate_429_observed_total 429 observations by scope\n\
# TYPE rategate_429_observed_total counter\n\
rategate_429_observed_total{{scope=\"global\"}} {}\n\
rategate_429_observed_total{{scope=\"user\"}} {}\n\
rategate_429_observed_total{{scope=\"shared\"}} {}\n\
rategate_429_observed_total{{scope=\"unknown\"}} {}\n\
# HELP rategate_invalid_requests_total Invalid request counts by status\n\
# TYPE rategate_invalid_requests_total counter\n\
rategate_invalid_requests_total{{status=\"401\"}} {}\n\
rategate_invalid_requests_total{{status=\"403\"}} {}\n\
rategate_invalid_requests_total{{status=\"429\"}} {}\n\
# HELP rategate_redis_errors_total Counter store errors\n\
# TYPE rategate_redis_errors_total counter\n\
rategate_redis_errors_total {}\n\
# HELP rategate_request_token_wait_ms Wait milliseconds before request_token responses\n\
# TYPE rategate_request_token_wait_ms summary\n\
rategate_request_token_wait_ms_sum {}\n\
rategate_request_token_wait_ms_count {}\n\
# HELP rategate_redis_latency_ms Counter store roundtrip milliseconds\n\
# TYPE rategate_redis_latency_ms summary\n\
rategate_redis_latency_ms_sum {}\n\
rategate_redis_latency_ms_count {}\n",
            load(&self.permits_granted),
            load(&self.permits_denied),
            load(&self.permit_errors),
            load(&self.fallback_grants),
            load(&self.queue_depth),
            load(&self.inflight_requests),
            load(&self.observations_applied),
            load(&self.observations_dropped),
            load(&self.guardrail_trips),
            load(&self.observed_429_global),
            load(&self.observed_429_user),
            load(&self.observed_429_shared),
            load(&self.observed_429_unknown),
            load(&self.invalid_401),
            load(&self.invalid_403),
            load(&self.invalid_429),
            load(&self.redis_errors),
            load(&self.request_wait_ms_sum),
            load(&self.request_wait_ms_count),
            load(&self.redis_latency_ms_sum),
            load(&self.redis_latency_ms_count),
        )
    }
}

/// RAII guard for the inflight gauge.
pub struct InflightGuard {
    metrics: Arc<Metrics>,
}

impl InflightGuard {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        metrics.inflight_requests.fetch_add(1, Ordering::Relaxed);
        Self { metrics }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.metrics.inflight_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_reflects_counter_values() {
        let metrics = Metrics::new();
        metrics.permits_granted.fetch_add(3, Ordering::Relaxed);
        metrics.observed_429_shared.fetch_add(1, Ordering::Relaxed);
        metrics.observe_request_wait_ms(120);

        let body = metrics.render();
        assert!(body.contains("rategate_request_token_total{outcome=\"granted\"} 3"));
        assert!(body.contains("rategate_429_observed_total{scope=\"shared\"} 1"));
        assert!(body.contains("rategate_request_token_wait_ms_sum 120"));
        assert!(body.contains("rategate_request_token_wait_ms_count 1"));
    }

    #[test]
    fn inflight_guard_tracks_scope() {
        let metrics = Metrics::new();
        {
            let _guard = InflightGuard::new(metrics.clone());
            assert_eq!(metrics.inflight_requests.load(Ordering::Relaxed), 1);
        }
        assert_eq!(metrics.inflight_requests.load(Ordering::Relaxed), 0);
    }
}
