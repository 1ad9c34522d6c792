//! Health probing

use serde::Serialize;

use super::store::CounterStore;

/// Health summary returned by the healthz endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub redis: &'static str,
}

/// Probes the counter store behind the health endpoint.
#[derive(Clone)]
pub struct HealthService {
    store: CounterStore,
    redis_required: bool,
}

impl HealthService {
    pub fn new(store: CounterStore, redis_required: bool) -> Self {
        Self {
            store,
            redis_required,
        }
    }

    pub async fn check(&self) -> HealthStatus {
        let redis_up = self.store.ping().await;
        HealthStatus {
            ok: redis_up || !self.redis_required,
            redis: if redis_up { "up" } else { "down" },
        }
    }
}
