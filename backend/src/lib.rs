//! Rategate arbiter backend.
//!
//! Coordinates outbound calls from a fleet of bots sharing one rate-limited
//! REST API: clients ask for a permit before each call and report what the
//! server answered afterwards. Decisions run as a single atomic script
//! against a shared Redis so the fleet-wide rate stays under the observed
//! caps, and a per-group guardrail locks everything down before an
//! invalid-request storm can draw an IP-level ban.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use models::{ObservationReport, PermitReason, PermitRequest, PermitResponse, Priority};
pub use services::{
    CounterStore, FallbackPacer, HealthService, Metrics, ObservationService, PermitService,
    StoreError,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub permits: PermitService,
    pub observations: ObservationService,
    pub fallback_pacer: Arc<FallbackPacer>,
    pub health: HealthService,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Build the full service graph from configuration.
    pub fn new(config: Config) -> Result<Self, StoreError> {
        let store = CounterStore::connect(&config.redis_url)?;
        Ok(Self::with_store(config, store))
    }

    /// Build the service graph around an existing store handle.
    pub fn with_store(config: Config, store: CounterStore) -> Self {
        Self {
            permits: PermitService::new(store.clone(), &config),
            observations: ObservationService::new(store.clone(), &config),
            fallback_pacer: FallbackPacer::new(
                config.fallback_global_rps,
                config.fallback_route_rps,
            ),
            health: HealthService::new(store, config.redis_required_for_health),
            metrics: Metrics::new(),
            config,
        }
    }
}
