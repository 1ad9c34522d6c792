pub mod health;
pub mod metrics;
pub mod observations;
pub mod pacer;
pub mod permits;
pub mod store;


pub use health::{HealthService, HealthStatus};
pub use metrics::{InflightGuard, Metrics};
pub use observations::{ObservationOutcome, ObservationService};
pub use pacer::FallbackPacer;
pub use permits::{PermitDecision, PermitService};
pub use store::{CounterStore, StoreError};
