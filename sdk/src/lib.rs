//! Rategate SDK
//!
//! Client side of the permit protocol. Every outbound call to the shared
//! external API goes through the [`AdmissionGate`]: ask the arbiter for a
//! permit, run the call, report what the server answered. When the arbiter
//! is unreachable the gate degrades to a conservative in-process
//! [`LocalPacer`] instead of failing the call.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rategate_sdk::{AdmissionGate, ArbiterClient, CallMeta, CallOutcome, Error, GateConfig};
//!
//! # async fn run() -> Result<(), Error> {
//! let arbiter = Arc::new(ArbiterClient::new("http://127.0.0.1:8787", None)?);
//! let gate = AdmissionGate::new(arbiter, "worker-7", GateConfig::default());
//!
//! let meta = CallMeta::new("bot-a", "POST", "/channels/{channel_id}/messages", "123");
//! let outcome = gate
//!     .with_permit(&meta, || async {
//!         // perform the external call here
//!         Ok::<_, std::io::Error>(CallOutcome::new(200))
//!     })
//!     .await?;
//! assert_eq!(outcome.status_code, 200);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod gate;
pub mod pacer;
pub mod testing;
pub mod transport;
pub mod types;

// Re-exports
pub use client::{ArbiterApi, ArbiterClient};
pub use error::Error;
pub use gate::{AdmissionGate, GateConfig, GateStats};
pub use pacer::{LocalPacer, PacerConfig};
pub use transport::HttpTransport;
pub use types::{
    CallMeta, CallOutcome, ObservationReport, PermitRequest, PermitResponse, Priority, ReportAck,
};
