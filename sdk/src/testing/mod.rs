//! Test doubles for the SDK.

pub mod mock;

pub use mock::{MockArbiter, MockOutcome};
