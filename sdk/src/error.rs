//! Error types for the rategate SDK.

use thiserror::Error;

/// Main error type for the SDK.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure: connect, timeout, malformed body.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The arbiter answered with a non-success status.
    #[error("Arbiter answered HTTP {status}")]
    Status { status: u16 },

    /// The arbiter answered success with a body that does not parse.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP client could not be built.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every permitted retry was denied by the arbiter.
    #[error("Permit retries exhausted after {attempts} denials")]
    RetryExhausted { attempts: u32 },

    /// The wrapped call itself failed; re-raised after the observation
    /// report was emitted.
    #[error("Executor error: {0}")]
    Executor(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Whether this error means the arbiter could not be used at all, which
    /// sends the gate to its local pacer. An unparseable answer counts: an
    /// arbiter the gate cannot understand is as unusable as a dead one.
    #[must_use]
    pub fn is_arbiter_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Status { .. } | Self::Serialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_mean_unavailable() {
        assert!(Error::Http("connection refused".to_string()).is_arbiter_unavailable());
        assert!(Error::Status { status: 503 }.is_arbiter_unavailable());

        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(Error::Serialization(parse_error).is_arbiter_unavailable());

        assert!(!Error::RetryExhausted { attempts: 3 }.is_arbiter_unavailable());
        assert!(!Error::Configuration("bad client".to_string()).is_arbiter_unavailable());
    }
}
