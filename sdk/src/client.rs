//! Arbiter wire client.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::transport::{HttpTransport, DEFAULT_TIMEOUT};
use crate::types::{ObservationReport, PermitRequest, PermitResponse, ReportAck};

/// Seam between the admission gate and the arbiter, so tests can script
/// arbiter behavior without a server.
#[async_trait]
pub trait ArbiterApi: Send + Sync {
    async fn request_token(&self, request: &PermitRequest) -> Result<PermitResponse, Error>;
    async fn report_result(&self, report: &ObservationReport) -> Result<(), Error>;
}

/// HTTP client for a running arbiter.
pub struct ArbiterClient {
    transport: HttpTransport,
    timeout: Duration,
}

impl ArbiterClient {
    /// Create a client for the arbiter at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP transport cannot be
    /// created.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, Error> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        Ok(Self {
            transport: HttpTransport::new(base_url, timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl ArbiterApi for ArbiterClient {
    async fn request_token(&self, request: &PermitRequest) -> Result<PermitResponse, Error> {
        // A caller willing to wait server-side must not be cut off by its
        // own transport timeout.
        let timeout = self
            .timeout
            .max(Duration::from_millis(request.max_wait_ms.saturating_add(500)));
        self.transport
            .post_json("/request_token", request, Some(timeout))
            .await
    }

    async fn report_result(&self, report: &ObservationReport) -> Result<(), Error> {
        let _ack: ReportAck = self
            .transport
            .post_json("/report_result", report, None)
            .await?;
        Ok(())
    }
}
