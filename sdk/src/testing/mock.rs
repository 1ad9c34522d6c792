//! Scriptable arbiter double.
//!
//! Implements [`ArbiterApi`](crate::client::ArbiterApi) without a server:
//! tests enqueue outcomes, the mock answers them in order (falling back to
//! a configurable default), and records every permit request and
//! observation report it receives.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::ArbiterApi;
use crate::error::Error;
use crate::types::{ObservationReport, PermitRequest, PermitResponse};

/// One scripted answer to a `request_token` call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Grant with a lease.
    Grant,
    /// Deny with the given retry hint.
    Deny { retry_after_ms: u64 },
    /// Fail as if the arbiter were down.
    Unreachable,
    /// Fail with a non-success HTTP status.
    HttpStatus(u16),
}

/// Recording arbiter double.
pub struct MockArbiter {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    default_outcome: MockOutcome,
    permit_requests: Mutex<Vec<PermitRequest>>,
    reports: Mutex<Vec<ObservationReport>>,
    fail_reports: AtomicBool,
    lease_counter: Mutex<u64>,
}

impl MockArbiter {
    /// A mock that grants everything until told otherwise.
    pub fn new() -> Self {
        Self::with_default(MockOutcome::Grant)
    }

    /// A mock whose unscripted answer is `default_outcome`.
    pub fn with_default(default_outcome: MockOutcome) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome,
            permit_requests: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
            fail_reports: AtomicBool::new(false),
            lease_counter: Mutex::new(0),
        }
    }

    /// Queue the next answer.
    pub fn enqueue(&self, outcome: MockOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Make `report_result` fail until reset.
    pub fn fail_reports(&self, fail: bool) {
        self.fail_reports.store(fail, Ordering::SeqCst);
    }

    /// Every permit request received so far.
    pub fn permit_requests(&self) -> Vec<PermitRequest> {
        self.permit_requests.lock().unwrap().clone()
    }

    /// Every observation report received so far.
    pub fn reports(&self) -> Vec<ObservationReport> {
        self.reports.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> MockOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.clone())
    }

    fn next_lease(&self) -> String {
        let mut counter = self.lease_counter.lock().unwrap();
        *counter += 1;
        format!("lease-{counter}")
    }
}

impl Default for MockArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArbiterApi for MockArbiter {
    async fn request_token(&self, request: &PermitRequest) -> Result<PermitResponse, Error> {
        self.permit_requests.lock().unwrap().push(request.clone());
        match self.next_outcome() {
            MockOutcome::Grant => Ok(PermitResponse {
                granted: true,
                not_before_unix_ms: 0,
                retry_after_ms: None,
                lease_id: Some(self.next_lease()),
                reason: "ok".to_string(),
            }),
            MockOutcome::Deny { retry_after_ms } => Ok(PermitResponse {
                granted: false,
                not_before_unix_ms: 0,
                retry_after_ms: Some(retry_after_ms),
                lease_id: None,
                reason: "global_bucket_exhausted".to_string(),
            }),
            MockOutcome::Unreachable => Err(Error::Http("connection refused".to_string())),
            MockOutcome::HttpStatus(status) => Err(Error::Status { status }),
        }
    }

    async fn report_result(&self, report: &ObservationReport) -> Result<(), Error> {
        if self.fail_reports.load(Ordering::SeqCst) {
            return Err(Error::Http("connection refused".to_string()));
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}
