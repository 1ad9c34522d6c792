//! Wire types shared with the arbiter.
//!
//! Serialized field names are the interop contract; struct fields that
//! differ are renamed explicitly. The `reason` code on permit responses is
//! kept as a plain string so new server-side codes never break a client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Caller-supplied priority hint forwarded to the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Metadata identifying one outbound call to be admitted.
#[derive(Debug, Clone)]
pub struct CallMeta {
    /// Stable opaque label for the caller principal toward the external API.
    pub identity: String,
    pub method: String,
    /// Templated route pattern (path parameters already replaced).
    pub route: String,
    pub major_parameter: String,
    /// Blast-radius group, commonly the shared egress address.
    pub group_id: String,
    pub priority: Priority,
    /// Longest the arbiter may hold a permit request server-side.
    pub max_wait_ms: u64,
    /// Correlation id; a fresh one is generated when absent.
    pub request_id: Option<String>,
}

impl CallMeta {
    pub fn new(identity: &str, method: &str, route: &str, major_parameter: &str) -> Self {
        Self {
            identity: identity.to_string(),
            method: method.to_string(),
            route: route.to_string(),
            major_parameter: major_parameter.to_string(),
            group_id: "shared-egress".to_string(),
            priority: Priority::Normal,
            max_wait_ms: 0,
            request_id: None,
        }
    }

    #[must_use]
    pub fn with_group(mut self, group_id: &str) -> Self {
        self.group_id = group_id.to_string();
        self
    }

    #[must_use]
    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Permit request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermitRequest {
    pub client_id: String,
    pub group_id: String,
    #[serde(rename = "discord_identity")]
    pub identity: String,
    pub method: String,
    pub route: String,
    pub major_parameter: String,
    pub priority: Priority,
    pub max_wait_ms: u64,
    pub request_id: String,
}

/// Permit response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermitResponse {
    pub granted: bool,
    #[serde(default)]
    pub not_before_unix_ms: u64,
    #[serde(default)]
    pub retry_after_ms: Option<u64>,
    #[serde(default)]
    pub lease_id: Option<String>,
    #[serde(default)]
    pub reason: String,
}

/// Observation report payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationReport {
    pub request_id: String,
    #[serde(default)]
    pub lease_id: Option<String>,
    #[serde(rename = "discord_identity")]
    pub identity: String,
    pub group_id: String,
    pub method: String,
    pub route: String,
    pub major_parameter: String,
    pub status_code: u16,
    #[serde(default)]
    pub x_ratelimit_bucket: Option<String>,
    #[serde(default)]
    pub x_ratelimit_limit: Option<f64>,
    #[serde(default)]
    pub x_ratelimit_remaining: Option<f64>,
    #[serde(default)]
    pub x_ratelimit_reset_after_s: Option<f64>,
    #[serde(default)]
    pub x_ratelimit_scope: Option<String>,
    #[serde(default)]
    pub retry_after_ms: Option<u64>,
    #[serde(default)]
    pub fallback_reason: Option<String>,
    pub observed_at_unix_ms: u64,
}

/// Acknowledgement returned by `report_result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAck {
    pub ok: bool,
}

/// What the executor saw the external API answer.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub status_code: u16,
    /// Response headers; keys are matched case-insensitively.
    pub headers: HashMap<String, String>,
    /// Retry hint from the response body, when the API sent one there too.
    pub retry_after_ms: Option<u64>,
}

impl CallOutcome {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            retry_after_ms: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_body_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }
}
