//! Permit wire types
//!
//! Field names on these types are the interop contract shared with every
//! client; struct fields that differ are renamed explicitly.

use serde::{Deserialize, Serialize};

/// Caller-supplied priority hint.
///
/// Recorded for telemetry; the decision algorithm does not currently
/// weight it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A request for permission to attempt one outbound call.
#[derive(Debug, Clone, Deserialize)]
pub struct PermitRequest {
    #[serde(default)]
    pub client_id: String,
    /// Blast-radius group, commonly the shared egress address.
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Stable opaque label for the caller principal toward the external API.
    #[serde(rename = "discord_identity")]
    pub identity: String,
    pub method: String,
    /// Templated route pattern (path parameters already replaced).
    pub route: String,
    pub major_parameter: String,
    #[serde(default)]
    pub priority: Priority,
    /// Longest the arbiter may hold the request server-side before answering.
    #[serde(default)]
    pub max_wait_ms: u64,
    #[serde(default)]
    pub request_id: String,
}

pub(crate) fn default_group_id() -> String {
    "shared-egress".to_string()
}

/// Reason code attached to every permit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitReason {
    Ok,
    GlobalBucketExhausted,
    RouteBucketExhausted,
    BucketExhausted,
    InvalidGuardrailActive,
    ScsUnavailable,
}

impl PermitReason {
    /// Parse the code string produced by the decision script.
    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "ok" => Some(Self::Ok),
            "global_bucket_exhausted" => Some(Self::GlobalBucketExhausted),
            "route_bucket_exhausted" => Some(Self::RouteBucketExhausted),
            "bucket_exhausted" => Some(Self::BucketExhausted),
            "invalid_guardrail_active" => Some(Self::InvalidGuardrailActive),
            "scs_unavailable" => Some(Self::ScsUnavailable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::GlobalBucketExhausted => "global_bucket_exhausted",
            Self::RouteBucketExhausted => "route_bucket_exhausted",
            Self::BucketExhausted => "bucket_exhausted",
            Self::InvalidGuardrailActive => "invalid_guardrail_active",
            Self::ScsUnavailable => "scs_unavailable",
        }
    }
}

/// The arbiter's answer to a permit request.
#[derive(Debug, Clone, Serialize)]
pub struct PermitResponse {
    pub granted: bool,
    /// Earliest wall-clock instant the caller should act on this answer.
    pub not_before_unix_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_id: Option<String>,
    pub reason: PermitReason,
}
