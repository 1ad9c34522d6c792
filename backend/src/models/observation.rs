//! Observation wire types

use serde::Deserialize;

use crate::models::permit::default_group_id;

/// What a client saw the external API answer for one attempted call.
///
/// Everything here is advisory: reports calibrate the shared state but a
/// dropped or duplicated report never breaks a decision.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationReport {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub lease_id: Option<String>,
    #[serde(rename = "discord_identity", default)]
    pub identity: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub major_parameter: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub x_ratelimit_bucket: Option<String>,
    #[serde(default)]
    pub x_ratelimit_limit: Option<f64>,
    #[serde(default)]
    pub x_ratelimit_remaining: Option<f64>,
    #[serde(default)]
    pub x_ratelimit_reset_after_s: Option<f64>,
    /// `user`, `global` or `shared` when the external API labelled the 429.
    #[serde(default)]
    pub x_ratelimit_scope: Option<String>,
    #[serde(default)]
    pub retry_after_ms: Option<u64>,
    /// Set when the call was executed under the local pacer instead of a permit.
    #[serde(default)]
    pub fallback_reason: Option<String>,
    #[serde(default)]
    pub observed_at_unix_ms: u64,
}

impl ObservationReport {
    /// 401/403 always count toward the per-group invalid-request ceiling;
    /// 429s count unless the external API marked them `shared` scope.
    pub fn counts_toward_invalid_limit(&self) -> bool {
        match self.status_code {
            401 | 403 => true,
            429 => self.x_ratelimit_scope.as_deref() != Some("shared"),
            _ => false,
        }
    }

    /// Whether the report carries enough header data to refresh bucket state.
    pub fn has_bucket_state(&self) -> bool {
        self.x_ratelimit_limit.is_some()
            && self.x_ratelimit_remaining.is_some()
            && self.x_ratelimit_reset_after_s.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status_code: u16, scope: Option<&str>) -> ObservationReport {
        serde_json::from_value(serde_json::json!({
            "discord_identity": "bot-a",
            "group_id": "egress-1",
            "method": "GET",
            "route": "/gateway",
            "major_parameter": "",
            "status_code": status_code,
            "x_ratelimit_scope": scope,
            "observed_at_unix_ms": 1_700_000_000_000u64
        }))
        .expect("report should deserialize")
    }

    #[test]
    fn auth_failures_count_toward_invalid_limit() {
        assert!(report(401, None).counts_toward_invalid_limit());
        assert!(report(403, None).counts_toward_invalid_limit());
    }

    #[test]
    fn shared_scope_429_does_not_count() {
        assert!(!report(429, Some("shared")).counts_toward_invalid_limit());
        assert!(report(429, Some("user")).counts_toward_invalid_limit());
        assert!(report(429, None).counts_toward_invalid_limit());
    }

    #[test]
    fn success_does_not_count() {
        assert!(!report(200, None).counts_toward_invalid_limit());
        assert!(!report(500, None).counts_toward_invalid_limit());
    }

    #[test]
    fn bucket_state_requires_all_three_headers() {
        let full: ObservationReport = serde_json::from_value(serde_json::json!({
            "discord_identity": "bot-a",
            "status_code": 200,
            "x_ratelimit_bucket": "abc123",
            "x_ratelimit_limit": 5.0,
            "x_ratelimit_remaining": 4.0,
            "x_ratelimit_reset_after_s": 1.2,
            "observed_at_unix_ms": 1_700_000_000_000u64
        }))
        .expect("report should deserialize");
        assert!(full.has_bucket_state());

        let partial = report(200, None);
        assert!(!partial.has_bucket_state());
    }
}
