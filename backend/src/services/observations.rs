//! Observation ingestion
//!
//! Every reported response is applied to the shared state in one Lua script:
//! the bucket mapping is (re)learned, observed bucket state is refreshed
//! unless the report is older than what is already stored, and invalid
//! responses feed the per-group counter that arms the guardrail lock.

use redis::Script;

use crate::config::Config;
use crate::models::ObservationReport;

use super::store::{normalize_key_part, unix_ms, CounterStore, StoreError};

/// How long a learned (method, route) -> bucket mapping stays valid.
const BUCKET_MAP_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// Slack added to a bucket state's reset horizon before it expires.
const BUCKET_STATE_SLACK_MS: u64 = 5000;
/// Window of the per-group invalid-response counter.
const INVALID_WINDOW_S: u64 = 600;

const OBSERVATION_APPLY_LUA: &str = r#"
local bucket_map_key = KEYS[1]
local invalid_key = KEYS[2]
local guard_key = KEYS[3]

local prefix = ARGV[1]
local identity = ARGV[2]
local major = ARGV[3]
local bucket_id = ARGV[4]
local has_state = tonumber(ARGV[5])
local limit = tonumber(ARGV[6])
local remaining = tonumber(ARGV[7])
local reset_after_ms = tonumber(ARGV[8])
local scope = ARGV[9]
local observed_at = tonumber(ARGV[10])
local counts_invalid = tonumber(ARGV[11])
local bucket_map_ttl_ms = tonumber(ARGV[12])
local state_slack_ms = tonumber(ARGV[13])
local invalid_ttl_s = tonumber(ARGV[14])
local invalid_threshold = tonumber(ARGV[15])
local guard_cooldown_ms = tonumber(ARGV[16])

if bucket_id ~= '' then
  redis.call('SET', bucket_map_key, bucket_id, 'PX', bucket_map_ttl_ms)
  if has_state == 1 then
    local state_key = prefix .. ':bucket_state:' .. identity .. ':' .. bucket_id .. ':' .. major
    local prev_observed = tonumber(redis.call('HGET', state_key, 'observed_at'))
    if not prev_observed or observed_at >= prev_observed then
      redis.call('HSET', state_key,
        'limit', limit,
        'remaining', remaining,
        'reset_at', observed_at + reset_after_ms,
        'scope', scope,
        'observed_at', observed_at)
      redis.call('PEXPIRE', state_key, reset_after_ms + state_slack_ms)
    end
  end
end

local invalid_count = 0
local guard_set = 0
if counts_invalid == 1 then
  invalid_count = redis.call('INCR', invalid_key)
  if invalid_count == 1 then redis.call('EXPIRE', invalid_key, invalid_ttl_s) end
  if invalid_count >= invalid_threshold then
    redis.call('SET', guard_key, invalid_count, 'PX', guard_cooldown_ms)
    guard_set = 1
  end
end

return {guard_set, invalid_count}
"#;

/// What one applied report did to the shared state.
#[derive(Debug, Clone, Copy)]
pub struct ObservationOutcome {
    pub guardrail_tripped: bool,
    pub invalid_count: u64,
}

/// Applies observation reports to the shared state.
#[derive(Clone)]
pub struct ObservationService {
    store: CounterStore,
    script: Script,
    invalid_threshold: u64,
    guardrail_cooldown_ms: u64,
}

impl ObservationService {
    pub fn new(store: CounterStore, config: &Config) -> Self {
        Self {
            store,
            script: Script::new(OBSERVATION_APPLY_LUA),
            invalid_threshold: config.invalid_threshold,
            guardrail_cooldown_ms: config.guardrail_cooldown_ms,
        }
    }

    /// Apply one report. Reports without a timestamp are stamped on arrival.
    pub async fn apply(&self, report: &ObservationReport) -> Result<ObservationOutcome, StoreError> {
        let observed_at = if report.observed_at_unix_ms == 0 {
            unix_ms()
        } else {
            report.observed_at_unix_ms
        };

        let bucket_id = report
            .x_ratelimit_bucket
            .as_deref()
            .map(normalize_key_part)
            .unwrap_or_default();
        // The value args are only read by the script when has_bucket_state
        // says all three headers were present.
        let limit = report.x_ratelimit_limit.map_or(0, |v| v.round() as i64);
        let remaining = report.x_ratelimit_remaining.map_or(0, |v| v.round() as i64);
        let reset_after_ms = report
            .x_ratelimit_reset_after_s
            .map_or(0, |v| (v * 1000.0).round() as i64);

        let mut conn = self.store.connection().await?;
        let (guard_set, invalid_count): (i64, i64) = self
            .script
            .key(self.store.bucket_map_key(&report.method, &report.route))
            .key(self.store.invalid_key(&report.group_id))
            .key(self.store.guard_key(&report.group_id))
            .arg(self.store.prefix())
            .arg(normalize_key_part(&report.identity))
            .arg(normalize_key_part(&report.major_parameter))
            .arg(&bucket_id)
            .arg(report.has_bucket_state() as i64)
            .arg(limit)
            .arg(remaining)
            .arg(reset_after_ms)
            .arg(report.x_ratelimit_scope.as_deref().unwrap_or(""))
            .arg(observed_at)
            .arg(report.counts_toward_invalid_limit() as i64)
            .arg(BUCKET_MAP_TTL_MS)
            .arg(BUCKET_STATE_SLACK_MS)
            .arg(INVALID_WINDOW_S)
            .arg(self.invalid_threshold)
            .arg(self.guardrail_cooldown_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(ObservationOutcome {
            guardrail_tripped: guard_set == 1,
            invalid_count: invalid_count.max(0) as u64,
        })
    }
}
