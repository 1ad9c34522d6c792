//! Atomic permit decisions
//!
//! The whole admission check runs as one Lua script so no concurrent caller
//! can observe counters between their read and their increment. Ordering of
//! the checks inside the script, first deny wins:
//!
//! 1. group guardrail lock
//! 2. observed bucket exhausted
//! 3. per-identity per-second counter
//! 4. per-route per-second counter
//! 5. best-effort decrement of the observed bucket
//!
//! Counters are not rolled back on deny; their short TTL bounds the
//! over-count to the current second.

use redis::Script;

use crate::config::Config;
use crate::models::{PermitReason, PermitRequest};

use super::store::{normalize_key_part, unix_ms, CounterStore, StoreError};

const PERMIT_DECISION_LUA: &str = r#"
local guard_key = KEYS[1]
local global_key = KEYS[2]
local route_key = KEYS[3]
local bucket_map_key = KEYS[4]

local prefix = ARGV[1]
local identity = ARGV[2]
local major = ARGV[3]
local now_ms = tonumber(ARGV[4])
local global_limit = tonumber(ARGV[5])
local route_limit = tonumber(ARGV[6])
local counter_ttl_ms = tonumber(ARGV[7])
local min_retry_ms = tonumber(ARGV[8])

local guard_ttl = redis.call('PTTL', guard_key)
if guard_ttl and guard_ttl > 0 then
  if guard_ttl < min_retry_ms then guard_ttl = min_retry_ms end
  return {0, guard_ttl, 'invalid_guardrail_active'}
end

local bucket_state_key = nil
local bucket_id = redis.call('GET', bucket_map_key)
if bucket_id then
  bucket_state_key = prefix .. ':bucket_state:' .. identity .. ':' .. bucket_id .. ':' .. major
  local remaining = tonumber(redis.call('HGET', bucket_state_key, 'remaining'))
  local reset_at = tonumber(redis.call('HGET', bucket_state_key, 'reset_at'))
  if remaining and reset_at and remaining <= 0 and reset_at > now_ms then
    local retry_ms = reset_at - now_ms
    if retry_ms < min_retry_ms then retry_ms = min_retry_ms end
    return {0, retry_ms, 'bucket_exhausted'}
  end
end

local next_second_ms = (math.floor(now_ms / 1000) + 1) * 1000 - now_ms
if next_second_ms < min_retry_ms then next_second_ms = min_retry_ms end

local global_count = redis.call('INCR', global_key)
if global_count == 1 then redis.call('PEXPIRE', global_key, counter_ttl_ms) end
if global_count > global_limit then
  return {0, next_second_ms, 'global_bucket_exhausted'}
end

local route_count = redis.call('INCR', route_key)
if route_count == 1 then redis.call('PEXPIRE', route_key, counter_ttl_ms) end
if route_count > route_limit then
  return {0, next_second_ms, 'route_bucket_exhausted'}
end

if bucket_state_key then
  local remaining = tonumber(redis.call('HGET', bucket_state_key, 'remaining'))
  if remaining and remaining > 0 then
    redis.call('HINCRBY', bucket_state_key, 'remaining', -1)
  end
end

return {1, 0, 'ok'}
"#;

/// Outcome of one decision script run.
#[derive(Debug, Clone)]
pub struct PermitDecision {
    pub granted: bool,
    pub retry_after_ms: u64,
    pub reason: PermitReason,
}

/// Runs the admission decision as one indivisible store transition.
#[derive(Clone)]
pub struct PermitService {
    store: CounterStore,
    script: Script,
    global_rps: u64,
    route_rps: u64,
    counter_ttl_ms: u64,
    min_retry_ms: u64,
}

impl PermitService {
    pub fn new(store: CounterStore, config: &Config) -> Self {
        Self {
            store,
            script: Script::new(PERMIT_DECISION_LUA),
            global_rps: config.global_rps,
            route_rps: config.route_rps,
            counter_ttl_ms: config.counter_ttl_ms,
            min_retry_ms: config.min_retry_ms,
        }
    }

    /// Evaluate one permit request against the shared counters.
    pub async fn decide(&self, request: &PermitRequest) -> Result<PermitDecision, StoreError> {
        let now_ms = unix_ms();
        let second = now_ms / 1000;
        let identity = normalize_key_part(&request.identity);
        let major = normalize_key_part(&request.major_parameter);

        let mut conn = self.store.connection().await?;
        let (granted, retry_after_ms, reason): (i64, i64, String) = self
            .script
            .key(self.store.guard_key(&request.group_id))
            .key(self.store.global_key(&request.identity, second))
            .key(self.store.route_key(
                &request.identity,
                &request.method,
                &request.route,
                &request.major_parameter,
                second,
            ))
            .key(self.store.bucket_map_key(&request.method, &request.route))
            .arg(self.store.prefix())
            .arg(&identity)
            .arg(&major)
            .arg(now_ms)
            .arg(self.global_rps)
            .arg(self.route_rps)
            .arg(self.counter_ttl_ms)
            .arg(self.min_retry_ms)
            .invoke_async(&mut conn)
            .await?;

        let reason = PermitReason::from_wire(&reason)
            .ok_or_else(|| StoreError::Protocol(format!("unknown reason code: {reason}")))?;

        Ok(PermitDecision {
            granted: granted == 1,
            retry_after_ms: retry_after_ms.max(0) as u64,
            reason,
        })
    }
}
