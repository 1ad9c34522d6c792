//! Counter store access
//!
//! The store owns every piece of cross-process state: per-second counters,
//! the learned bucket map, observed bucket state, the invalid counter and
//! the guardrail lock. Connections are established per call so the arbiter
//! can start (and serve fail-open decisions) while the store is down.

use redis::aio::MultiplexedConnection;
use thiserror::Error;

/// Errors from the shared counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("unexpected script reply: {0}")]
    Protocol(String),
}

/// Handle to the shared counter store.
#[derive(Clone)]
pub struct CounterStore {
    client: redis::Client,
    prefix: String,
}

impl CounterStore {
    /// Open a handle with the default `rl` key namespace.
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        Self::with_prefix(url, "rl")
    }

    /// Open a handle with a custom key namespace. Tests use per-run
    /// namespaces so parallel runs never collide.
    pub fn with_prefix(url: &str, prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            prefix: prefix.to_string(),
        })
    }

    pub(crate) async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Whether the store currently answers a PING.
    pub async fn ping(&self) -> bool {
        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn guard_key(&self, group: &str) -> String {
        format!("{}:guard:{}", self.prefix, normalize_key_part(group))
    }

    pub(crate) fn invalid_key(&self, group: &str) -> String {
        format!("{}:invalid:{}", self.prefix, normalize_key_part(group))
    }

    pub(crate) fn global_key(&self, identity: &str, second: u64) -> String {
        format!("{}:global:{}:{second}", self.prefix, normalize_key_part(identity))
    }

    pub(crate) fn route_key(
        &self,
        identity: &str,
        method: &str,
        route: &str,
        major: &str,
        second: u64,
    ) -> String {
        format!(
            "{}:route:{}:{}:{}:{}:{second}",
            self.prefix,
            normalize_key_part(identity),
            normalize_key_part(method),
            normalize_key_part(route),
            normalize_key_part(major)
        )
    }

    pub(crate) fn bucket_map_key(&self, method: &str, route: &str) -> String {
        format!(
            "{}:bucket_map:{}:{}",
            self.prefix,
            normalize_key_part(method),
            normalize_key_part(route)
        )
    }
}

/// Collapse characters that would corrupt the `:`-separated key layout.
pub(crate) fn normalize_key_part(input: &str) -> String {
    input.trim().replace([' ', ':', '/', '\\', '\t', '\n'], "_")
}

/// Milliseconds since the Unix epoch on the system wall clock.
pub(crate) fn unix_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_replaces_separators() {
        assert_eq!(
            normalize_key_part("GET /channels/{channel_id}/messages"),
            "GET__channels_{channel_id}_messages"
        );
        assert_eq!(normalize_key_part("  padded \t"), "padded");
        assert_eq!(normalize_key_part("a:b"), "a_b");
    }

    #[test]
    fn keys_carry_the_namespace() {
        let store = CounterStore::with_prefix("redis://127.0.0.1:6379/", "t").unwrap();
        assert_eq!(store.guard_key("egress"), "t:guard:egress");
        assert_eq!(store.global_key("bot a", 17), "t:global:bot_a:17");
        assert_eq!(
            store.route_key("bot", "GET", "/gateway", "", 17),
            "t:route:bot:GET:_gateway::17"
        );
        assert_eq!(store.bucket_map_key("GET", "/gateway"), "t:bucket_map:GET:_gateway");
    }
}
