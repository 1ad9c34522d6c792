use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Counter store connection URL
    pub redis_url: String,
    /// Per-identity permits per second
    pub global_rps: u64,
    /// Per-route permits per second
    pub route_rps: u64,
    /// Floor for every retry_after_ms handed to callers
    pub min_retry_ms: u64,
    /// Lifetime of the per-second counters
    pub counter_ttl_ms: u64,
    /// Invalid responses per group before the guardrail locks
    pub invalid_threshold: u64,
    /// How long a tripped guardrail keeps denying the group
    pub guardrail_cooldown_ms: u64,
    /// Grant (true) or deny (false) when the counter store is unreachable
    pub fail_open: bool,
    /// Whether healthz should report unhealthy when the store is down
    pub redis_required_for_health: bool,
    /// Per-identity rate for the fail-open spacer
    pub fallback_global_rps: u64,
    /// Per-route rate for the fail-open spacer
    pub fallback_route_rps: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("RATEGATE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("RATEGATE_PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("RATEGATE_PORT"))?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string());

        Ok(Self {
            host,
            port,
            redis_url,
            global_rps: parse_u64("RATEGATE_GLOBAL_RPS", 50)?,
            route_rps: parse_u64("RATEGATE_ROUTE_RPS", 5)?,
            min_retry_ms: parse_u64("RATEGATE_MIN_RETRY_MS", 50)?,
            counter_ttl_ms: parse_u64("RATEGATE_COUNTER_TTL_MS", 1500)?,
            invalid_threshold: parse_u64("RATEGATE_INVALID_THRESHOLD", 8000)?,
            guardrail_cooldown_ms: parse_u64("RATEGATE_GUARDRAIL_COOLDOWN_MS", 30_000)?,
            fail_open: parse_bool("RATEGATE_FAIL_OPEN", true)?,
            redis_required_for_health: parse_bool("RATEGATE_REDIS_REQUIRED_FOR_HEALTH", true)?,
            fallback_global_rps: parse_u64("RATEGATE_FALLBACK_GLOBAL_RPS", 45)?,
            fallback_route_rps: parse_u64("RATEGATE_FALLBACK_ROUTE_RPS", 5)?,
        })
    }
}

fn parse_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key)),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
