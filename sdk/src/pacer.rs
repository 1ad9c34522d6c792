//! Local pacer
//!
//! In-process fallback limiter used while the arbiter is unreachable. Two
//! token-spacing layers compose per acquire: a global chain keyed by
//! identity and a route chain keyed by the full route tuple. Each chain
//! hands out admission slots `ceil(1000/rps)` ms apart; waiters on the same
//! chain are served strictly in arrival order, and the global slot is taken
//! before the route slot.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Pacing rates and housekeeping knobs.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Per-identity admissions per second. Kept under the arbiter's global
    /// cap so a fleet degraded to local pacing leaves headroom.
    pub global_rps: u64,
    /// Per-route admissions per second.
    pub route_rps: u64,
    /// How often stale chains are swept.
    pub sweep_interval: Duration,
    /// How long an untouched chain survives a sweep.
    pub idle_after: Duration,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            global_rps: 45,
            route_rps: 5,
            sweep_interval: Duration::from_secs(30),
            idle_after: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PacerKey {
    Global {
        identity: String,
    },
    Route {
        identity: String,
        method: String,
        route: String,
        major: String,
    },
}

struct Chain {
    next_at: Instant,
    last_touched: Instant,
}

/// The in-process fallback limiter.
pub struct LocalPacer {
    global_interval: Duration,
    route_interval: Duration,
    chains: DashMap<PacerKey, Arc<Mutex<Chain>>>,
}

impl LocalPacer {
    pub fn new(config: PacerConfig) -> Arc<Self> {
        let pacer = Arc::new(Self {
            global_interval: spacing_interval(config.global_rps),
            route_interval: spacing_interval(config.route_rps),
            chains: DashMap::new(),
        });
        pacer.spawn_sweeper(config.sweep_interval, config.idle_after);
        pacer
    }

    /// Wait until this call's identity slot and route slot have both come
    /// due. Returns the instant the call was released.
    pub async fn acquire(
        &self,
        identity: &str,
        method: &str,
        route: &str,
        major: &str,
    ) -> Instant {
        self.wait_on_chain(
            PacerKey::Global {
                identity: identity.to_string(),
            },
            self.global_interval,
        )
        .await;
        self.wait_on_chain(
            PacerKey::Route {
                identity: identity.to_string(),
                method: method.to_string(),
                route: route.to_string(),
                major: major.to_string(),
            },
            self.route_interval,
        )
        .await;
        Instant::now()
    }

    async fn wait_on_chain(&self, key: PacerKey, interval: Duration) {
        let chain = self
            .chains
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Chain {
                    next_at: Instant::now(),
                    last_touched: Instant::now(),
                }))
            })
            .clone();

        // The mutex is fair: whoever called acquire first reserves the
        // earliest slot, later callers chain behind it.
        let scheduled = {
            let mut chain = chain.lock().await;
            let now = Instant::now();
            let scheduled = chain.next_at.max(now);
            chain.next_at = scheduled + interval;
            chain.last_touched = now;
            scheduled
        };
        sleep_until(scheduled).await;
    }

    fn spawn_sweeper(self: &Arc<Self>, sweep_interval: Duration, idle_after: Duration) {
        let pacer = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                let Some(pacer) = pacer.upgrade() else { break };
                pacer.sweep(idle_after);
            }
        });
    }

    fn sweep(&self, idle_after: Duration) {
        let now = Instant::now();
        self.chains.retain(|_, chain| match chain.try_lock() {
            Ok(guard) => {
                guard.next_at > now || now.duration_since(guard.last_touched) < idle_after
            }
            // A held lock means a waiter is mid-reservation.
            Err(_) => true,
        });
    }

    #[cfg(test)]
    pub(crate) fn chain_count(&self) -> usize {
        self.chains.len()
    }
}

fn spacing_interval(rps: u64) -> Duration {
    Duration::from_millis(1000u64.div_ceil(rps.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_rounds_up() {
        assert_eq!(spacing_interval(45), Duration::from_millis(23));
        assert_eq!(spacing_interval(5), Duration::from_millis(200));
        assert_eq!(spacing_interval(0), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn sweep_reclaims_idle_chains_and_keeps_pending_ones() {
        let pacer = LocalPacer::new(PacerConfig {
            global_rps: 1000,
            route_rps: 1000,
            ..Default::default()
        });
        pacer.acquire("bot-a", "GET", "/gateway", "").await;
        assert_eq!(pacer.chain_count(), 2);

        // Chains were touched just now, the idle horizon keeps them.
        pacer.sweep(Duration::from_secs(60));
        assert_eq!(pacer.chain_count(), 2);

        // Once both reservations are in the past and the idle horizon is
        // zero, the sweep reclaims them.
        tokio::time::sleep(Duration::from_millis(10)).await;
        pacer.sweep(Duration::from_millis(0));
        assert_eq!(pacer.chain_count(), 0);
    }
}
