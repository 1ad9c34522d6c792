//! Fail-open pacing
//!
//! When the counter store is unreachable and the arbiter is configured to
//! fail open, grants are spaced by this in-process pacer instead of the
//! shared counters: one slot chain per identity and one per route, each
//! spacing admissions at a fixed interval. Waiters on the same chain are
//! served in arrival order.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};

struct Slot {
    next_at: Instant,
    last_touched: Instant,
}

/// In-process permit spacer keyed by identity and route.
pub struct FallbackPacer {
    global_interval: Duration,
    route_interval: Duration,
    slots: DashMap<String, Arc<Mutex<Slot>>>,
}

impl FallbackPacer {
    pub fn new(global_rps: u64, route_rps: u64) -> Arc<Self> {
        let pacer = Arc::new(Self {
            global_interval: spacing_interval(global_rps),
            route_interval: spacing_interval(route_rps),
            slots: DashMap::new(),
        });
        pacer.spawn_sweeper();
        pacer
    }

    /// Wait for the identity slot, then the route slot. Returns once both
    /// reservations have come due.
    pub async fn acquire(&self, identity: &str, method: &str, route: &str, major: &str) {
        self.wait_for_slot(format!("global:{identity}"), self.global_interval)
            .await;
        self.wait_for_slot(
            format!("route:{identity}:{method}:{route}:{major}"),
            self.route_interval,
        )
        .await;
    }

    async fn wait_for_slot(&self, key: String, interval: Duration) {
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    next_at: Instant::now(),
                    last_touched: Instant::now(),
                }))
            })
            .clone();

        // The mutex is fair, so reservation order is arrival order.
        let scheduled = {
            let mut slot = slot.lock().await;
            let now = Instant::now();
            let scheduled = slot.next_at.max(now);
            slot.next_at = scheduled + interval;
            slot.last_touched = now;
            scheduled
        };
        sleep_until(scheduled).await;
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        let pacer = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                let Some(pacer) = pacer.upgrade() else { break };
                pacer.sweep(Duration::from_secs(60));
            }
        });
    }

    fn sweep(&self, idle_after: Duration) {
        let now = Instant::now();
        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => {
                guard.next_at > now || now.duration_since(guard.last_touched) < idle_after
            }
            // A held lock means a waiter is mid-reservation.
            Err(_) => true,
        });
    }
}

fn spacing_interval(rps: u64) -> Duration {
    Duration::from_millis(1000u64.div_ceil(rps.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn second_acquire_on_same_identity_is_spaced() {
        let pacer = FallbackPacer::new(10, 10); // 100ms spacing
        let started = Instant::now();
        pacer.acquire("bot-a", "GET", "/gateway", "").await;
        pacer.acquire("bot-a", "GET", "/gateway", "").await;
        // First acquire reserved t=0 on both chains, second waits ~100ms.
        assert!(started.elapsed() >= Duration::from_millis(99));
    }

    #[tokio::test]
    async fn distinct_identities_do_not_cross_wait() {
        let pacer = FallbackPacer::new(1, 1); // 1000ms spacing per key
        pacer.acquire("bot-a", "GET", "/gateway", "").await;

        let started = Instant::now();
        timeout(
            Duration::from_millis(500),
            pacer.acquire("bot-b", "GET", "/gateway", ""),
        )
        .await
        .expect("other identity should not queue behind bot-a");
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn sweep_drops_idle_slots_but_keeps_pending_ones() {
        let pacer = FallbackPacer::new(1000, 1000); // 1ms spacing
        pacer.acquire("bot-a", "GET", "/gateway", "").await;
        assert_eq!(pacer.slots.len(), 2);

        // Entries were touched just now, the idle horizon keeps them.
        pacer.sweep(Duration::from_secs(60));
        assert_eq!(pacer.slots.len(), 2);

        // Once the reservations are in the past and the idle horizon is
        // zero, the sweep reclaims both chains.
        tokio::time::sleep(Duration::from_millis(10)).await;
        pacer.sweep(Duration::from_millis(0));
        assert_eq!(pacer.slots.len(), 0);
    }
}
