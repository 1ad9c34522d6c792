//! Local pacer scheduling properties.

use std::time::Duration;

use rategate_sdk::{LocalPacer, PacerConfig};
use tokio::time::{timeout, Instant};

fn config(global_rps: u64, route_rps: u64) -> PacerConfig {
    PacerConfig {
        global_rps,
        route_rps,
        ..Default::default()
    }
}

#[tokio::test]
async fn sequential_acquires_are_spaced_by_the_route_interval() {
    // Route chain dominates: 50 rps = 20 ms spacing.
    let pacer = LocalPacer::new(config(1000, 50));
    let started = Instant::now();
    for _ in 0..3 {
        pacer.acquire("bot-a", "GET", "/gateway", "").await;
    }
    // Two inter-slot gaps of >= 19 ms each.
    assert!(started.elapsed() >= Duration::from_millis(38));
}

#[tokio::test]
async fn concurrent_acquires_complete_in_arrival_order() {
    // 20 rps = 50 ms spacing on the route chain.
    let pacer = LocalPacer::new(config(1000, 20));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let mut handles = Vec::new();
    for i in 0..4u32 {
        let pacer = pacer.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            pacer.acquire("bot-a", "GET", "/gateway", "").await;
            tx.send((i, Instant::now())).unwrap();
        }));
        // Stagger arrivals so the expected order is unambiguous.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    drop(tx);
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    let mut completions = Vec::new();
    while let Some(entry) = rx.recv().await {
        completions.push(entry);
    }

    let order: Vec<u32> = completions.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, vec![0, 1, 2, 3], "first caller wins the earliest slot");

    for pair in completions.windows(2) {
        let gap = pair[1].1.duration_since(pair[0].1);
        assert!(gap >= Duration::from_millis(49), "slots must stay spaced, got {gap:?}");
    }
}

#[tokio::test]
async fn distinct_identities_do_not_cross_wait() {
    let pacer = LocalPacer::new(config(1, 1)); // 1000 ms spacing per chain
    pacer.acquire("bot-a", "GET", "/gateway", "").await;

    // bot-a's chain is booked for a second; bot-b must be unaffected.
    timeout(
        Duration::from_millis(300),
        pacer.acquire("bot-b", "GET", "/gateway", ""),
    )
    .await
    .expect("distinct identity should not queue");
}

#[tokio::test]
async fn global_chain_bounds_calls_across_routes() {
    // Global 10 rps = 100 ms; routes effectively unconstrained.
    let pacer = LocalPacer::new(config(10, 1000));
    let started = Instant::now();
    pacer.acquire("bot-a", "GET", "/channels/{channel_id}", "1").await;
    pacer.acquire("bot-a", "GET", "/guilds/{guild_id}", "2").await;
    assert!(
        started.elapsed() >= Duration::from_millis(99),
        "different routes still share the identity chain"
    );
}
