//! # Failure detector
//!
//! A background task, spawned once at controller startup, that sweeps the
//! registry every `check_interval` and flips any worker whose heartbeat has
//! gone quiet for longer than `heartbeat_timeout` to `Down`. A recovery pass
//! runs on every tick, not only the tick a worker transitions — a dispatched
//! pull can itself fail (donor or target transiently unreachable), and §4.4
//! requires that deficit to be retried "on the next failure-detector tick
//! that still observes" it. This is the same spawn-and-loop-on-an-interval
//! shape the ancestor dashboard used for its periodic fleet pruning.

use std::sync::Mutex;
use std::time::Duration;

use tracing::info;

use crate::recovery;
use crate::registry::Registry;

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Runs the detector loop forever. Intended to be driven via `tokio::spawn`
/// from controller startup; never returns.
pub async fn run(
    registry: std::sync::Arc<Mutex<Registry>>,
    http: reqwest::Client,
    heartbeat_timeout: Duration,
    check_interval: Duration,
    replicas: usize,
) {
    let mut ticker = tokio::time::interval(check_interval);
    loop {
        ticker.tick().await;

        let expired = {
            let mut guard = lock_or_recover(&registry);
            guard.mark_expired(heartbeat_timeout)
        };
        for id in &expired {
            info!(worker = %id, "detector: worker marked down, triggering recovery");
        }

        let snapshot = {
            let guard = lock_or_recover(&registry);
            // Recovery needs key listings from every *currently* live
            // worker, which this snapshot captures; the registry itself
            // stays behind the lock only for the duration of the clone.
            guard.live_snapshot()
        };
        recovery::run(&http, &snapshot, replicas).await;
    }
}
