//! # Registry — controller's worker membership table
//!
//! Tracks every worker that has ever heartbeated. Workers missing a heartbeat
//! for longer than the configured timeout are marked down by the failure
//! detector but never removed — a worker that comes back simply heartbeats
//! its way back to `Up`.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Up,
    Down,
}

#[derive(Clone)]
pub struct WorkerEntry {
    pub id: String,
    pub address: String,
    pub liveness: Liveness,
    pub last_heartbeat: Instant,
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Serializable projection of a [`WorkerEntry`] for the `/workers` endpoint.
#[derive(Serialize)]
pub struct WorkerView {
    pub id: String,
    pub address: String,
    pub live: bool,
    pub last_heartbeat: DateTime<Utc>,
}

impl From<&WorkerEntry> for WorkerView {
    fn from(e: &WorkerEntry) -> Self {
        WorkerView {
            id: e.id.clone(),
            address: e.address.clone(),
            live: e.liveness == Liveness::Up,
            last_heartbeat: e.last_heartbeat_at,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    workers: HashMap<String, WorkerEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            workers: HashMap::new(),
        }
    }

    /// Upserts a worker on heartbeat receipt: sets liveness up and advances
    /// the last-heartbeat clock. Never regresses it.
    ///
    /// Returns `true` when this heartbeat grew membership — either a
    /// first-time heartbeat from an unknown worker, or a revival of one
    /// previously `Down` — the condition that should trigger a recovery
    /// pass per the partition function's "when membership grows" edge
    /// policy (§4.1).
    pub fn heartbeat(&mut self, id: &str, address: &str) -> bool {
        let now = Instant::now();
        let now_utc = Utc::now();
        match self.workers.get_mut(id) {
            Some(entry) => {
                let grew = entry.liveness == Liveness::Down;
                entry.address = address.to_string();
                entry.liveness = Liveness::Up;
                entry.last_heartbeat = now;
                entry.last_heartbeat_at = now_utc;
                grew
            }
            None => {
                self.workers.insert(
                    id.to_string(),
                    WorkerEntry {
                        id: id.to_string(),
                        address: address.to_string(),
                        liveness: Liveness::Up,
                        last_heartbeat: now,
                        last_heartbeat_at: now_utc,
                    },
                );
                true
            }
        }
    }

    /// Returns a detached copy of this registry holding only the currently
    /// live entries, each marked `Up`. Lets recovery operate on a stable
    /// view without holding the shared lock across outbound HTTP calls.
    pub fn live_snapshot(&self) -> Registry {
        let mut clone = Registry::new();
        for id in self.live_ids() {
            let addr = self
                .addresses_for(std::slice::from_ref(&id))
                .into_iter()
                .next()
                .unwrap_or_default();
            clone.heartbeat(&id, &addr);
        }
        clone
    }

    /// Returns the identifiers of every worker currently marked live.
    pub fn live_ids(&self) -> Vec<String> {
        self.workers
            .values()
            .filter(|w| w.liveness == Liveness::Up)
            .map(|w| w.id.clone())
            .collect()
    }

    /// Resolves live worker identifiers to their published addresses, in the
    /// order given.
    pub fn addresses_for(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.workers.get(id).map(|w| w.address.clone()))
            .collect()
    }

    pub fn all(&self) -> Vec<WorkerView> {
        self.workers.values().map(WorkerView::from).collect()
    }

    /// Flips liveness to down for every entry whose heartbeat is older than
    /// `timeout`. Returns the identifiers that transitioned `Up` -> `Down`
    /// this call, for the caller to enqueue recovery work against.
    pub fn mark_expired(&mut self, timeout: std::time::Duration) -> Vec<String> {
        let now = Instant::now();
        let mut expired = Vec::new();
        for entry in self.workers.values_mut() {
            if entry.liveness == Liveness::Up && now.duration_since(entry.last_heartbeat) > timeout {
                entry.liveness = Liveness::Down;
                expired.push(entry.id.clone());
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_registry_is_empty() {
        let r = Registry::new();
        assert!(r.is_empty());
        assert!(r.live_ids().is_empty());
    }

    #[test]
    fn heartbeat_registers_new_worker_as_up() {
        let mut r = Registry::new();
        r.heartbeat("w1", "http://127.0.0.1:7101");
        assert_eq!(r.live_ids(), vec!["w1".to_string()]);
    }

    #[test]
    fn heartbeat_on_known_worker_updates_address() {
        let mut r = Registry::new();
        r.heartbeat("w1", "http://host-a:7101");
        r.heartbeat("w1", "http://host-b:7101");
        let addrs = r.addresses_for(&["w1".to_string()]);
        assert_eq!(addrs, vec!["http://host-b:7101".to_string()]);
    }

    #[test]
    fn mark_expired_flips_liveness_and_reports_transition() {
        let mut r = Registry::new();
        r.heartbeat("w1", "addr");
        let expired = r.mark_expired(Duration::from_secs(0));
        assert_eq!(expired, vec!["w1".to_string()]);
        assert!(r.live_ids().is_empty());
    }

    #[test]
    fn mark_expired_is_idempotent_for_already_down_workers() {
        let mut r = Registry::new();
        r.heartbeat("w1", "addr");
        r.mark_expired(Duration::from_secs(0));
        let expired_again = r.mark_expired(Duration::from_secs(0));
        assert!(expired_again.is_empty());
    }

    #[test]
    fn heartbeat_revives_a_down_worker() {
        let mut r = Registry::new();
        r.heartbeat("w1", "addr");
        r.mark_expired(Duration::from_secs(0));
        assert!(r.live_ids().is_empty());
        r.heartbeat("w1", "addr");
        assert_eq!(r.live_ids(), vec!["w1".to_string()]);
    }

    #[test]
    fn heartbeat_reports_growth_on_first_contact_and_on_revival_only() {
        let mut r = Registry::new();
        assert!(r.heartbeat("w1", "addr"), "first-ever heartbeat must report growth");
        assert!(
            !r.heartbeat("w1", "addr"),
            "a steady-state heartbeat on an already-up worker is not growth"
        );
        r.mark_expired(Duration::from_secs(0));
        assert!(
            r.heartbeat("w1", "addr"),
            "a heartbeat reviving a down worker must report growth"
        );
    }

    #[test]
    fn live_snapshot_contains_only_currently_live_entries() {
        let mut r = Registry::new();
        r.heartbeat("w1", "addr1");
        r.heartbeat("w2", "addr2");
        r.mark_expired(Duration::from_secs(0));
        r.heartbeat("w1", "addr1");

        let snapshot = r.live_snapshot();
        assert_eq!(snapshot.live_ids(), vec!["w1".to_string()]);
        assert_eq!(snapshot.addresses_for(&["w1".to_string()]), vec!["addr1".to_string()]);
    }

    #[test]
    fn mark_expired_with_generous_timeout_keeps_recent_workers() {
        let mut r = Registry::new();
        r.heartbeat("w1", "addr");
        let expired = r.mark_expired(Duration::from_secs(1000));
        assert!(expired.is_empty());
        assert_eq!(r.live_ids().len(), 1);
    }

    #[test]
    fn addresses_for_skips_unknown_identifiers() {
        let mut r = Registry::new();
        r.heartbeat("w1", "addr1");
        let addrs = r.addresses_for(&["w1".to_string(), "ghost".to_string()]);
        assert_eq!(addrs, vec!["addr1".to_string()]);
    }

    #[test]
    fn all_reflects_liveness_for_both_up_and_down() {
        let mut r = Registry::new();
        r.heartbeat("w1", "addr1");
        r.heartbeat("w2", "addr2");
        r.mark_expired(Duration::from_secs(0));
        r.heartbeat("w2", "addr2");
        let views: HashMap<_, _> = r.all().into_iter().map(|v| (v.id.clone(), v)).collect();
        assert!(!views["w1"].live);
        assert!(views["w2"].live);
    }
}
