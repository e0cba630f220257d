//! # Recovery dispatcher
//!
//! Given the identifier of a worker that just transitioned `Up -> Down`,
//! rebuilds the replica sets of every key the fleet still holds: enumerate
//! keys from the live workers, recompute the ideal replica set for each
//! under current membership, and for every (key, target) pair missing its
//! ideal placement, pick a donor that already holds the key and dispatch a
//! batched pull instruction.

use std::collections::HashMap;

use tracing::warn;

use crate::client;
use crate::partition;
use crate::registry::Registry;

/// Runs one recovery pass against the current registry snapshot.
///
/// `replicas` is the configured replication factor; `client` and
/// `request_timeout` are used for the worker-to-worker calls this function
/// issues directly (key listing and pull dispatch run from the controller's
/// perspective, the same way the failure detector drives the rest of the
/// recovery pipeline).
pub async fn run(
    http: &reqwest::Client,
    registry_snapshot: &Registry,
    replicas: usize,
) {
    let live_ids = registry_snapshot.live_ids();
    if live_ids.is_empty() {
        return;
    }
    let live_addresses = registry_snapshot.addresses_for(&live_ids);

    // key -> set of addresses currently holding it
    let mut holders: HashMap<String, Vec<String>> = HashMap::new();
    for address in &live_addresses {
        match client::fetch_keys(http, address).await {
            Ok(keys) => {
                for key in keys {
                    holders.entry(key).or_default().push(address.clone());
                }
            }
            Err(e) => warn!(%address, error = %e, "recovery: failed to list keys from worker"),
        }
    }

    // target address -> donor address -> keys to pull
    let mut pulls: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();

    for (key, holder_addresses) in &holders {
        let ideal_ids = partition::replica_set(key, &live_ids, replicas);
        let ideal_addresses = registry_snapshot.addresses_for(&ideal_ids);

        for target in &ideal_addresses {
            if holder_addresses.contains(target) {
                continue;
            }
            let Some(donor) = holder_addresses.first() else {
                continue;
            };
            pulls
                .entry(target.clone())
                .or_default()
                .entry(donor.clone())
                .or_default()
                .push(key.clone());
        }
    }

    for (target, by_donor) in pulls {
        for (donor, keys) in by_donor {
            match client::dispatch_pull(http, &target, &donor, &keys).await {
                Ok(summary) => {
                    tracing::info!(
                        target = %target,
                        donor = %donor,
                        pulled = summary.pulled,
                        failed = summary.failed,
                        "recovery: pull dispatched"
                    );
                }
                Err(e) => warn!(%target, %donor, error = %e, "recovery: pull dispatch failed"),
            }
        }
    }
}
