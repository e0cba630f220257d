//! # Write coordinator
//!
//! Handles a client PUT at whichever worker receives it. Looks up the
//! key's replica set from the controller, writes locally if this worker is
//! a replica (otherwise forwards to the primary), fans out replicate calls
//! to the remaining replicas concurrently, and replies to the client as
//! soon as `write_quorum` acknowledgements are in. Any replication still
//! outstanding at that point keeps running, detached, to completion or
//! timeout — its outcome is an observability signal only.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::client;
use crate::error::{KvError, KvResult};
use crate::store::Store;

#[derive(Serialize)]
pub struct PutOutcome {
    pub key: String,
    pub value: String,
    pub acks: usize,
}

/// Coordinates a PUT for `key`/`value` received at `self_address`.
///
/// If `self_address` is not in the key's replica set, the write is
/// forwarded verbatim to the primary and its result is returned unchanged
/// (this worker is a pure proxy for the request). Otherwise this worker
/// performs the local durable write, counts it as the first ack, and fans
/// out to the remaining replicas, returning once `write_quorum` acks (local
/// write included) have landed or failing with `QuorumNotMet` if the
/// deadline implied by each fan-out call's own timeout elapses first.
pub async fn put(
    http: Arc<reqwest::Client>,
    store: Arc<Store>,
    controller_url: &str,
    self_address: &str,
    write_quorum: usize,
    key: String,
    value: String,
) -> KvResult<PutOutcome> {
    let replicas = client::fetch_map(&http, controller_url, &key).await?;
    if replicas.is_empty() {
        return Err(KvError::NoWorkers);
    }

    if !replicas.iter().any(|addr| addr == self_address) {
        let primary = &replicas[0];
        let body = client::forward_put(&http, primary, &key, &value).await?;
        let acks = body
            .get("acks")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        return Ok(PutOutcome { key, value, acks });
    }

    store.put(&key, &value).await?;

    // Deliberately NOT clamped to `replicas.len()`: when the live replica set
    // is thinner than the configured quorum, the write can never reach
    // quorum and must fail deterministically rather than silently accept a
    // weaker guarantee.
    let required = write_quorum;
    let mut acks = 1usize;

    let peers: Vec<String> = replicas
        .into_iter()
        .filter(|addr| addr != self_address)
        .collect();

    if acks >= required {
        spawn_remaining_fanout(http, peers, key.clone(), value.clone());
        return Ok(PutOutcome { key, value, acks });
    }

    let mut pending = tokio::task::JoinSet::new();
    for peer in peers {
        let http = http.clone();
        let key = key.clone();
        let value = value.clone();
        pending.spawn(async move { client::replicate(&http, &peer, &key, &value).await });
    }

    while acks < required {
        match pending.join_next().await {
            Some(Ok(Ok(()))) => acks += 1,
            Some(Ok(Err(e))) => warn!(error = %e, key = %key, "coordinator: replicate ack missing"),
            Some(Err(e)) => warn!(error = %e, key = %key, "coordinator: replicate task panicked"),
            None => break,
        }
    }

    if acks < required {
        return Err(KvError::QuorumNotMet { acks, required });
    }

    tokio::spawn(async move { while pending.join_next().await.is_some() {} });

    Ok(PutOutcome { key, value, acks })
}

fn spawn_remaining_fanout(
    http: Arc<reqwest::Client>,
    peers: Vec<String>,
    key: String,
    value: String,
) {
    tokio::spawn(async move {
        for peer in peers {
            if let Err(e) = client::replicate(&http, &peer, &key, &value).await {
                warn!(error = %e, %peer, %key, "coordinator: background replicate failed");
            }
        }
    });
}
