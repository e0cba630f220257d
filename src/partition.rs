//! # Partition function
//!
//! Maps a key to an ordered replica set over a snapshot of live worker
//! identifiers. Deterministic and coordination-free: given the same key and
//! the same live set, every caller computes the same sequence.

use sha2::{Digest, Sha256};

/// Computes a stable digest of `key` reduced to a `u64`.
fn digest(key: &str) -> u64 {
    let hash = Sha256::digest(key.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&hash[..8]);
    u64::from_be_bytes(buf)
}

/// Computes the ordered replica set for `key` given a snapshot of live worker
/// identifiers and a desired replication factor `r`.
///
/// Returns the canonically-sorted workers starting at the primary index and
/// walking forward cyclically, truncated to `min(r, live.len())`. Returns an
/// empty vec when `live` is empty; callers treat that as `NoWorkers`.
pub fn replica_set(key: &str, live: &[String], r: usize) -> Vec<String> {
    if live.is_empty() {
        return Vec::new();
    }
    let mut ring: Vec<&String> = live.iter().collect();
    ring.sort();

    let primary_index = (digest(key) % ring.len() as u64) as usize;
    let count = r.min(ring.len());

    (0..count)
        .map(|offset| ring[(primary_index + offset) % ring.len()].clone())
        .collect()
}

/// Index of the primary worker within the canonically-sorted live set.
pub fn primary_index(key: &str, live: &[String]) -> Option<usize> {
    if live.is_empty() {
        return None;
    }
    Some((digest(key) % live.len() as u64) as usize)
}
