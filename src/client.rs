//! # Outbound HTTP client
//!
//! One shared `reqwest::Client` per process, configured with connect and
//! request timeouts, used for every call a node makes to another node:
//! worker -> controller (mapping, heartbeat), worker -> worker (replicate,
//! pull, donor reads), and controller -> worker (key listing, pull
//! instructions).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KvError;

pub fn build(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .expect("reqwest client configuration is valid")
}

fn classify(err: reqwest::Error, peer: &str) -> KvError {
    if err.is_timeout() {
        KvError::PeerTimeout(peer.to_string())
    } else {
        KvError::PeerUnreachable(format!("{peer}: {err}"))
    }
}

#[derive(Deserialize)]
struct MapResponse {
    replicas: Vec<String>,
}

#[derive(Serialize)]
struct HeartbeatPayload<'a> {
    id: &'a str,
    address: &'a str,
}

/// Asks the controller for the ordered replica set (addresses) of `key`.
pub async fn fetch_map(
    client: &reqwest::Client,
    controller_url: &str,
    key: &str,
) -> Result<Vec<String>, KvError> {
    let url = format!("{controller_url}/map");
    let resp = client
        .get(url)
        .query(&[("key", key)])
        .send()
        .await
        .map_err(|e| classify(e, controller_url))?;

    if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        return Err(KvError::NoWorkers);
    }
    if !resp.status().is_success() {
        return Err(KvError::MappingUnavailable(format!(
            "controller returned {}",
            resp.status()
        )));
    }
    let body: MapResponse = resp
        .json()
        .await
        .map_err(|e| KvError::MappingUnavailable(e.to_string()))?;
    Ok(body.replicas)
}

/// Posts a heartbeat to the controller. Failures are the caller's concern to
/// log; they are never fatal to the emitter loop.
pub async fn send_heartbeat(
    client: &reqwest::Client,
    controller_url: &str,
    id: &str,
    address: &str,
) -> Result<(), KvError> {
    let url = format!("{controller_url}/heartbeat");
    let resp = client
        .post(url)
        .json(&HeartbeatPayload { id, address })
        .send()
        .await
        .map_err(|e| classify(e, controller_url))?;
    if !resp.status().is_success() {
        return Err(KvError::PeerUnreachable(format!(
            "controller heartbeat returned {}",
            resp.status()
        )));
    }
    Ok(())
}

#[derive(Serialize)]
struct ValuePayload<'a> {
    value: &'a str,
}

#[derive(Deserialize)]
struct ValueResponse {
    value: String,
}

/// Sends a replicate-request to a peer worker's `/replicate/{key}`.
pub async fn replicate(
    client: &reqwest::Client,
    peer_address: &str,
    key: &str,
    value: &str,
) -> Result<(), KvError> {
    let encoded_key = urlencoding::encode(key);
    let url = format!("{peer_address}/replicate/{encoded_key}");
    let resp = client
        .post(url)
        .json(&ValuePayload { value })
        .send()
        .await
        .map_err(|e| classify(e, peer_address))?;
    if !resp.status().is_success() {
        return Err(KvError::PeerUnreachable(format!(
            "replicate to {} returned {}",
            peer_address,
            resp.status()
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct ForwardedErrorBody {
    error: String,
    kind: String,
}

/// Forwards a PUT verbatim to the primary when this worker is not itself a
/// replica for the key, and returns the primary's result unchanged (§4.5
/// step 2). On a non-2xx response, re-raises the primary's own error
/// (status, kind, message) as a [`KvError::Forwarded`] rather than
/// collapsing it into one fixed variant — the caller sees exactly what the
/// primary reported, not a synthesized `QuorumNotMet`.
pub async fn forward_put(
    client: &reqwest::Client,
    primary_address: &str,
    key: &str,
    value: &str,
) -> Result<serde_json::Value, KvError> {
    let encoded_key = urlencoding::encode(key);
    let url = format!("{primary_address}/kv/{encoded_key}");
    let resp = client
        .put(url)
        .json(&ValuePayload { value })
        .send()
        .await
        .map_err(|e| classify(e, primary_address))?;
    let status = resp.status();
    if status.is_success() {
        return resp
            .json()
            .await
            .map_err(|e| KvError::PeerUnreachable(format!("forwarded put from {primary_address}: {e}")));
    }

    let body_text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ForwardedErrorBody>(&body_text) {
        Ok(parsed) => Err(KvError::Forwarded {
            status: status.as_u16(),
            kind: parsed.kind,
            message: parsed.error,
        }),
        Err(_) => Err(KvError::Forwarded {
            status: status.as_u16(),
            kind: "unknown".to_string(),
            message: if body_text.is_empty() {
                format!("forwarded put to {primary_address} returned {status} with no body")
            } else {
                body_text
            },
        }),
    }
}

/// Fetches a value from a donor worker during a pull.
pub async fn fetch_value(
    client: &reqwest::Client,
    donor_address: &str,
    key: &str,
) -> Result<String, KvError> {
    let encoded_key = urlencoding::encode(key);
    let url = format!("{donor_address}/kv/{encoded_key}");
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify(e, donor_address))?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(KvError::NotFound);
    }
    if !resp.status().is_success() {
        return Err(KvError::PeerUnreachable(format!(
            "donor {} returned {}",
            donor_address,
            resp.status()
        )));
    }
    let body: ValueResponse = resp
        .json()
        .await
        .map_err(|e| KvError::PeerUnreachable(e.to_string()))?;
    Ok(body.value)
}

/// Asks a worker for the set of keys it currently holds.
pub async fn fetch_keys(
    client: &reqwest::Client,
    worker_address: &str,
) -> Result<Vec<String>, KvError> {
    let url = format!("{worker_address}/keys");
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify(e, worker_address))?;
    if !resp.status().is_success() {
        return Err(KvError::PeerUnreachable(format!(
            "keys listing from {} returned {}",
            worker_address,
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| KvError::PeerUnreachable(e.to_string()))
}

#[derive(Serialize)]
struct PullPayload<'a> {
    donor: &'a str,
    keys: &'a [String],
}

#[derive(Deserialize, Debug)]
pub struct PullSummary {
    pub pulled: usize,
    pub failed: usize,
}

/// Instructs `target_address` to pull `keys` from `donor_address`.
pub async fn dispatch_pull(
    client: &reqwest::Client,
    target_address: &str,
    donor_address: &str,
    keys: &[String],
) -> Result<PullSummary, KvError> {
    let url = format!("{target_address}/pull");
    let resp = client
        .post(url)
        .json(&PullPayload {
            donor: donor_address,
            keys,
        })
        .send()
        .await
        .map_err(|e| classify(e, target_address))?;
    if !resp.status().is_success() {
        return Err(KvError::PeerUnreachable(format!(
            "pull dispatch to {} returned {}",
            target_address,
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| KvError::PeerUnreachable(e.to_string()))
}
