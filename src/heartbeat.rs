//! # Worker heartbeat emitter
//!
//! Posts `{id, address}` to the controller on start and every
//! `heartbeat_interval` thereafter. Failures are logged and otherwise
//! ignored — the emitter must never block the request path, mirroring the
//! fire-and-forget heartbeat thread the ancestor worker client ran
//! independently of its search loop.

use std::time::Duration;

use tracing::warn;

use crate::client;

pub async fn run(
    http: reqwest::Client,
    controller_url: String,
    id: String,
    address: String,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = client::send_heartbeat(&http, &controller_url, &id, &address).await {
            warn!(error = %e, "heartbeat: failed to reach controller");
        }
    }
}
