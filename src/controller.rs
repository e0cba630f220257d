//! # Controller HTTP server
//!
//! Serves the worker registry and partition mapping over HTTP, and owns the
//! failure-detector background task. Router layering (CORS, panic-catch,
//! body-size limit, request timeout) is the same four middlewares the
//! ancestor dashboard's `build_router` assembled, reordered here so CORS
//! headers reach every response, including error responses raised by an
//! inner layer.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ControllerArgs;
use crate::error::{KvError, KvResult};
use crate::partition;
use crate::recovery;
use crate::registry::Registry;

pub struct AppState {
    registry: Arc<Mutex<Registry>>,
    replicas: usize,
    http: reqwest::Client,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

impl AppState {
    pub fn new(replicas: usize, request_timeout: Duration) -> Arc<Self> {
        Arc::new(AppState {
            registry: Arc::new(Mutex::new(Registry::new())),
            replicas,
            http: crate::client::build(request_timeout),
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/map", get(map))
        .route("/workers", get(workers))
        .route("/heartbeat", post(heartbeat))
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(CatchPanicLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    workers_count: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let count = lock_or_recover(&state.registry).len();
    Json(HealthResponse {
        status: "ok",
        workers_count: count,
    })
}

#[derive(Deserialize)]
struct MapQuery {
    key: String,
}

#[derive(Serialize)]
struct MapResponse {
    key: String,
    replicas: Vec<String>,
}

async fn map(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MapQuery>,
) -> KvResult<Json<MapResponse>> {
    let guard = lock_or_recover(&state.registry);
    let live_ids = guard.live_ids();
    if live_ids.is_empty() {
        return Err(KvError::NoWorkers);
    }
    let replica_ids = partition::replica_set(&query.key, &live_ids, state.replicas);
    let addresses = guard.addresses_for(&replica_ids);
    Ok(Json(MapResponse {
        key: query.key,
        replicas: addresses,
    }))
}

async fn workers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let guard = lock_or_recover(&state.registry);
    Json(guard.all())
}

#[derive(Deserialize)]
struct HeartbeatPayload {
    id: String,
    address: String,
}

#[derive(Serialize)]
struct HeartbeatResponse {
    ok: bool,
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HeartbeatPayload>,
) -> impl IntoResponse {
    let grew = lock_or_recover(&state.registry).heartbeat(&payload.id, &payload.address);
    if grew {
        // Membership grew: a first-time or revived worker may now be the
        // ideal replica for keys it doesn't yet hold. Dispatch a recovery
        // pass rather than waiting for the next detector tick (§4.1's
        // "when membership grows" edge policy).
        let snapshot = lock_or_recover(&state.registry).live_snapshot();
        let http = state.http.clone();
        let replicas = state.replicas;
        tokio::spawn(async move {
            recovery::run(&http, &snapshot, replicas).await;
        });
    }
    Json(HeartbeatResponse { ok: true })
}

/// Spawns the failure detector as a background task bound to `state`'s
/// registry and HTTP client. Exposed (not just inlined into [`run`]) so
/// integration tests can drive the detector against an in-process
/// controller without binding a real `--heartbeat-timeout`-sized wait.
pub fn spawn_detector(
    state: &Arc<AppState>,
    heartbeat_timeout: Duration,
    check_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    let registry = state.registry.clone();
    let http = state.http.clone();
    let replicas = state.replicas;
    tokio::spawn(async move {
        crate::detector::run(registry, http, heartbeat_timeout, check_interval, replicas).await;
    })
}

/// Binds and serves the controller, spawning the failure detector alongside
/// the HTTP listener on the same runtime.
pub async fn run(bind: SocketAddr, args: &ControllerArgs) -> anyhow::Result<()> {
    let state = AppState::new(args.replicas, args.request_timeout());
    spawn_detector(&state, args.heartbeat_timeout(), args.check_interval());

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "controller listening");
    axum::serve(listener, router).await?;
    Ok(())
}
