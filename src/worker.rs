//! # Worker HTTP server
//!
//! Serves the client-facing key-value API, the replication receiver, and
//! the pull responder, and owns the heartbeat emitter background task.
//! Router layering mirrors the controller's: the same four middlewares
//! (CORS, panic-catch, body-size limit, request timeout) the ancestor
//! dashboard's `build_router` assembled, reordered so CORS headers reach
//! every response including errors.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::client;
use crate::config::WorkerArgs;
use crate::coordinator;
use crate::error::{KvError, KvResult};
use crate::store::Store;

pub struct AppState {
    store: Arc<Store>,
    http: Arc<reqwest::Client>,
    controller_url: String,
    self_address: String,
    write_quorum: usize,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        http: Arc<reqwest::Client>,
        controller_url: String,
        self_address: String,
        write_quorum: usize,
    ) -> Arc<Self> {
        Arc::new(AppState {
            store,
            http,
            controller_url,
            self_address,
            write_quorum,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/kv/{key}", put(put_kv).get(get_kv))
        .route("/keys", get(list_keys))
        .route("/replicate/{key}", post(replicate_kv))
        .route("/pull", post(pull))
        .route("/health", get(health))
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

#[derive(Deserialize)]
struct ValuePayload {
    value: String,
}

#[derive(Serialize)]
struct ValueResponse {
    value: String,
}

async fn put_kv(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(payload): Json<ValuePayload>,
) -> KvResult<impl IntoResponse> {
    let outcome = coordinator::put(
        state.http.clone(),
        state.store.clone(),
        &state.controller_url,
        &state.self_address,
        state.write_quorum,
        key,
        payload.value,
    )
    .await?;
    Ok(Json(outcome))
}

async fn get_kv(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> KvResult<impl IntoResponse> {
    match state.store.get(&key) {
        Some(value) => Ok(Json(ValueResponse { value })),
        None => Err(KvError::NotFound),
    }
}

async fn list_keys(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.keys())
}

async fn replicate_kv(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(payload): Json<ValuePayload>,
) -> KvResult<impl IntoResponse> {
    state.store.put(&key, &payload.value).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize)]
struct PullRequest {
    donor: String,
    keys: Vec<String>,
}

#[derive(Serialize)]
struct PullResponse {
    pulled: usize,
    failed: usize,
}

async fn pull(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PullRequest>,
) -> impl IntoResponse {
    let mut pulled = 0usize;
    let mut failed = 0usize;
    for key in request.keys {
        match client::fetch_value(&state.http, &request.donor, &key).await {
            Ok(value) => match state.store.put(&key, &value).await {
                Ok(()) => pulled += 1,
                Err(e) => {
                    warn!(error = %e, %key, "pull: local write failed");
                    failed += 1;
                }
            },
            Err(e) => {
                warn!(error = %e, %key, donor = %request.donor, "pull: donor fetch failed");
                failed += 1;
            }
        }
    }
    Json(PullResponse { pulled, failed })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Binds and serves a worker, spawning the heartbeat emitter and performing
/// the initial heartbeat before accepting traffic.
pub async fn run(bind: SocketAddr, args: &WorkerArgs) -> anyhow::Result<()> {
    let store = Arc::new(Store::open(args.data_dir.clone())?);
    let http = Arc::new(client::build(args.request_timeout()));

    let state = AppState::new(
        store,
        http.clone(),
        args.controller.clone(),
        args.address.clone(),
        args.write_quorum,
    );

    let emitter_http = (*http).clone();
    let controller_url = args.controller.clone();
    let id = args.id.clone();
    let address = args.address.clone();
    let interval = args.heartbeat_interval();
    tokio::spawn(async move {
        crate::heartbeat::run(emitter_http, controller_url, id, address, interval).await;
    });

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, id = %args.id, "worker listening");
    axum::serve(listener, router).await?;
    Ok(())
}
