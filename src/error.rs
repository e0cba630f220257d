//! # Error taxonomy
//!
//! One crate-wide error type shared by the controller and worker HTTP
//! handlers. Each variant carries the HTTP status it maps to so the wire
//! layer and the domain logic never disagree about what a failure looks
//! like to a client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("no live workers are registered")]
    NoWorkers,

    #[error("controller mapping lookup failed: {0}")]
    MappingUnavailable(String),

    #[error("write quorum not met: got {acks} of {required} required acks")]
    QuorumNotMet { acks: usize, required: usize },

    #[error("key not found")]
    NotFound,

    #[error("local storage failure: {0}")]
    StorageFailure(String),

    #[error("peer request timed out: {0}")]
    PeerTimeout(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// A non-replica coordinator forwarded a PUT to the primary (§4.5 step
    /// 2) and the primary's response was not 2xx. Carries the primary's
    /// status and wire error body unchanged rather than collapsing every
    /// forwarded failure into one fixed variant, so the client sees the
    /// primary's real status/kind/message exactly as the primary sent them.
    #[error("{message}")]
    Forwarded {
        status: u16,
        kind: String,
        message: String,
    },
}

impl KvError {
    fn kind(&self) -> String {
        match self {
            KvError::NoWorkers => "no_workers".to_string(),
            KvError::MappingUnavailable(_) => "mapping_unavailable".to_string(),
            KvError::QuorumNotMet { .. } => "quorum_not_met".to_string(),
            KvError::NotFound => "not_found".to_string(),
            KvError::StorageFailure(_) => "storage_failure".to_string(),
            KvError::PeerTimeout(_) => "peer_timeout".to_string(),
            KvError::PeerUnreachable(_) => "peer_unreachable".to_string(),
            KvError::Forwarded { kind, .. } => kind.clone(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            KvError::NoWorkers => StatusCode::SERVICE_UNAVAILABLE,
            KvError::MappingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            KvError::QuorumNotMet { .. } => StatusCode::SERVICE_UNAVAILABLE,
            KvError::NotFound => StatusCode::NOT_FOUND,
            KvError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            KvError::PeerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            KvError::PeerUnreachable(_) => StatusCode::BAD_GATEWAY,
            KvError::Forwarded { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: String,
}

impl IntoResponse for KvError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

pub type KvResult<T> = Result<T, KvError>;
