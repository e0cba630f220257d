//! # CLI configuration
//!
//! Both roles (`controller`, `worker`) are served from one binary, dispatched
//! by subcommand the way the ancestor CLI dispatches search forms versus
//! `dashboard` from a single `Cli` struct. Every flag also reads from an
//! environment variable via clap's `env` feature, and `.env` is loaded first
//! so a local file can stand in for a real environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kvcluster", about = "Replicated key-value store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the controller: worker registry, partition mapping, failure detection
    Controller(ControllerArgs),
    /// Run a storage worker: local store, write coordination, replication
    Worker(WorkerArgs),
}

#[derive(Args)]
pub struct ControllerArgs {
    /// Socket address to bind the controller's HTTP server to
    #[arg(long, env = "ADDRESS", default_value = "0.0.0.0:7100")]
    pub address: SocketAddr,

    /// Desired replication factor
    #[arg(long, env = "REPLICAS", default_value_t = 3)]
    pub replicas: usize,

    /// Seconds of heartbeat silence before a worker is marked down
    #[arg(long, env = "HEARTBEAT_TIMEOUT", default_value_t = 6)]
    pub heartbeat_timeout_secs: u64,

    /// Seconds between failure-detector sweeps
    #[arg(long, env = "CHECK_INTERVAL", default_value_t = 2)]
    pub check_interval_secs: u64,

    /// Timeout for outbound requests to workers during recovery
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 2)]
    pub request_timeout_secs: u64,
}

impl ControllerArgs {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Args)]
pub struct WorkerArgs {
    /// Stable identifier for this worker, used by the partition function
    #[arg(long, env = "ID")]
    pub id: String,

    /// URL this worker is reachable at, published in heartbeats and mapping responses
    #[arg(long, env = "ADDRESS")]
    pub address: String,

    /// Local socket address to bind this worker's HTTP server to.
    /// Defaults to the host/port parsed out of `--address`.
    #[arg(long, env = "BIND")]
    pub bind: Option<SocketAddr>,

    /// URL of the controller
    #[arg(long, env = "CONTROLLER")]
    pub controller: String,

    /// Directory holding this worker's durable per-key files
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// Acks (including the coordinator's own local write) required before a PUT succeeds
    #[arg(long, env = "WRITE_QUORUM", default_value_t = 2)]
    pub write_quorum: usize,

    /// Timeout for outbound requests to the controller and peers
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 2)]
    pub request_timeout_secs: u64,

    /// Seconds between heartbeat emissions
    #[arg(long, env = "HEARTBEAT_INTERVAL", default_value_t = 2)]
    pub heartbeat_interval_secs: u64,
}

impl WorkerArgs {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        if let Some(addr) = self.bind {
            return Ok(addr);
        }
        let stripped = self
            .address
            .rsplit_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.address);
        stripped
            .parse()
            .map_err(|e| anyhow::anyhow!("cannot derive bind address from '{}': {}", self.address, e))
    }
}

/// Initializes structured logging. Human-readable by default; `LOG_FORMAT=json`
/// switches to JSON output, matching the ancestor binary's startup branch.
pub fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}
