//! # kvcluster — Core Library
//!
//! A small replicated key-value store. One process plays either the
//! `controller` or the `worker` role; this crate provides both.
//!
//! ## Module Organization
//!
//! - [`partition`] — deterministic key -> replica-set mapping
//! - [`registry`] — controller's worker membership table
//! - [`detector`] — controller's heartbeat-timeout failure detector
//! - [`recovery`] — recomputes and restores replica placement after a failure
//! - [`controller`] — controller's HTTP server and state
//! - [`store`] — worker's durable per-key local store
//! - [`coordinator`] — worker's PUT write coordinator (quorum fan-out)
//! - [`heartbeat`] — worker's periodic liveness emitter
//! - [`worker`] — worker's HTTP server and state
//! - [`client`] — shared outbound HTTP client for node-to-node calls
//! - [`config`] — CLI/env configuration for both roles
//! - [`error`] — crate-wide error taxonomy and its HTTP mapping
//!
//! ## Design Philosophy
//!
//! Every node speaks HTTP/JSON. The controller holds no data; workers hold
//! no membership state. A PUT is coordinated by whichever worker receives
//! it, fanned out concurrently to the other replicas, and acknowledged to
//! the client as soon as the write quorum is met — remaining replication
//! continues in the background.

pub mod client;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod heartbeat;
pub mod partition;
pub mod recovery;
pub mod registry;
pub mod store;
pub mod worker;
