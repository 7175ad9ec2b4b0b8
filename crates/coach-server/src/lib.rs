//! Coach Server
//!
//! The connection-facing layer of the system: an Axum server that accepts
//! WebSocket clients, resolves which engine pool serves each request,
//! discards superseded requests, streams partial search progress, and
//! exposes pool/queue occupancy for operational tooling.

pub mod config;
pub mod coordinator;
pub mod messages;
pub mod state;
pub mod stats;
