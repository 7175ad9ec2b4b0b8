//! Engine process ownership and pooling.
//!
//! This crate wraps external UCI chess engines as supervised subprocesses and
//! multiplexes access to a small number of them:
//!
//! - [`EngineProcess`] - owns exactly one engine subprocess and translates
//!   structured calls into protocol lines (and back).
//! - [`EnginePool`] - keeps a fixed set of warmed processes of one flavor and
//!   hands out exclusive access in strict FIFO order.
//! - [`fen::validate`] - structural FEN validation, applied before any
//!   process or queue resource is consumed.

pub mod config;
pub mod fen;
pub mod pool;
pub mod process;
pub mod strength;

pub use config::{EngineFlavor, EngineOptions, TimeoutPolicy};
pub use pool::{
    EngineFactory, EngineLease, EnginePool, PoolEngine, PoolSnapshot, ProcessFactory,
    UciEnginePool,
};
pub use process::{EnginePosition, EngineProcess, ProtocolState, PvLine, SearchOutcome, SearchParams};
pub use strength::{Personality, Strength, FULL_STRENGTH_ELO};

use thiserror::Error;

/// Errors from engine processes and pools.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Structurally malformed FEN, rejected before touching any process.
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    /// Operation attempted on a process that is dead or not initialized.
    #[error("engine is not ready")]
    EngineNotReady,
    /// The search exceeded its computed wall-clock budget.
    #[error("analysis timed out after {budget_ms} ms")]
    AnalysisTimeout { budget_ms: u64 },
    /// The subprocess exited or its stdin could not be written.
    #[error("engine process died")]
    EngineProcessDied,
    /// Engine executable was not found at the configured path.
    #[error("engine not found at path: {0}")]
    NotFound(String),
    /// Failed to spawn the engine process.
    #[error("failed to spawn engine: {0}")]
    Spawn(#[from] std::io::Error),
    /// The UCI handshake or readiness check failed.
    #[error("engine initialization failed: {0}")]
    InitFailed(String),
    /// Personality name outside the supported set.
    #[error("unknown personality: {0}")]
    UnknownPersonality(String),
}
