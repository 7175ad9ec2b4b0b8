//! Move-quality analysis on top of pooled engines.
//!
//! - [`classify`] - pure numeric conversions: centipawn loss, win
//!   percentage, accuracy, qualitative labels, blunder-risk cutoffs.
//! - [`material`] - material bookkeeping over a FEN board for sacrifice
//!   detection.
//! - [`orchestrator`] - the pipeline turning a request plus an acquired
//!   engine into a result: warmup replay, player scoring, the real search.

pub mod classify;
pub mod material;
pub mod orchestrator;

pub use classify::{MoveLabel, RiskCutoffs, RiskLevel, CP_LOSS_CAP};
pub use orchestrator::{
    run_analysis, AnalysisOutcome, AnalysisRequest, MoveReport, PlayerPerformance, RequestKind,
    SearchEngine, TimingBreakdown,
};

use engine_pool::EngineError;
use thiserror::Error;

/// Errors from the analysis pipeline.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Error from the engine or pool layer.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    /// Request parameters that cannot be served.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
