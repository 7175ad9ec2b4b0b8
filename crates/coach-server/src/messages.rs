//! WebSocket messages exchanged with clients.
//!
//! All messages use snake_case tag names for JSON serialization.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use analysis::{
    AnalysisOutcome, AnalysisRequest, MoveReport, PlayerPerformance, RequestKind, TimingBreakdown,
};
use engine_pool::{Personality, PvLine, SearchParams};
use uci::GoLimit;

/// Messages received from clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe; answered with `pong`.
    Ping,
    /// Ask for a move suggestion.
    Suggestion(RequestBody),
    /// Ask for post-move quality analysis.
    Analysis(RequestBody),
}

/// How the search should be bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Nodes,
    Depth,
    Movetime,
}

/// Common body of suggestion and analysis requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    /// Unique per connection, monotonically increasing.
    pub request_id: u64,
    pub fen: String,
    /// Moves already played, from the standard starting position.
    #[serde(default)]
    pub moves: Vec<String>,
    pub search_mode: SearchMode,
    #[serde(default)]
    pub search_nodes: Option<u64>,
    #[serde(default)]
    pub search_depth: Option<u32>,
    #[serde(default)]
    pub search_movetime: Option<u64>,
    #[serde(default = "default_multi_pv")]
    pub multi_pv: u32,
    #[serde(default)]
    pub target_elo: Option<u32>,
    /// Defaults per request kind: on for suggestions, off for analysis.
    #[serde(default)]
    pub limit_strength: Option<bool>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub armageddon: bool,
}

fn default_multi_pv() -> u32 {
    1
}

/// Errors turning a wire request into an [`AnalysisRequest`].
#[derive(Error, Debug)]
pub enum RequestError {
    /// The selected search mode is missing its bound.
    #[error("missing field: {0}")]
    MissingField(&'static str),
    /// Unknown personality name.
    #[error("{0}")]
    Engine(#[from] engine_pool::EngineError),
}

impl RequestBody {
    /// Resolve the wire request into a validated pipeline request.
    pub fn into_request(
        self,
        kind: RequestKind,
        default_elo: u32,
    ) -> Result<AnalysisRequest, RequestError> {
        let limit = match self.search_mode {
            SearchMode::Nodes => GoLimit::Nodes(
                self.search_nodes
                    .ok_or(RequestError::MissingField("search_nodes"))?,
            ),
            SearchMode::Depth => GoLimit::Depth(
                self.search_depth
                    .ok_or(RequestError::MissingField("search_depth"))?,
            ),
            SearchMode::Movetime => GoLimit::MoveTime(
                self.search_movetime
                    .ok_or(RequestError::MissingField("search_movetime"))?,
            ),
        };
        let personality: Option<Personality> =
            self.personality.as_deref().map(str::parse).transpose()?;
        let limit_strength = self
            .limit_strength
            .unwrap_or(kind == RequestKind::Suggestion);
        Ok(AnalysisRequest {
            request_id: self.request_id,
            kind,
            fen: self.fen,
            moves: self.moves,
            params: SearchParams {
                limit,
                multipv: self.multi_pv.max(1),
            },
            target_elo: self.target_elo.unwrap_or(default_elo),
            limit_strength,
            personality,
            armageddon: self.armageddon,
            created_at: Instant::now(),
        })
    }
}

/// One ranked suggestion line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "move")]
    pub mv: String,
    /// Centipawn evaluation from the side to move's perspective.
    pub evaluation: i32,
    pub mate: Option<i32>,
    /// Win probability (0-100) for the side to move.
    pub win_rate: f64,
    pub pv: Vec<String>,
}

/// Messages sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    /// Reply to an undecodable frame.
    Error { message: String },
    /// Streaming search progress for the current request.
    Info {
        request_id: u64,
        depth: u32,
        evaluation: i32,
        mate: Option<i32>,
    },
    SuggestionResult {
        request_id: u64,
        suggestions: Vec<Suggestion>,
        position_eval: i32,
        mate_in: Option<i32>,
        win_rate: f64,
        timing: TimingBreakdown,
    },
    AnalysisResult {
        request_id: u64,
        classification: Option<MoveReport>,
        performance: Option<PlayerPerformance>,
        position_eval: i32,
        mate_in: Option<i32>,
        win_rate: f64,
        timing: TimingBreakdown,
    },
    SuggestionError { request_id: u64, error: String },
    AnalysisError { request_id: u64, error: String },
}

impl ServerMessage {
    /// Streaming update for an improving search depth.
    pub fn info_for(request_id: u64, line: &PvLine) -> ServerMessage {
        ServerMessage::Info {
            request_id,
            depth: line.depth,
            evaluation: line.score.as_centipawns(),
            mate: line.score.mate(),
        }
    }

    /// Final result message for the request kind.
    pub fn result_for(kind: RequestKind, request_id: u64, outcome: AnalysisOutcome) -> ServerMessage {
        match kind {
            RequestKind::Suggestion => ServerMessage::SuggestionResult {
                request_id,
                suggestions: outcome
                    .lines
                    .iter()
                    .map(|line| Suggestion {
                        mv: line.pv.first().cloned().unwrap_or_default(),
                        evaluation: line.score.as_centipawns(),
                        mate: line.score.mate(),
                        win_rate: analysis::classify::win_percent(line.score),
                        pv: line.pv.clone(),
                    })
                    .collect(),
                position_eval: outcome.score.as_centipawns(),
                mate_in: outcome.mate_in,
                win_rate: outcome.win_rate,
                timing: outcome.timing,
            },
            RequestKind::Analysis => ServerMessage::AnalysisResult {
                request_id,
                classification: outcome.classification,
                performance: outcome.performance,
                position_eval: outcome.score.as_centipawns(),
                mate_in: outcome.mate_in,
                win_rate: outcome.win_rate,
                timing: outcome.timing,
            },
        }
    }

    /// Typed error message for the request kind.
    pub fn error_for(kind: RequestKind, request_id: u64, error: String) -> ServerMessage {
        match kind {
            RequestKind::Suggestion => ServerMessage::SuggestionError { request_id, error },
            RequestKind::Analysis => ServerMessage::AnalysisError { request_id, error },
        }
    }
}
