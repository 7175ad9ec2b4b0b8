//! The analysis pipeline: warmup replay, player scoring, the real search.

use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use engine_pool::{
    fen, EngineError, EnginePosition, EngineProcess, Personality, PvLine, SearchOutcome,
    SearchParams, Strength,
};
use uci::Score;

use crate::classify::{self, MoveLabel, RiskCutoffs, RiskLevel};
use crate::material::{self, Board};
use crate::AnalysisError;

/// Plies replayed for a pure-suggestion request; enough to seed the engine's
/// caches without paying for the whole game.
const SUGGESTION_WARMUP_PLIES: usize = 8;

/// Fixed shallow depth for warmup searches.
const WARMUP_DEPTH: u32 = 8;

/// What the caller wants out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// A move suggestion at the caller's strength; warmup stays shallow.
    Suggestion,
    /// Post-move quality analysis; the full history is replayed and scored.
    Analysis,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Suggestion => f.write_str("suggestion"),
            RequestKind::Analysis => f.write_str("analysis"),
        }
    }
}

/// A validated analysis request, resolved from a client message.
///
/// Lives for the duration of one request and is never persisted.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Unique per connection, monotonically increasing.
    pub request_id: u64,
    pub kind: RequestKind,
    /// Position to analyze.
    pub fen: String,
    /// Moves already played, from the standard starting position.
    pub moves: Vec<String>,
    pub params: SearchParams,
    /// Target rating for strength limiting and risk cutoffs.
    pub target_elo: u32,
    /// Whether strength limiting applies at all.
    pub limit_strength: bool,
    pub personality: Option<Personality>,
    pub armageddon: bool,
    pub created_at: Instant,
}

/// Timing breakdown attached to every result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub warmup_ms: u64,
    pub search_ms: u64,
    pub total_ms: u64,
}

/// Quality report for one played move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveReport {
    /// Zero-based index into the game's move list.
    pub ply: usize,
    pub played: String,
    pub best: String,
    pub cp_loss: i32,
    pub win_loss: f64,
    pub accuracy: f64,
    pub label: MoveLabel,
    pub risk: RiskLevel,
    pub missed_mate: bool,
    pub material_delta: Option<i32>,
    pub sacrifice: bool,
}

/// Aggregate performance over the requester's replayed moves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerPerformance {
    pub moves_scored: u32,
    pub avg_cp_loss: f64,
    pub accuracy: f64,
    pub best: u32,
    pub excellent: u32,
    pub good: u32,
    pub inaccuracies: u32,
    pub mistakes: u32,
    pub blunders: u32,
}

impl PlayerPerformance {
    pub fn from_reports(reports: &[MoveReport]) -> Self {
        let mut stats = PlayerPerformance::default();
        if reports.is_empty() {
            return stats;
        }
        let mut cp_sum = 0i64;
        let mut accuracy_sum = 0.0;
        for report in reports {
            stats.moves_scored += 1;
            cp_sum += i64::from(report.cp_loss);
            accuracy_sum += report.accuracy;
            match report.label {
                MoveLabel::Best => stats.best += 1,
                MoveLabel::Excellent => stats.excellent += 1,
                MoveLabel::Good => stats.good += 1,
                MoveLabel::Inaccuracy => stats.inaccuracies += 1,
                MoveLabel::Mistake => stats.mistakes += 1,
                MoveLabel::Blunder => stats.blunders += 1,
            }
        }
        let count = f64::from(stats.moves_scored);
        stats.avg_cp_loss = cp_sum as f64 / count;
        stats.accuracy = accuracy_sum / count;
        stats
    }
}

/// Full pipeline output.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub best_move: String,
    /// Rank-1 score from the side to move's perspective.
    pub score: Score,
    pub mate_in: Option<i32>,
    /// Win probability (0-100) for the side to move.
    pub win_rate: f64,
    pub lines: Vec<PvLine>,
    /// Report for the requester's most recent move, when history was scored.
    pub classification: Option<MoveReport>,
    pub performance: Option<PlayerPerformance>,
    pub timing: TimingBreakdown,
}

/// The engine operations the pipeline needs. [`EngineProcess`] is the real
/// implementation; tests drive scripted fakes.
#[async_trait]
pub trait SearchEngine: Send {
    fn current_strength(&self) -> Option<Strength>;
    async fn apply_strength(&mut self, strength: Strength) -> Result<(), EngineError>;
    async fn set_personality(&mut self, personality: Personality) -> Result<(), EngineError>;
    async fn set_armageddon(&mut self, on: bool) -> Result<(), EngineError>;
    async fn new_game(&mut self) -> Result<(), EngineError>;
    async fn search(
        &mut self,
        position: &EnginePosition,
        params: &SearchParams,
        partial: Option<&UnboundedSender<PvLine>>,
    ) -> Result<SearchOutcome, EngineError>;
}

#[async_trait]
impl SearchEngine for EngineProcess {
    fn current_strength(&self) -> Option<Strength> {
        EngineProcess::current_strength(self)
    }

    async fn apply_strength(&mut self, strength: Strength) -> Result<(), EngineError> {
        EngineProcess::apply_strength(self, strength).await
    }

    async fn set_personality(&mut self, personality: Personality) -> Result<(), EngineError> {
        EngineProcess::set_personality(self, personality).await
    }

    async fn set_armageddon(&mut self, on: bool) -> Result<(), EngineError> {
        EngineProcess::set_armageddon(self, on).await
    }

    async fn new_game(&mut self) -> Result<(), EngineError> {
        EngineProcess::new_game(self).await
    }

    async fn search(
        &mut self,
        position: &EnginePosition,
        params: &SearchParams,
        partial: Option<&UnboundedSender<PvLine>>,
    ) -> Result<SearchOutcome, EngineError> {
        match partial {
            Some(tx) => {
                let tx = tx.clone();
                EngineProcess::search(self, position, params, move |line| {
                    let _ = tx.send(line.clone());
                })
                .await
            }
            None => EngineProcess::search(self, position, params, |_| {}).await,
        }
    }
}

/// Run the full pipeline against an acquired engine.
///
/// Resets the engine, configures the caller's strength and style, replays
/// recent history for cache warmup and player scoring, runs the real search,
/// and attaches the timing breakdown. Any failure aborts the pipeline;
/// partial warmup statistics are discarded rather than returned
/// inconsistently.
pub async fn run_analysis<E: SearchEngine>(
    engine: &mut E,
    request: &AnalysisRequest,
    partial: Option<&UnboundedSender<PvLine>>,
) -> Result<AnalysisOutcome, AnalysisError> {
    if request.params.multipv == 0 {
        return Err(AnalysisError::InvalidRequest(
            "multipv must be at least 1".to_string(),
        ));
    }
    fen::validate(&request.fen)?;

    let started = Instant::now();
    engine.new_game().await?;

    let strength = if request.limit_strength {
        Strength::for_elo(request.target_elo)
    } else {
        Strength::Full
    };
    engine.apply_strength(strength).await?;
    engine
        .set_personality(request.personality.unwrap_or(Personality::Default))
        .await?;
    engine.set_armageddon(request.armageddon).await?;

    let warmup_started = Instant::now();
    let mut reports = Vec::new();
    if !request.moves.is_empty() {
        let window = match request.kind {
            RequestKind::Suggestion => request.moves.len().min(SUGGESTION_WARMUP_PLIES),
            RequestKind::Analysis => request.moves.len(),
        };
        let saved = engine.current_strength();
        if request.kind == RequestKind::Analysis {
            // Statistics measure the player against best play.
            engine.apply_strength(Strength::Full).await?;
        }
        let replay = replay_history(engine, request, window).await;
        if request.kind == RequestKind::Analysis {
            if let Some(saved) = saved {
                let restored = engine.apply_strength(saved).await;
                if replay.is_ok() {
                    restored?;
                }
            }
        }
        reports = replay?;
    }
    let warmup_ms = warmup_started.elapsed().as_millis() as u64;

    let search_started = Instant::now();
    let position = if request.moves.is_empty() {
        EnginePosition::from_fen(request.fen.clone())
    } else {
        EnginePosition::from_moves(request.moves.clone())
    };
    let outcome = engine.search(&position, &request.params, partial).await?;
    let search_ms = search_started.elapsed().as_millis() as u64;

    let classification = reports.last().cloned();
    let performance = if reports.is_empty() {
        None
    } else {
        Some(PlayerPerformance::from_reports(&reports))
    };

    debug!(
        request_id = request.request_id,
        kind = %request.kind,
        best = %outcome.best_move,
        warmup_ms,
        search_ms,
        "pipeline complete"
    );

    Ok(AnalysisOutcome {
        win_rate: classify::win_percent(outcome.score),
        mate_in: outcome.score.mate(),
        score: outcome.score,
        best_move: outcome.best_move,
        lines: outcome.lines,
        classification,
        performance,
        timing: TimingBreakdown {
            warmup_ms,
            search_ms,
            total_ms: started.elapsed().as_millis() as u64,
        },
    })
}

/// Replay the last `window` plies one at a time at shallow depth, scoring
/// the plies played by the requester's side along the way.
async fn replay_history<E: SearchEngine>(
    engine: &mut E,
    request: &AnalysisRequest,
    window: usize,
) -> Result<Vec<MoveReport>, AnalysisError> {
    let total = request.moves.len();
    let first = total - window;
    // The requester is the side to move at the request position, so their
    // plies are the ones matching the history length's parity.
    let own_parity = total % 2;
    let cutoffs = RiskCutoffs::for_elo(request.target_elo);

    // Board tracking for material deltas; dropped if the history does not
    // fit the board.
    let mut board = {
        let mut b = Board::startpos();
        let mut ok = true;
        for mv in &request.moves[..first] {
            if b.apply(mv).is_none() {
                ok = false;
                break;
            }
        }
        ok.then_some(b)
    };

    let mut reports = Vec::new();
    // Rank-1 score and best move at the previously replayed position.
    let mut prev: Option<(Score, String)> = None;

    for i in first..=total {
        let position = EnginePosition::from_moves(request.moves[..i].to_vec());
        let outcome = engine
            .search(&position, &SearchParams::depth(WARMUP_DEPTH), None)
            .await?;

        if let Some((best_score, best_move)) = prev.take() {
            let ply = i - 1;
            let played = &request.moves[ply];
            if ply % 2 == own_parity {
                // `best_score` is from the mover's view; the new score is
                // from the opponent's, so flip it back.
                let achieved = outcome.score.flipped();
                let cp_loss = classify::centipawn_loss(best_score, achieved);
                let win_loss = classify::win_percent_loss(best_score, achieved);
                let played_best = *played == best_move;
                let missed_mate = matches!(best_score, Score::Mate(m) if m > 0)
                    && !matches!(achieved, Score::Mate(m) if m > 0);
                let material_delta = board.as_ref().and_then(|b| {
                    let reply = request.moves.get(ply + 1).map(String::as_str);
                    material::material_swing(b, played, reply)
                });
                reports.push(MoveReport {
                    ply,
                    played: played.clone(),
                    best: best_move,
                    cp_loss,
                    win_loss,
                    accuracy: classify::accuracy(win_loss),
                    label: MoveLabel::from_win_loss(win_loss, played_best),
                    risk: cutoffs.level(cp_loss),
                    missed_mate,
                    material_delta,
                    sacrifice: material_delta.is_some_and(|delta| delta < 0),
                });
            }
            board = board.and_then(|mut b| b.apply(played).map(|_| b));
        }

        if i < total {
            prev = Some((outcome.score, outcome.best_move));
        }
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn outcome(score: Score, best: &str) -> SearchOutcome {
        SearchOutcome {
            best_move: best.to_string(),
            ponder: None,
            score,
            depth: WARMUP_DEPTH,
            lines: vec![PvLine {
                multipv: 1,
                depth: WARMUP_DEPTH,
                score,
                pv: vec![best.to_string()],
            }],
            elapsed: Duration::from_millis(1),
        }
    }

    #[derive(Default)]
    struct FakeEngine {
        outcomes: VecDeque<SearchOutcome>,
        fail_on_call: Option<usize>,
        searches: Vec<EnginePosition>,
        strengths: Vec<Strength>,
        current: Option<Strength>,
        new_games: usize,
        personalities: Vec<Personality>,
        armageddon: Vec<bool>,
    }

    impl FakeEngine {
        fn with_outcomes(outcomes: Vec<SearchOutcome>) -> Self {
            Self {
                outcomes: outcomes.into(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SearchEngine for FakeEngine {
        fn current_strength(&self) -> Option<Strength> {
            self.current
        }

        async fn apply_strength(&mut self, strength: Strength) -> Result<(), EngineError> {
            self.strengths.push(strength);
            self.current = Some(strength);
            Ok(())
        }

        async fn set_personality(&mut self, personality: Personality) -> Result<(), EngineError> {
            self.personalities.push(personality);
            Ok(())
        }

        async fn set_armageddon(&mut self, on: bool) -> Result<(), EngineError> {
            self.armageddon.push(on);
            Ok(())
        }

        async fn new_game(&mut self) -> Result<(), EngineError> {
            self.new_games += 1;
            Ok(())
        }

        async fn search(
            &mut self,
            position: &EnginePosition,
            _params: &SearchParams,
            partial: Option<&UnboundedSender<PvLine>>,
        ) -> Result<SearchOutcome, EngineError> {
            if self.fail_on_call == Some(self.searches.len()) {
                return Err(EngineError::EngineProcessDied);
            }
            self.searches.push(position.clone());
            let outcome = self
                .outcomes
                .pop_front()
                .unwrap_or_else(|| outcome(Score::Cp(0), "e2e4"));
            if let Some(tx) = partial {
                for line in &outcome.lines {
                    let _ = tx.send(line.clone());
                }
            }
            Ok(outcome)
        }
    }

    fn request(kind: RequestKind, moves: Vec<&str>) -> AnalysisRequest {
        AnalysisRequest {
            request_id: 1,
            kind,
            fen: STARTPOS.to_string(),
            moves: moves.into_iter().map(String::from).collect(),
            params: SearchParams::depth(12),
            target_elo: 1500,
            limit_strength: true,
            personality: None,
            armageddon: false,
            created_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn no_history_means_no_warmup() {
        let mut engine = FakeEngine::with_outcomes(vec![outcome(Score::Cp(25), "e2e4")]);
        let request = request(RequestKind::Suggestion, vec![]);

        let result = run_analysis(&mut engine, &request, None).await.unwrap();

        assert_eq!(engine.new_games, 1);
        assert_eq!(engine.searches.len(), 1);
        assert!(matches!(engine.searches[0], EnginePosition::Fen { .. }));
        assert_eq!(result.best_move, "e2e4");
        assert!(result.classification.is_none());
        assert!(result.performance.is_none());
    }

    #[tokio::test]
    async fn suggestion_warmup_replays_a_bounded_window() {
        let moves: Vec<&str> = vec![
            "e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "b5a4", "g8f6", "e1g1", "f8e7",
            "f1e1", "b7b5", "a4b3", "d7d6", "c2c3", "e8g8", "h2h3", "c6a5", "b3c2", "c7c5",
        ];
        let total = moves.len();
        let request = request(RequestKind::Suggestion, moves);
        let mut engine = FakeEngine::default();

        run_analysis(&mut engine, &request, None).await.unwrap();

        // window + 1 warmup searches plus the real one.
        assert_eq!(engine.searches.len(), SUGGESTION_WARMUP_PLIES + 2);
        let EnginePosition::Start { moves } = &engine.searches[0] else {
            panic!("warmup should replay from the starting position");
        };
        assert_eq!(moves.len(), total - SUGGESTION_WARMUP_PLIES);
        // The real search uses the full history.
        let EnginePosition::Start { moves } = engine.searches.last().unwrap() else {
            panic!("main search should use the move list");
        };
        assert_eq!(moves.len(), total);
    }

    #[tokio::test]
    async fn suggestion_keeps_caller_strength_through_warmup() {
        let request = request(RequestKind::Suggestion, vec!["e2e4", "e7e5"]);
        let mut engine = FakeEngine::default();

        run_analysis(&mut engine, &request, None).await.unwrap();

        assert_eq!(engine.strengths, vec![Strength::for_elo(1500)]);
        // Style settings are re-applied per request so nothing leaks from
        // the engine's previous tenant.
        assert_eq!(engine.personalities, vec![Personality::Default]);
        assert_eq!(engine.armageddon, vec![false]);
    }

    #[tokio::test]
    async fn analysis_forces_full_strength_and_restores() {
        let request = request(RequestKind::Analysis, vec!["e2e4", "e7e5"]);
        let mut engine = FakeEngine::default();

        run_analysis(&mut engine, &request, None).await.unwrap();

        let limited = Strength::for_elo(1500);
        assert_eq!(engine.strengths, vec![limited, Strength::Full, limited]);
    }

    #[tokio::test]
    async fn player_performance_is_aggregated_from_own_plies() {
        // Four plies; the requester is white (even history length), so plies
        // 0 and 2 are scored.
        let moves = vec!["e2e4", "e7e5", "g1f3", "b8c6"];
        let request = request(RequestKind::Analysis, moves);
        let mut engine = FakeEngine::with_outcomes(vec![
            outcome(Score::Cp(20), "e2e4"),  // before ply 0 (white to move)
            outcome(Score::Cp(-10), "e7e5"), // before ply 1 (black to move)
            outcome(Score::Cp(30), "d2d4"),  // before ply 2
            outcome(Score::Cp(170), "g8f6"), // before ply 3
            outcome(Score::Cp(15), "d2d4"),  // request position
            outcome(Score::Cp(25), "e2e4"),  // real search
        ]);

        let result = run_analysis(&mut engine, &request, None).await.unwrap();

        let performance = result.performance.expect("history was scored");
        assert_eq!(performance.moves_scored, 2);

        // Ply 0: played the engine's choice; achieved 10 vs best 20.
        // Ply 2: played g1f3 while d2d4 kept 30; achieved -170.
        assert_eq!(performance.best, 1);
        assert_eq!(performance.mistakes, 1);
        assert!((performance.avg_cp_loss - 105.0).abs() < 1e-9);

        let classification = result.classification.expect("latest own move scored");
        assert_eq!(classification.ply, 2);
        assert_eq!(classification.played, "g1f3");
        assert_eq!(classification.best, "d2d4");
        assert_eq!(classification.cp_loss, 200);
        assert_eq!(classification.label, MoveLabel::Mistake);
        assert!(!classification.missed_mate);
        assert_eq!(classification.material_delta, Some(0));
        assert!(!classification.sacrifice);
    }

    #[tokio::test]
    async fn missed_mate_is_flagged() {
        // Two plies; requester is white, ply 0 is scored. White had mate in
        // two and played something that only keeps a material edge.
        let moves = vec!["d1h5", "e8e7"];
        let request = request(RequestKind::Analysis, moves);
        let mut engine = FakeEngine::with_outcomes(vec![
            outcome(Score::Mate(2), "d1f7"),
            outcome(Score::Cp(-300), "e8e7"),
            outcome(Score::Cp(350), "h5f7"),
            outcome(Score::Cp(320), "h5f7"),
        ]);

        let result = run_analysis(&mut engine, &request, None).await.unwrap();

        let classification = result.classification.expect("own ply scored");
        assert!(classification.missed_mate);
        assert_eq!(classification.label, MoveLabel::Blunder);
        assert_eq!(classification.cp_loss, crate::CP_LOSS_CAP);
    }

    #[tokio::test]
    async fn partials_stream_only_from_the_real_search() {
        let request = request(RequestKind::Suggestion, vec!["e2e4", "e7e5"]);
        let mut engine = FakeEngine::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_analysis(&mut engine, &request, Some(&tx)).await.unwrap();
        drop(tx);

        let mut streamed = 0;
        while rx.recv().await.is_some() {
            streamed += 1;
        }
        // Three warmup searches ran silently; one line came from the final
        // search's single outcome.
        assert_eq!(engine.searches.len(), 4);
        assert_eq!(streamed, 1);
    }

    #[tokio::test]
    async fn engine_failure_discards_partial_statistics() {
        let request = request(RequestKind::Analysis, vec!["e2e4", "e7e5", "g1f3", "b8c6"]);
        let mut engine = FakeEngine {
            fail_on_call: Some(3),
            ..FakeEngine::default()
        };

        let err = run_analysis(&mut engine, &request, None).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Engine(EngineError::EngineProcessDied)
        ));
    }

    #[tokio::test]
    async fn invalid_fen_fails_before_touching_the_engine() {
        let mut bad = request(RequestKind::Suggestion, vec![]);
        bad.fen = "not a position".to_string();
        let mut engine = FakeEngine::default();

        let err = run_analysis(&mut engine, &bad, None).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Engine(EngineError::InvalidPosition(_))
        ));
        assert_eq!(engine.new_games, 0);
        assert!(engine.searches.is_empty());
    }

    #[tokio::test]
    async fn zero_multipv_is_rejected() {
        let mut bad = request(RequestKind::Suggestion, vec![]);
        bad.params.multipv = 0;
        let mut engine = FakeEngine::default();

        let err = run_analysis(&mut engine, &bad, None).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRequest(_)));
    }
}
