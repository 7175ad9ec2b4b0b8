//! Async wrapper around a single UCI engine subprocess.
//!
//! One [`EngineProcess`] owns exactly one external engine. Operations take
//! `&mut self`, so at most one protocol exchange can be outstanding per
//! process; the pool enforces exclusive hand-out on top of that.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use uci::{BestMove, EngineMessage, GoLimit, GuiCommand, Score};

use crate::config::{EngineFlavor, EngineOptions};
use crate::fen;
use crate::strength::{Personality, Strength};
use crate::EngineError;

/// Protocol state of the wrapped process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Uninitialized,
    HandshakeSent,
    ProtocolAcknowledged,
    Configuring,
    ReadyCheckSent,
    Ready,
    /// A search was abandoned on timeout; the line stream may still carry
    /// output for it, so the process cannot be trusted for further work.
    Unsettled,
    Dead,
}

/// Position handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePosition {
    /// From the standard starting position, after the given moves.
    Start { moves: Vec<String> },
    /// From a raw FEN, after the given moves.
    Fen { fen: String, moves: Vec<String> },
}

impl EnginePosition {
    pub fn startpos() -> Self {
        EnginePosition::Start { moves: Vec::new() }
    }

    pub fn from_moves(moves: Vec<String>) -> Self {
        EnginePosition::Start { moves }
    }

    pub fn from_fen(fen: impl Into<String>) -> Self {
        EnginePosition::Fen {
            fen: fen.into(),
            moves: Vec::new(),
        }
    }

    /// The raw FEN to validate before use, if any.
    pub fn fen(&self) -> Option<&str> {
        match self {
            EnginePosition::Start { .. } => None,
            EnginePosition::Fen { fen, .. } => Some(fen),
        }
    }

    fn to_command(&self) -> GuiCommand {
        match self {
            EnginePosition::Start { moves } => GuiCommand::Position {
                fen: None,
                moves: moves.clone(),
            },
            EnginePosition::Fen { fen, moves } => GuiCommand::Position {
                fen: Some(fen.clone()),
                moves: moves.clone(),
            },
        }
    }
}

/// Parameters for one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub limit: GoLimit,
    pub multipv: u32,
}

impl SearchParams {
    pub fn depth(depth: u32) -> Self {
        Self {
            limit: GoLimit::Depth(depth),
            multipv: 1,
        }
    }

    pub fn movetime(ms: u64) -> Self {
        Self {
            limit: GoLimit::MoveTime(ms),
            multipv: 1,
        }
    }

    pub fn nodes(nodes: u64) -> Self {
        Self {
            limit: GoLimit::Nodes(nodes),
            multipv: 1,
        }
    }

    pub fn with_multipv(mut self, multipv: u32) -> Self {
        self.multipv = multipv.max(1);
        self
    }
}

/// One ranked line from a search.
#[derive(Debug, Clone, PartialEq)]
pub struct PvLine {
    /// MultiPV rank, 1 = best.
    pub multipv: u32,
    /// Depth the line was reported at.
    pub depth: u32,
    /// Score from the side to move's perspective.
    pub score: Score,
    /// Principal variation as a move sequence.
    pub pv: Vec<String>,
}

/// Final result of one search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Best move in UCI notation.
    pub best_move: String,
    /// Expected reply, if the engine reported one.
    pub ponder: Option<String>,
    /// Rank-1 score from the side to move's perspective.
    pub score: Score,
    /// Depth reached by the rank-1 line.
    pub depth: u32,
    /// All lines, ordered by MultiPV rank.
    pub lines: Vec<PvLine>,
    /// Wall-clock time the search took.
    pub elapsed: Duration,
}

impl SearchOutcome {
    /// Mate distance of the rank-1 line, if any.
    pub fn mate_in(&self) -> Option<i32> {
        self.score.mate()
    }
}

/// Owns one external engine process and speaks UCI to it.
#[derive(Debug)]
pub struct EngineProcess {
    flavor: EngineFlavor,
    options: EngineOptions,
    name: String,
    state: ProtocolState,
    strength: Option<Strength>,
    personality: Option<Personality>,
    armageddon: bool,
    multipv: u32,
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl EngineProcess {
    /// Spawn an engine of the given flavor and run the full initialization
    /// sequence: UCI handshake, option configuration, readiness check.
    pub async fn spawn(
        flavor: EngineFlavor,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        if !options.path.exists() {
            return Err(EngineError::NotFound(options.path.display().to_string()));
        }

        let mut child = Command::new(&options.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::InitFailed("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::InitFailed("no stdout pipe".to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let alive_flag = Arc::clone(&alive);
        let (tx, lines) = mpsc::channel(256);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            // EOF or broken pipe: the process is gone.
            alive_flag.store(false, Ordering::SeqCst);
        });

        let mut engine = Self {
            flavor,
            options,
            name: String::new(),
            state: ProtocolState::Uninitialized,
            strength: None,
            personality: None,
            armageddon: false,
            multipv: 1,
            child,
            stdin,
            lines,
            reader,
            alive,
        };

        engine.init().await?;
        Ok(engine)
    }

    async fn init(&mut self) -> Result<(), EngineError> {
        let handshake_ms = self.options.timeouts.handshake_ms;
        let deadline = Instant::now() + Duration::from_millis(handshake_ms);

        self.send(&GuiCommand::Uci).await?;
        self.state = ProtocolState::HandshakeSent;
        loop {
            let Some(line) = self.next_line_by(deadline).await? else {
                return Err(EngineError::InitFailed(format!(
                    "no uciok within {} ms",
                    handshake_ms
                )));
            };
            match EngineMessage::parse(&line) {
                EngineMessage::Id { name: Some(n), .. } => self.name = n,
                EngineMessage::UciOk => break,
                _ => {}
            }
        }
        self.state = ProtocolState::ProtocolAcknowledged;

        self.state = ProtocolState::Configuring;
        let threads = self.options.threads;
        let hash_mb = self.options.hash_mb;
        self.set_option("Threads", threads).await?;
        self.set_option("Hash", hash_mb).await?;
        if let Some(elo) = self.options.default_elo {
            self.apply_strength(Strength::for_elo(elo)).await?;
        }
        if let Some(personality) = self.options.personality {
            self.set_personality(personality).await?;
        }

        self.state = ProtocolState::ReadyCheckSent;
        self.sync().await?;
        self.state = ProtocolState::Ready;
        debug!(flavor = %self.flavor, engine = %self.name, "engine ready");
        Ok(())
    }

    /// Engine name reported during the handshake.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flavor(&self) -> EngineFlavor {
        self.flavor
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Whether the process can accept another operation.
    pub fn is_ready(&self) -> bool {
        self.state == ProtocolState::Ready && self.alive.load(Ordering::SeqCst)
    }

    /// Currently applied strength, if any was set.
    pub fn current_strength(&self) -> Option<Strength> {
        self.strength
    }

    /// Map a target rating to the engine's strength setting and apply it.
    pub async fn set_strength(&mut self, elo: u32) -> Result<(), EngineError> {
        self.apply_strength(Strength::for_elo(elo)).await
    }

    /// Apply a strength setting. Idempotent: re-applying the current
    /// strength sends nothing.
    pub async fn apply_strength(&mut self, target: Strength) -> Result<(), EngineError> {
        if self.strength == Some(target) {
            return Ok(());
        }
        match target {
            Strength::Full => {
                self.set_option("UCI_LimitStrength", "false").await?;
                self.set_option("Skill", target.skill()).await?;
            }
            Strength::Limited { skill } => {
                self.set_option("UCI_LimitStrength", "true").await?;
                self.set_option("Skill", skill).await?;
            }
        }
        self.strength = Some(target);
        Ok(())
    }

    /// Apply a named play style. Idempotent.
    pub async fn set_personality(&mut self, personality: Personality) -> Result<(), EngineError> {
        if self.personality == Some(personality) {
            return Ok(());
        }
        self.set_option("Personality", personality.as_str()).await?;
        self.personality = Some(personality);
        Ok(())
    }

    /// Toggle armageddon scoring. Engines without the option ignore it.
    pub async fn set_armageddon(&mut self, on: bool) -> Result<(), EngineError> {
        if self.armageddon == on {
            return Ok(());
        }
        self.set_option("Armageddon", on).await?;
        self.armageddon = on;
        Ok(())
    }

    /// Reset engine state for a fresh logical game.
    pub async fn new_game(&mut self) -> Result<(), EngineError> {
        self.ensure_ready()?;
        self.send(&GuiCommand::NewGame).await?;
        self.sync().await
    }

    /// Validate the FEN, reset the engine, and run a search on it.
    ///
    /// Fails fast with [`EngineError::InvalidPosition`] before touching the
    /// process if the FEN is malformed.
    pub async fn analyze<F>(
        &mut self,
        fen: &str,
        params: &SearchParams,
        on_partial: F,
    ) -> Result<SearchOutcome, EngineError>
    where
        F: FnMut(&PvLine),
    {
        fen::validate(fen)?;
        self.new_game().await?;
        self.search(&EnginePosition::from_fen(fen), params, on_partial)
            .await
    }

    /// Run a search on a position without resetting engine state, so
    /// consecutive calls share transposition state within one logical game.
    ///
    /// Streams improving rank-1 lines through `on_partial`.
    pub async fn search<F>(
        &mut self,
        position: &EnginePosition,
        params: &SearchParams,
        on_partial: F,
    ) -> Result<SearchOutcome, EngineError>
    where
        F: FnMut(&PvLine),
    {
        self.ensure_ready()?;
        if let Some(fen) = position.fen() {
            fen::validate(fen)?;
        }
        let multipv = params.multipv.max(1);
        if multipv != self.multipv {
            self.set_option("MultiPV", multipv).await?;
            self.multipv = multipv;
        }
        self.send(&position.to_command()).await?;
        self.send(&GuiCommand::Go(params.limit)).await?;
        let budget = self.options.timeouts.search_budget(params.limit);
        self.collect(budget, on_partial).await
    }

    /// Node-bounded search used for quick candidate scoring.
    pub async fn search_nodes(
        &mut self,
        position: &EnginePosition,
        nodes: u64,
    ) -> Result<SearchOutcome, EngineError> {
        self.search(position, &SearchParams::nodes(nodes), |_| {})
            .await
    }

    /// Send `quit` and give the process a moment to exit on its own.
    pub async fn shutdown(mut self) {
        let _ = self.send(&GuiCommand::Quit).await;
        let _ = tokio::time::timeout(Duration::from_millis(500), self.child.wait()).await;
        self.state = ProtocolState::Dead;
    }

    async fn collect<F>(
        &mut self,
        budget: Duration,
        mut on_partial: F,
    ) -> Result<SearchOutcome, EngineError>
    where
        F: FnMut(&PvLine),
    {
        let started = Instant::now();
        let deadline = started + budget;
        // Latest line per MultiPV rank.
        let mut lines: Vec<PvLine> = Vec::new();
        let mut streamed_depth = 0u32;

        loop {
            let Some(line) = self.next_line_by(deadline).await? else {
                // The engine may still emit output for this search, so the
                // line stream can no longer be matched to future requests.
                self.state = ProtocolState::Unsettled;
                warn!(
                    flavor = %self.flavor,
                    budget_ms = budget.as_millis() as u64,
                    "search timed out"
                );
                return Err(EngineError::AnalysisTimeout {
                    budget_ms: budget.as_millis() as u64,
                });
            };

            match EngineMessage::parse(&line) {
                EngineMessage::Info(info) => {
                    let (Some(depth), Some(score)) = (info.depth, info.score) else {
                        continue;
                    };
                    if info.pv.is_empty() {
                        continue;
                    }
                    let pv_line = PvLine {
                        multipv: info.multipv,
                        depth,
                        score,
                        pv: info.pv,
                    };
                    if pv_line.multipv == 1 && depth > streamed_depth {
                        streamed_depth = depth;
                        on_partial(&pv_line);
                    }
                    match lines.iter_mut().find(|l| l.multipv == pv_line.multipv) {
                        Some(existing) => *existing = pv_line,
                        None => lines.push(pv_line),
                    }
                }
                EngineMessage::BestMove(BestMove { mv, ponder }) => {
                    lines.sort_by_key(|l| l.multipv);
                    let (score, depth) = lines
                        .first()
                        .map(|l| (l.score, l.depth))
                        .unwrap_or((Score::Cp(0), 0));
                    return Ok(SearchOutcome {
                        best_move: mv,
                        ponder,
                        score,
                        depth,
                        lines,
                        elapsed: started.elapsed(),
                    });
                }
                _ => {}
            }
        }
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(EngineError::EngineProcessDied);
        }
        match self.state {
            ProtocolState::Ready => Ok(()),
            ProtocolState::Dead => Err(EngineError::EngineProcessDied),
            _ => Err(EngineError::EngineNotReady),
        }
    }

    async fn sync(&mut self) -> Result<(), EngineError> {
        let readiness_ms = self.options.timeouts.readiness_ms;
        let deadline = Instant::now() + Duration::from_millis(readiness_ms);
        self.send(&GuiCommand::IsReady).await?;
        loop {
            let Some(line) = self.next_line_by(deadline).await? else {
                return Err(EngineError::InitFailed(format!(
                    "no readyok within {} ms",
                    readiness_ms
                )));
            };
            if EngineMessage::parse(&line) == EngineMessage::ReadyOk {
                return Ok(());
            }
        }
    }

    async fn set_option(
        &mut self,
        name: &str,
        value: impl std::fmt::Display,
    ) -> Result<(), EngineError> {
        self.send(&GuiCommand::SetOption {
            name: name.to_string(),
            value: value.to_string(),
        })
        .await
    }

    async fn send(&mut self, command: &GuiCommand) -> Result<(), EngineError> {
        if !self.alive.load(Ordering::SeqCst) {
            self.state = ProtocolState::Dead;
            return Err(EngineError::EngineProcessDied);
        }
        let mut line = command.to_uci();
        line.push('\n');
        if self.stdin.write_all(line.as_bytes()).await.is_err()
            || self.stdin.flush().await.is_err()
        {
            self.alive.store(false, Ordering::SeqCst);
            self.state = ProtocolState::Dead;
            return Err(EngineError::EngineProcessDied);
        }
        Ok(())
    }

    /// Next line of engine output, bounded by `deadline`.
    ///
    /// `Ok(None)` means the deadline passed; a closed stream means the
    /// process died.
    async fn next_line_by(&mut self, deadline: Instant) -> Result<Option<String>, EngineError> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        match tokio::time::timeout(deadline - now, self.lines.recv()).await {
            Ok(Some(line)) => Ok(Some(line)),
            Ok(None) => {
                self.state = ProtocolState::Dead;
                Err(EngineError::EngineProcessDied)
            }
            Err(_) => Ok(None),
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.reader.abort();
        // kill_on_drop on the child reaps the subprocess.
    }
}
