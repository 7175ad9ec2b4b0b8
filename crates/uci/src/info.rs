//! Engine output parsing: search-progress and best-move lines.

use serde::{Deserialize, Serialize};

/// Base for the centipawn-equivalent assigned to mate scores.
const MATE_SCORE_BASE: i32 = 100_000;

/// Score in centipawns or mate distance, from the side to move's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Centipawn score (100 = one pawn advantage).
    Cp(i32),
    /// Mate in N moves (positive = side to move wins).
    Mate(i32),
}

impl Score {
    /// Collapse to a single orderable centipawn value.
    ///
    /// Mate scores map to `sign(mate) * (100000 - |mate| * 1000)` so a nearer
    /// mate outranks a farther one and any mate outranks any ordinary
    /// evaluation.
    pub fn as_centipawns(self) -> i32 {
        match self {
            Score::Cp(cp) => cp,
            Score::Mate(m) => {
                let magnitude = MATE_SCORE_BASE - m.abs() * 1000;
                if m >= 0 {
                    magnitude
                } else {
                    -magnitude
                }
            }
        }
    }

    /// Mate distance, if this is a mate score.
    pub fn mate(self) -> Option<i32> {
        match self {
            Score::Cp(_) => None,
            Score::Mate(m) => Some(m),
        }
    }

    /// The same score seen from the opponent's perspective.
    pub fn flipped(self) -> Score {
        match self {
            Score::Cp(cp) => Score::Cp(-cp),
            Score::Mate(m) => Score::Mate(-m),
        }
    }
}

/// Search information reported by the engine on an `info` line.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchInfo {
    /// Search depth in plies.
    pub depth: Option<u32>,
    /// Selective search depth.
    pub seldepth: Option<u32>,
    /// MultiPV rank of this line. Engines omit the key for rank 1.
    pub multipv: u32,
    /// Score evaluation.
    pub score: Option<Score>,
    /// Nodes searched.
    pub nodes: Option<u64>,
    /// Nodes per second.
    pub nps: Option<u64>,
    /// Time spent in milliseconds.
    pub time: Option<u64>,
    /// Principal variation (best line found).
    pub pv: Vec<String>,
}

impl Default for SearchInfo {
    fn default() -> Self {
        Self {
            depth: None,
            seldepth: None,
            multipv: 1,
            score: None,
            nodes: None,
            nps: None,
            time: None,
            pv: Vec::new(),
        }
    }
}

impl SearchInfo {
    /// Parse an `info` line. Returns `None` for lines that do not start with
    /// the `info` token; unknown keys are skipped.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        if parts.next() != Some("info") {
            return None;
        }

        let parts: Vec<&str> = parts.collect();
        let mut info = SearchInfo::default();
        let mut i = 0;

        while i < parts.len() {
            match parts[i] {
                "depth" => {
                    i += 1;
                    if i < parts.len() {
                        info.depth = parts[i].parse().ok();
                    }
                }
                "seldepth" => {
                    i += 1;
                    if i < parts.len() {
                        info.seldepth = parts[i].parse().ok();
                    }
                }
                "multipv" => {
                    i += 1;
                    if i < parts.len() {
                        if let Ok(rank) = parts[i].parse() {
                            info.multipv = rank;
                        }
                    }
                }
                "score" => {
                    if i + 2 < parts.len() {
                        match parts[i + 1] {
                            "cp" => {
                                if let Ok(cp) = parts[i + 2].parse() {
                                    info.score = Some(Score::Cp(cp));
                                }
                                i += 2;
                            }
                            "mate" => {
                                if let Ok(m) = parts[i + 2].parse() {
                                    info.score = Some(Score::Mate(m));
                                }
                                i += 2;
                            }
                            _ => {}
                        }
                    }
                }
                "nodes" => {
                    i += 1;
                    if i < parts.len() {
                        info.nodes = parts[i].parse().ok();
                    }
                }
                "nps" => {
                    i += 1;
                    if i < parts.len() {
                        info.nps = parts[i].parse().ok();
                    }
                }
                "time" => {
                    i += 1;
                    if i < parts.len() {
                        info.time = parts[i].parse().ok();
                    }
                }
                "pv" => {
                    i += 1;
                    // Collect all remaining moves until another keyword or end
                    while i < parts.len() && !is_info_keyword(parts[i]) {
                        info.pv.push(parts[i].to_string());
                        i += 1;
                    }
                    continue; // Don't increment i again
                }
                _ => {}
            }
            i += 1;
        }

        Some(info)
    }
}

fn is_info_keyword(s: &str) -> bool {
    matches!(
        s,
        "depth"
            | "seldepth"
            | "multipv"
            | "score"
            | "nodes"
            | "nps"
            | "time"
            | "pv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "string"
    )
}

/// Final best-move report from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMove {
    /// The chosen move in UCI notation.
    pub mv: String,
    /// Expected reply the engine would ponder on.
    pub ponder: Option<String>,
}

impl BestMove {
    /// Parse a `bestmove` line (`bestmove e2e4 [ponder e7e5]`).
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().split_whitespace();
        if parts.next() != Some("bestmove") {
            return None;
        }
        let mv = parts.next()?.to_string();
        let ponder = match (parts.next(), parts.next()) {
            (Some("ponder"), Some(p)) => Some(p.to_string()),
            _ => None,
        };
        Some(BestMove { mv, ponder })
    }
}
