//! Pure numeric move-quality conversions.

use serde::{Deserialize, Serialize};

use engine_pool::FULL_STRENGTH_ELO;
use uci::Score;

/// Per-move centipawn loss is capped so a single catastrophic blunder cannot
/// dominate an average.
pub const CP_LOSS_CAP: i32 = 1000;

/// Sigmoid slope for the centipawn to win-percentage conversion.
const WIN_PERCENT_K: f64 = 0.004;

/// Win percentages assigned to forced mates instead of the sigmoid.
const MATE_WIN_PERCENT: f64 = 99.9;
const MATE_LOSS_PERCENT: f64 = 0.1;

/// Qualitative label for a played move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveLabel {
    Best,
    Excellent,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveLabel {
    /// Classify by win-percentage loss. Upper bounds are inclusive: a loss
    /// of exactly 0.2 is still Best. Playing the engine's top choice is
    /// always Best regardless of the numeric loss.
    pub fn from_win_loss(win_loss: f64, played_best: bool) -> MoveLabel {
        if played_best || win_loss <= 0.2 {
            MoveLabel::Best
        } else if win_loss <= 1.0 {
            MoveLabel::Excellent
        } else if win_loss <= 3.0 {
            MoveLabel::Good
        } else if win_loss <= 8.0 {
            MoveLabel::Inaccuracy
        } else if win_loss <= 20.0 {
            MoveLabel::Mistake
        } else {
            MoveLabel::Blunder
        }
    }
}

/// Centipawn loss of a played move versus the best move, both scores from
/// the mover's perspective. Non-negative and capped at [`CP_LOSS_CAP`].
pub fn centipawn_loss(best: Score, played: Score) -> i32 {
    (best.as_centipawns() - played.as_centipawns()).clamp(0, CP_LOSS_CAP)
}

/// Win probability (0-100) for the side the score is seen from.
///
/// Centipawn scores go through a fixed-slope sigmoid; mate scores map to
/// near-certainty instead.
pub fn win_percent(score: Score) -> f64 {
    match score {
        Score::Mate(m) => {
            if m > 0 {
                MATE_WIN_PERCENT
            } else {
                MATE_LOSS_PERCENT
            }
        }
        Score::Cp(cp) => 100.0 / (1.0 + (-WIN_PERCENT_K * f64::from(cp)).exp()),
    }
}

/// Win-percentage swing of a played move versus the best move, both scores
/// from the mover's perspective. Non-negative.
pub fn win_percent_loss(best: Score, played: Score) -> f64 {
    (win_percent(best) - win_percent(played)).max(0.0)
}

/// Per-move accuracy (0-100) derived from the win-percentage swing.
pub fn accuracy(win_loss: f64) -> f64 {
    (103.1668 * (-0.04354 * win_loss).exp() - 3.1669).clamp(0.0, 100.0)
}

/// Warning level for an evaluation drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
}

/// Blunder-risk cutoffs in centipawns, scaled by target rating:
/// lower-rated targets tolerate larger drops before a warning surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskCutoffs {
    pub low: i32,
    pub medium: i32,
}

impl RiskCutoffs {
    pub fn for_elo(elo: u32) -> RiskCutoffs {
        let clamped = elo.clamp(400, FULL_STRENGTH_ELO) as i32;
        let low = 50 + (FULL_STRENGTH_ELO as i32 - clamped) / 10;
        RiskCutoffs {
            low,
            medium: low * 2,
        }
    }

    pub fn level(&self, cp_loss: i32) -> RiskLevel {
        if cp_loss >= self.medium {
            RiskLevel::Medium
        } else if cp_loss >= self.low {
            RiskLevel::Low
        } else {
            RiskLevel::None
        }
    }
}
