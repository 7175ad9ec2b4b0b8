//! Strength and play-style configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Ratings at or above this ceiling disable strength limiting entirely.
pub const FULL_STRENGTH_ELO: u32 = 3500;

/// Skill range exposed by the engine.
const MIN_SKILL: u8 = 1;
const MAX_SKILL: u8 = 25;

/// Strength setting applied to an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    /// Strength-limited play at the given skill level.
    Limited { skill: u8 },
    /// Full-strength play, no limiting.
    Full,
}

impl Strength {
    /// Map a target rating to a strength setting.
    ///
    /// Uses a clamped linear formula: `skill = clamp(round(elo / 125) - 1, 1, 25)`.
    /// Ratings at or above [`FULL_STRENGTH_ELO`] produce [`Strength::Full`].
    /// The mapping is monotonic in `elo`.
    pub fn for_elo(elo: u32) -> Strength {
        if elo >= FULL_STRENGTH_ELO {
            return Strength::Full;
        }
        let skill = ((f64::from(elo) / 125.0).round() as i64 - 1)
            .clamp(i64::from(MIN_SKILL), i64::from(MAX_SKILL)) as u8;
        Strength::Limited { skill }
    }

    /// The skill level sent to the engine.
    pub fn skill(self) -> u8 {
        match self {
            Strength::Limited { skill } => skill,
            Strength::Full => MAX_SKILL,
        }
    }

    /// Whether strength limiting is active.
    pub fn is_limited(self) -> bool {
        matches!(self, Strength::Limited { .. })
    }
}

/// Named play-style configurations the engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    Default,
    Aggressive,
    Defensive,
    Active,
    Positional,
    Solid,
    Endgame,
    Beginner,
    Human,
}

impl Personality {
    /// Value sent with `setoption name Personality`.
    pub fn as_str(self) -> &'static str {
        match self {
            Personality::Default => "Default",
            Personality::Aggressive => "Aggressive",
            Personality::Defensive => "Defensive",
            Personality::Active => "Active",
            Personality::Positional => "Positional",
            Personality::Solid => "Solid",
            Personality::Endgame => "Endgame",
            Personality::Beginner => "Beginner",
            Personality::Human => "Human",
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Personality {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Personality::Default),
            "aggressive" => Ok(Personality::Aggressive),
            "defensive" => Ok(Personality::Defensive),
            "active" => Ok(Personality::Active),
            "positional" => Ok(Personality::Positional),
            "solid" => Ok(Personality::Solid),
            "endgame" => Ok(Personality::Endgame),
            "beginner" => Ok(Personality::Beginner),
            "human" => Ok(Personality::Human),
            other => Err(EngineError::UnknownPersonality(other.to_string())),
        }
    }
}
