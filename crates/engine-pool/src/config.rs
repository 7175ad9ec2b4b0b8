//! Engine flavor configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::strength::Personality;
use uci::GoLimit;

/// The kind of engine a pool holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFlavor {
    /// Strength-adjustable engine serving move suggestions.
    Suggestion,
    /// Full-strength engine serving post-move analysis.
    Analysis,
}

impl EngineFlavor {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineFlavor::Suggestion => "suggestion",
            EngineFlavor::Analysis => "analysis",
        }
    }
}

impl fmt::Display for EngineFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for one engine flavor, loaded from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Path to the engine executable.
    pub path: PathBuf,
    /// Number of processes kept warm in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Engine search threads per process.
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Transposition hash size in MiB per process.
    #[serde(default = "default_hash_mb")]
    pub hash_mb: u32,
    /// Target rating applied at startup, if any.
    #[serde(default)]
    pub default_elo: Option<u32>,
    /// Play style applied at startup, if any.
    #[serde(default)]
    pub personality: Option<Personality>,
    /// Timeout overrides.
    #[serde(default)]
    pub timeouts: TimeoutPolicy,
}

fn default_pool_size() -> usize {
    2
}

fn default_threads() -> u32 {
    1
}

fn default_hash_mb() -> u32 {
    128
}

/// Wall-clock budgets for protocol exchanges and searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    /// Budget for the `uci`/`uciok` handshake in milliseconds.
    pub handshake_ms: u64,
    /// Budget for `isready`/`readyok` synchronization in milliseconds.
    pub readiness_ms: u64,
    /// Grace added on top of a movetime-bounded search.
    pub movetime_grace_ms: u64,
    /// Minimum budget for a depth-bounded search.
    pub depth_floor_ms: u64,
    /// Budget per ply of requested depth.
    pub per_depth_ms: u64,
    /// Budget for a node-bounded search.
    pub node_search_ms: u64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            handshake_ms: 10_000,
            readiness_ms: 5_000,
            movetime_grace_ms: 2_000,
            depth_floor_ms: 10_000,
            per_depth_ms: 1_000,
            node_search_ms: 5_000,
        }
    }
}

impl TimeoutPolicy {
    /// Wall-clock budget for a search with the given limit.
    ///
    /// Movetime searches get the requested time plus a fixed grace; depth
    /// searches get `max(floor, depth * per_depth)`; node searches get a
    /// fixed budget.
    pub fn search_budget(&self, limit: GoLimit) -> Duration {
        let ms = match limit {
            GoLimit::MoveTime(ms) => ms + self.movetime_grace_ms,
            GoLimit::Depth(depth) => self.depth_floor_ms.max(u64::from(depth) * self.per_depth_ms),
            GoLimit::Nodes(_) => self.node_search_ms,
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movetime_budget_adds_grace() {
        let policy = TimeoutPolicy::default();
        assert_eq!(
            policy.search_budget(GoLimit::MoveTime(1500)),
            Duration::from_millis(3500)
        );
    }

    #[test]
    fn depth_budget_has_floor() {
        let policy = TimeoutPolicy::default();
        // Shallow searches get the floor, deep searches scale per ply.
        assert_eq!(
            policy.search_budget(GoLimit::Depth(4)),
            Duration::from_millis(10_000)
        );
        assert_eq!(
            policy.search_budget(GoLimit::Depth(18)),
            Duration::from_millis(18_000)
        );
    }

    #[test]
    fn node_budget_is_fixed() {
        let policy = TimeoutPolicy::default();
        assert_eq!(
            policy.search_budget(GoLimit::Nodes(1)),
            policy.search_budget(GoLimit::Nodes(10_000_000))
        );
    }

    #[test]
    fn engine_options_defaults_from_toml() {
        let options: EngineOptions = toml::from_str(r#"path = "/usr/bin/stockfish""#).unwrap();
        assert_eq!(options.pool_size, 2);
        assert_eq!(options.threads, 1);
        assert_eq!(options.hash_mb, 128);
        assert_eq!(options.default_elo, None);
        assert_eq!(options.timeouts, TimeoutPolicy::default());
    }

    #[test]
    fn engine_options_overrides_from_toml() {
        let options: EngineOptions = toml::from_str(
            r#"
path = "/opt/dragon/dragon"
pool_size = 4
threads = 2
hash_mb = 256
default_elo = 1500
personality = "aggressive"

[timeouts]
movetime_grace_ms = 500
"#,
        )
        .unwrap();
        assert_eq!(options.pool_size, 4);
        assert_eq!(options.personality, Some(Personality::Aggressive));
        assert_eq!(options.timeouts.movetime_grace_ms, 500);
        // Unspecified timeout fields keep their defaults.
        assert_eq!(options.timeouts.handshake_ms, 10_000);
    }
}
