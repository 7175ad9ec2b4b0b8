//! Integration tests driving [`EngineProcess`] and [`EnginePool`] against
//! scripted shell stand-ins, so no real chess engine is required.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use engine_pool::{
    EngineError, EngineFlavor, EngineOptions, EnginePool, EnginePosition, EngineProcess,
    ProcessFactory, SearchParams, TimeoutPolicy,
};

static SCRIPT_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Write an executable stand-in engine script to a unique temp path.
fn write_script(body: &str) -> PathBuf {
    let n = SCRIPT_SEQ.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "coach-engine-stub-{}-{}.sh",
        std::process::id(),
        n
    ));
    fs::write(&path, body).expect("write stub script");
    let mut perms = fs::metadata(&path).expect("stat stub script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod stub script");
    path
}

fn options(path: PathBuf, timeouts: TimeoutPolicy) -> EngineOptions {
    EngineOptions {
        path,
        pool_size: 1,
        threads: 1,
        hash_mb: 16,
        default_elo: None,
        personality: None,
        timeouts,
    }
}

/// Answers the handshake and every search with two info lines and a bestmove.
const WELL_BEHAVED: &str = r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name ScriptedFish"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*)
      echo "info depth 1 multipv 1 score cp 13 nodes 100 pv e2e4 e7e5"
      echo "info depth 2 multipv 1 score cp 21 nodes 300 pv d2d4 d7d5"
      echo "bestmove d2d4 ponder d7d5"
      ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Dies as soon as a search starts.
const DIES_ON_GO: &str = r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name DyingFish"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*) exit 7 ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Never answers a search.
const HANGS_ON_GO: &str = r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name SleepyFish"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*) sleep 30 ;;
    quit) exit 0 ;;
  esac
done
"#;

fn tiny_budgets() -> TimeoutPolicy {
    TimeoutPolicy {
        depth_floor_ms: 50,
        per_depth_ms: 1,
        movetime_grace_ms: 50,
        node_search_ms: 50,
        ..TimeoutPolicy::default()
    }
}

#[tokio::test]
async fn handshake_search_and_partials() {
    let path = write_script(WELL_BEHAVED);
    let mut engine = EngineProcess::spawn(EngineFlavor::Analysis, options(path, TimeoutPolicy::default()))
        .await
        .expect("spawn stub engine");
    assert_eq!(engine.name(), "ScriptedFish");
    assert!(engine.is_ready());

    engine.new_game().await.expect("new game");

    let mut partial_depths = Vec::new();
    let outcome = engine
        .search(
            &EnginePosition::startpos(),
            &SearchParams::depth(2),
            |line| partial_depths.push(line.depth),
        )
        .await
        .expect("search");

    assert_eq!(outcome.best_move, "d2d4");
    assert_eq!(outcome.ponder.as_deref(), Some("d7d5"));
    assert_eq!(outcome.depth, 2);
    assert_eq!(outcome.mate_in(), None);
    // One partial per improving depth.
    assert_eq!(partial_depths, vec![1, 2]);

    // Node-bounded candidate scoring runs through the same parsing path.
    let outcome = engine
        .search_nodes(&EnginePosition::startpos(), 50_000)
        .await
        .expect("node-bounded search");
    assert_eq!(outcome.best_move, "d2d4");

    engine.shutdown().await;
}

#[tokio::test]
async fn analyze_rejects_bad_fen_before_searching() {
    let path = write_script(WELL_BEHAVED);
    let mut engine = EngineProcess::spawn(EngineFlavor::Suggestion, options(path, TimeoutPolicy::default()))
        .await
        .expect("spawn stub engine");

    let err = engine
        .analyze("not a position", &SearchParams::depth(2), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPosition(_)));
    // The process is untouched and still usable.
    assert!(engine.is_ready());
    engine.shutdown().await;
}

#[tokio::test]
async fn death_mid_search_rejects_with_process_died() {
    let path = write_script(DIES_ON_GO);
    let mut engine = EngineProcess::spawn(EngineFlavor::Analysis, options(path, TimeoutPolicy::default()))
        .await
        .expect("spawn stub engine");

    let err = engine
        .search(&EnginePosition::startpos(), &SearchParams::depth(4), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EngineProcessDied));
    assert!(!engine.is_ready());
}

#[tokio::test]
async fn timed_out_search_rejects_once_and_leaves_engine_not_ready() {
    let path = write_script(HANGS_ON_GO);
    let mut engine = EngineProcess::spawn(EngineFlavor::Analysis, options(path, tiny_budgets()))
        .await
        .expect("spawn stub engine");

    let err = engine
        .search(&EnginePosition::startpos(), &SearchParams::depth(18), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AnalysisTimeout { .. }));

    // The wrapper does not restart the process; it just refuses further work.
    assert!(!engine.is_ready());
    let err = engine
        .search(&EnginePosition::startpos(), &SearchParams::depth(2), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EngineNotReady));
}

#[tokio::test]
async fn pool_replaces_timed_out_engine_without_deadlock() {
    let path = write_script(HANGS_ON_GO);
    let factory = ProcessFactory::new(EngineFlavor::Analysis, options(path, tiny_budgets()));
    let pool = EnginePool::new(EngineFlavor::Analysis, factory, 1)
        .await
        .expect("warm pool");

    let mut lease = pool.acquire().await;
    let err = lease
        .search(&EnginePosition::startpos(), &SearchParams::depth(18), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AnalysisTimeout { .. }));
    // Dropping the lease discards the unsettled engine and spawns a
    // replacement; the next acquire waits for it instead of deadlocking.
    drop(lease);

    let mut replacement = tokio::time::timeout(Duration::from_secs(5), pool.acquire())
        .await
        .expect("acquire should succeed against the replacement");
    assert!(replacement.is_ready());
    replacement.new_game().await.expect("replacement is usable");
    drop(replacement);

    let snap = pool.snapshot();
    assert_eq!(snap.total, snap.available + snap.busy);
}

#[tokio::test]
async fn pool_replaces_crashed_engine() {
    let path = write_script(DIES_ON_GO);
    let factory = ProcessFactory::new(EngineFlavor::Suggestion, options(path, TimeoutPolicy::default()));
    let pool = EnginePool::new(EngineFlavor::Suggestion, factory, 1)
        .await
        .expect("warm pool");

    let mut lease = pool.acquire().await;
    let err = lease
        .search(&EnginePosition::startpos(), &SearchParams::depth(4), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EngineProcessDied));
    drop(lease);

    let replacement = tokio::time::timeout(Duration::from_secs(5), pool.acquire())
        .await
        .expect("acquire should succeed against a fresh process");
    assert_eq!(replacement.name(), "DyingFish");
    assert!(replacement.is_ready());
}

#[tokio::test]
async fn spawn_rejects_missing_executable() {
    let err = EngineProcess::spawn(
        EngineFlavor::Suggestion,
        options(PathBuf::from("/nonexistent/engine"), TimeoutPolicy::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}
