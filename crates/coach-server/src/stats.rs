//! Operational snapshot endpoints, polled by external tooling.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use analysis::RequestKind;
use engine_pool::PoolSnapshot;

use crate::state::{AppState, QueueSnapshot};

/// Pool and queue occupancy per flavor.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pools: BTreeMap<String, PoolSnapshot>,
    pub queues: BTreeMap<String, QueueSnapshot>,
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "ok"
}

/// `GET /stats`: the true pool/queue state at the instant of the call.
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let mut pools = BTreeMap::new();
    pools.insert(
        state.suggestion_pool.flavor().to_string(),
        state.suggestion_pool.snapshot(),
    );
    pools.insert(
        state.analysis_pool.flavor().to_string(),
        state.analysis_pool.snapshot(),
    );

    let mut queues = BTreeMap::new();
    for kind in [RequestKind::Suggestion, RequestKind::Analysis] {
        queues.insert(kind.to_string(), state.queues.snapshot(kind));
    }

    Json(StatsResponse { pools, queues })
}
