//! Shared server state: engine pools, queue counters, and per-connection
//! request supersession.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use analysis::RequestKind;
use engine_pool::{EngineError, EngineFlavor, EnginePool, ProcessFactory, UciEnginePool};

use crate::config::CoachConfig;

/// Fallback target rating when neither the request nor the flavor config
/// names one.
const DEFAULT_TARGET_ELO: u32 = 1500;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub suggestion_pool: UciEnginePool,
    pub analysis_pool: UciEnginePool,
    pub queues: QueueRegistry,
    defaults: RequestDefaults,
}

#[derive(Clone, Copy)]
struct RequestDefaults {
    suggestion_elo: u32,
    analysis_elo: u32,
}

impl AppState {
    /// Warm both engine pools. Startup fails if any engine cannot
    /// initialize.
    pub async fn initialize(config: &CoachConfig) -> Result<Self, EngineError> {
        let suggestion = &config.engines.suggestion;
        let analysis = &config.engines.analysis;
        let suggestion_pool = EnginePool::new(
            EngineFlavor::Suggestion,
            ProcessFactory::new(EngineFlavor::Suggestion, suggestion.clone()),
            suggestion.pool_size,
        )
        .await?;
        let analysis_pool = EnginePool::new(
            EngineFlavor::Analysis,
            ProcessFactory::new(EngineFlavor::Analysis, analysis.clone()),
            analysis.pool_size,
        )
        .await?;
        Ok(Self {
            suggestion_pool,
            analysis_pool,
            queues: QueueRegistry::default(),
            defaults: RequestDefaults {
                suggestion_elo: suggestion.default_elo.unwrap_or(DEFAULT_TARGET_ELO),
                analysis_elo: analysis.default_elo.unwrap_or(DEFAULT_TARGET_ELO),
            },
        })
    }

    /// The pool serving a request kind.
    pub fn pool_for(&self, kind: RequestKind) -> &UciEnginePool {
        match kind {
            RequestKind::Suggestion => &self.suggestion_pool,
            RequestKind::Analysis => &self.analysis_pool,
        }
    }

    /// Target rating applied when the request does not name one.
    pub fn default_elo(&self, kind: RequestKind) -> u32 {
        match kind {
            RequestKind::Suggestion => self.defaults.suggestion_elo,
            RequestKind::Analysis => self.defaults.analysis_elo,
        }
    }
}

/// Point-in-time request-queue occupancy for one flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// Requests waiting for a pool slot.
    pub pending: usize,
    /// Requests currently holding an engine.
    pub processing: usize,
}

/// Request counters per flavor, kept next to (not inside) the pools so the
/// operational snapshot can report queue depth alongside pool occupancy.
#[derive(Clone, Default)]
pub struct QueueRegistry {
    suggestion: Arc<QueueCounters>,
    analysis: Arc<QueueCounters>,
}

impl QueueRegistry {
    pub fn for_kind(&self, kind: RequestKind) -> &Arc<QueueCounters> {
        match kind {
            RequestKind::Suggestion => &self.suggestion,
            RequestKind::Analysis => &self.analysis,
        }
    }

    pub fn snapshot(&self, kind: RequestKind) -> QueueSnapshot {
        let counters = self.for_kind(kind);
        QueueSnapshot {
            pending: counters.pending.load(Ordering::SeqCst),
            processing: counters.processing.load(Ordering::SeqCst),
        }
    }
}

#[derive(Default)]
pub struct QueueCounters {
    pending: AtomicUsize,
    processing: AtomicUsize,
}

enum QueueStage {
    Pending,
    Processing,
}

impl QueueCounters {
    /// Count a request as waiting for a pool slot until the guard drops.
    pub fn enter_pending(self: &Arc<Self>) -> QueueGuard {
        self.pending.fetch_add(1, Ordering::SeqCst);
        QueueGuard {
            counters: Arc::clone(self),
            stage: QueueStage::Pending,
        }
    }

    /// Count a request as holding an engine until the guard drops.
    pub fn enter_processing(self: &Arc<Self>) -> QueueGuard {
        self.processing.fetch_add(1, Ordering::SeqCst);
        QueueGuard {
            counters: Arc::clone(self),
            stage: QueueStage::Processing,
        }
    }

    fn leave(&self, stage: &QueueStage) {
        match stage {
            QueueStage::Pending => self.pending.fetch_sub(1, Ordering::SeqCst),
            QueueStage::Processing => self.processing.fetch_sub(1, Ordering::SeqCst),
        };
    }
}

/// Decrements its stage counter on drop, so counters stay correct on every
/// exit path, including errors.
pub struct QueueGuard {
    counters: Arc<QueueCounters>,
    stage: QueueStage,
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        self.counters.leave(&self.stage);
    }
}

/// Tracks the newest request id per kind for one connection.
///
/// A client that sends a newer position before a prior request resolves
/// makes the prior request stale; its late result is discarded on arrival.
/// The underlying engine search is never preemptively killed.
#[derive(Clone, Default)]
pub struct CurrentRequests {
    suggestion: Arc<AtomicU64>,
    analysis: Arc<AtomicU64>,
}

impl CurrentRequests {
    /// Mark a request as the newest of its kind. Ids are monotonically
    /// increasing per connection, so an out-of-order arrival never wins.
    pub fn begin(&self, kind: RequestKind, request_id: u64) {
        self.slot(kind).fetch_max(request_id, Ordering::SeqCst);
    }

    /// Whether the request is still the one the client cares about.
    pub fn is_current(&self, kind: RequestKind, request_id: u64) -> bool {
        self.slot(kind).load(Ordering::SeqCst) == request_id
    }

    fn slot(&self, kind: RequestKind) -> &AtomicU64 {
        match kind {
            RequestKind::Suggestion => &self.suggestion,
            RequestKind::Analysis => &self.analysis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let current = CurrentRequests::default();
        current.begin(RequestKind::Suggestion, 1);
        assert!(current.is_current(RequestKind::Suggestion, 1));

        current.begin(RequestKind::Suggestion, 2);
        assert!(!current.is_current(RequestKind::Suggestion, 1));
        assert!(current.is_current(RequestKind::Suggestion, 2));
    }

    #[test]
    fn out_of_order_arrival_does_not_regress() {
        let current = CurrentRequests::default();
        current.begin(RequestKind::Analysis, 5);
        current.begin(RequestKind::Analysis, 3);
        assert!(current.is_current(RequestKind::Analysis, 5));
        assert!(!current.is_current(RequestKind::Analysis, 3));
    }

    #[test]
    fn kinds_are_tracked_independently() {
        let current = CurrentRequests::default();
        current.begin(RequestKind::Suggestion, 10);
        current.begin(RequestKind::Analysis, 2);
        assert!(current.is_current(RequestKind::Suggestion, 10));
        assert!(current.is_current(RequestKind::Analysis, 2));
    }

    #[test]
    fn queue_guards_track_stages() {
        let queues = QueueRegistry::default();
        let counters = queues.for_kind(RequestKind::Suggestion);

        let pending = counters.enter_pending();
        assert_eq!(
            queues.snapshot(RequestKind::Suggestion),
            QueueSnapshot {
                pending: 1,
                processing: 0
            }
        );

        drop(pending);
        let _processing = counters.enter_processing();
        assert_eq!(
            queues.snapshot(RequestKind::Suggestion),
            QueueSnapshot {
                pending: 0,
                processing: 1
            }
        );
        // The other flavor is untouched.
        assert_eq!(
            queues.snapshot(RequestKind::Analysis),
            QueueSnapshot {
                pending: 0,
                processing: 0
            }
        );
    }

    #[test]
    fn queue_guard_releases_on_drop() {
        let queues = QueueRegistry::default();
        let counters = queues.for_kind(RequestKind::Analysis);
        {
            let _guard = counters.enter_processing();
        }
        assert_eq!(queues.snapshot(RequestKind::Analysis).processing, 0);
    }
}
