//! Fixed-size engine pool with FIFO acquisition.
//!
//! A pool owns `total` engines of one flavor. `acquire` hands out exclusive
//! leases; callers that find no engine available wait in strict arrival
//! order. Engines that come back dead are replaced transparently while their
//! slot stays busy, so `total == available + busy` holds at all times.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{EngineFlavor, EngineOptions};
use crate::process::EngineProcess;
use crate::EngineError;

/// Interval between attempts to replace a dead engine.
const REPLACE_BACKOFF: Duration = Duration::from_secs(2);

/// An engine that can live in an [`EnginePool`].
pub trait PoolEngine: Send + 'static {
    /// Whether the engine can accept another operation. Engines reporting
    /// `false` when their lease is released are discarded and replaced.
    fn is_ready(&self) -> bool;
}

/// Spawns engines for a pool, both at warmup and as replacements.
#[async_trait]
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: PoolEngine;

    async fn spawn(&self) -> Result<Self::Engine, EngineError>;
}

impl PoolEngine for EngineProcess {
    fn is_ready(&self) -> bool {
        EngineProcess::is_ready(self)
    }
}

/// Spawns UCI engine processes with a flavor's default configuration.
pub struct ProcessFactory {
    flavor: EngineFlavor,
    options: EngineOptions,
}

impl ProcessFactory {
    pub fn new(flavor: EngineFlavor, options: EngineOptions) -> Self {
        Self { flavor, options }
    }
}

#[async_trait]
impl EngineFactory for ProcessFactory {
    type Engine = EngineProcess;

    async fn spawn(&self) -> Result<EngineProcess, EngineError> {
        EngineProcess::spawn(self.flavor, self.options.clone()).await
    }
}

/// Point-in-time pool occupancy, consumed by operational tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
    pub waiting: usize,
}

struct PoolInner<F: EngineFactory> {
    idle: VecDeque<F::Engine>,
    waiters: VecDeque<oneshot::Sender<EngineLease<F>>>,
}

struct PoolShared<F: EngineFactory> {
    flavor: EngineFlavor,
    total: usize,
    factory: F,
    inner: Mutex<PoolInner<F>>,
}

impl<F: EngineFactory> PoolShared<F> {
    fn lock(&self) -> MutexGuard<'_, PoolInner<F>> {
        self.inner.lock().expect("pool lock poisoned")
    }

    /// Return an engine to the pool, handing it straight to the
    /// longest-waiting caller when the queue is non-empty.
    fn release(self: &Arc<Self>, mut engine: F::Engine) {
        loop {
            let waiter = {
                let mut inner = self.lock();
                let Some(waiter) = inner.waiters.pop_front() else {
                    inner.idle.push_back(engine);
                    return;
                };
                waiter
            };
            let lease = EngineLease::new(engine, Arc::clone(self));
            match waiter.send(lease) {
                Ok(()) => return,
                Err(mut stale) => {
                    // The waiter gave up before being served; reclaim the
                    // engine and try the next one in line.
                    match stale.engine.take() {
                        Some(reclaimed) => engine = reclaimed,
                        None => return,
                    }
                }
            }
        }
    }

    /// Route a released engine: back into rotation if usable, otherwise
    /// discard it and spawn a replacement.
    fn handle_release(self: &Arc<Self>, engine: F::Engine) {
        if engine.is_ready() {
            self.release(engine);
        } else {
            info!(flavor = %self.flavor, "discarding unusable engine");
            drop(engine);
            self.spawn_replacement();
        }
    }

    /// Spawn a replacement engine in the background. The slot counts as busy
    /// until the replacement initializes and is released, so waiters absorb
    /// the initialization latency in order.
    fn spawn_replacement(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match shared.factory.spawn().await {
                    Ok(engine) => {
                        debug!(flavor = %shared.flavor, "replacement engine ready");
                        shared.release(engine);
                        return;
                    }
                    Err(err) => {
                        warn!(
                            flavor = %shared.flavor,
                            error = %err,
                            "engine replacement failed; retrying"
                        );
                        tokio::time::sleep(REPLACE_BACKOFF).await;
                    }
                }
            }
        });
    }
}

/// A fixed set of pre-initialized engines of one flavor.
pub struct EnginePool<F: EngineFactory> {
    shared: Arc<PoolShared<F>>,
}

impl<F: EngineFactory> Clone for EnginePool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: EngineFactory> EnginePool<F> {
    /// Spawn and initialize `size` engines up front.
    pub async fn new(flavor: EngineFlavor, factory: F, size: usize) -> Result<Self, EngineError> {
        let mut idle = VecDeque::with_capacity(size);
        for slot in 0..size {
            let engine = factory.spawn().await?;
            debug!(flavor = %flavor, slot, "engine warmed");
            idle.push_back(engine);
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                flavor,
                total: size,
                factory,
                inner: Mutex::new(PoolInner {
                    idle,
                    waiters: VecDeque::new(),
                }),
            }),
        })
    }

    pub fn flavor(&self) -> EngineFlavor {
        self.shared.flavor
    }

    /// Acquire exclusive access to an engine.
    ///
    /// Resolves immediately when one is available, otherwise waits in strict
    /// FIFO order for the next release. Never fails; waiting is bounded only
    /// by the caller's own timeout policy.
    pub async fn acquire(&self) -> EngineLease<F> {
        let receiver = {
            let mut inner = self.shared.lock();
            if let Some(engine) = inner.idle.pop_front() {
                return EngineLease::new(engine, Arc::clone(&self.shared));
            }
            let (sender, receiver) = oneshot::channel();
            inner.waiters.push_back(sender);
            receiver
        };
        receiver
            .await
            .expect("pool dropped while a caller was waiting")
    }

    /// Occupancy snapshot, consistent at the instant of the call.
    pub fn snapshot(&self) -> PoolSnapshot {
        let inner = self.shared.lock();
        let available = inner.idle.len();
        PoolSnapshot {
            total: self.shared.total,
            available,
            busy: self.shared.total - available,
            waiting: inner.waiters.len(),
        }
    }
}

/// Exclusive access to one pooled engine.
///
/// Dropping the lease returns the engine to the pool; if the engine is no
/// longer usable it is discarded and replaced instead.
pub struct EngineLease<F: EngineFactory> {
    engine: Option<F::Engine>,
    shared: Arc<PoolShared<F>>,
}

impl<F: EngineFactory> EngineLease<F> {
    fn new(engine: F::Engine, shared: Arc<PoolShared<F>>) -> Self {
        Self {
            engine: Some(engine),
            shared,
        }
    }

    /// Discard the engine and have the pool spawn a replacement, regardless
    /// of its state.
    pub fn discard(mut self) {
        if let Some(engine) = self.engine.take() {
            drop(engine);
            self.shared.spawn_replacement();
        }
    }
}

impl<F: EngineFactory> Deref for EngineLease<F> {
    type Target = F::Engine;

    fn deref(&self) -> &F::Engine {
        self.engine.as_ref().expect("lease already released")
    }
}

impl<F: EngineFactory> DerefMut for EngineLease<F> {
    fn deref_mut(&mut self) -> &mut F::Engine {
        self.engine.as_mut().expect("lease already released")
    }
}

impl<F: EngineFactory> Drop for EngineLease<F> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.shared.handle_release(engine);
        }
    }
}

/// Pool of UCI engine subprocesses.
pub type UciEnginePool = EnginePool<ProcessFactory>;
