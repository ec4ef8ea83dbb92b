use crate::{Future, address::RedisUri};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Why a replica is frozen.
///
/// The topology manager only ever produces [`Manager`](FreezeReason::Manager);
/// the pool adapter may freeze nodes for its own reasons, which coexist and
/// are never touched by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FreezeReason {
    /// Frozen by the topology manager
    Manager,
    /// Frozen while its connection is being re-established
    Reconnect,
    /// Frozen after a system failure
    System,
}

/// Contract between the topology manager and the per-node connection pools.
///
/// The manager drives every topology mutation through this trait; the
/// implementation owns connection lifecycles, request routing and its own
/// internal locking.
pub trait NodePools: Send + Sync {
    /// Atomically redirect command routing to a new master.
    ///
    /// On failure the caller rolls back its own master cell.
    fn change_master(&self, new_master: RedisUri) -> Future<'_, ()>;

    /// Add a replica endpoint to the pool.
    fn add_replica(&self, uri: RedisUri) -> Future<'_, ()>;

    fn has_replica(&self, uri: &RedisUri) -> bool;

    /// Freeze a replica. Returns `true` iff the state actually changed.
    fn replica_down(&self, uri: &RedisUri, reason: FreezeReason) -> bool;

    /// Unfreeze a replica. Returns `true` iff the state actually changed.
    fn replica_up(&self, uri: &RedisUri, reason: FreezeReason) -> bool;

    fn is_replica_unfrozen(&self, uri: &RedisUri) -> bool;

    /// Every replica endpoint currently known to the pool.
    fn replica_endpoints(&self) -> Vec<RedisUri>;

    /// The cooperative shutdown barrier guarding topology mutations.
    fn shutdown_gate(&self) -> &ShutdownGate;
}

/// Cooperative shutdown barrier.
///
/// Every topology mutation runs inside an acquired gate; once the gate is
/// closed, [`acquire`](ShutdownGate::acquire) refuses and the caller aborts
/// without mutating.
#[derive(Debug, Default)]
pub struct ShutdownGate {
    closed: AtomicBool,
    active: AtomicUsize,
}

impl ShutdownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gate; `None` once shutdown has begun.
    pub fn acquire(&self) -> Option<GateGuard<'_>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        self.active.fetch_add(1, Ordering::AcqRel);

        if self.closed.load(Ordering::Acquire) {
            self.active.fetch_sub(1, Ordering::AcqRel);
            return None;
        }

        Some(GateGuard(self))
    }

    /// Refuse any further acquisition.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of sections currently inside the gate.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Releases its [`ShutdownGate`] slot on drop.
pub struct GateGuard<'a>(&'a ShutdownGate);

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}
