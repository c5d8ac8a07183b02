// ============================================================================
// ADMISSION GATE
// ============================================================================
// A resizable counting gate in front of the inference engine.
//
// The gate wraps ONE long-lived tokio semaphore for its whole lifetime. Waiters
// queue on it in FIFO order and are never moved or dropped by a resize:
//
// - grow:   new permits go to the semaphore (after paying off any debt)
// - shrink: idle permits are forgotten; permits still held are recorded as
//           debt and forgotten one by one as their holders release them
//
// Invariant: a permit is only handed out while debt is zero, so a new
// admission can never push occupancy above the current capacity. Permits
// granted before a shrink are never revoked.
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::MAX_CONCURRENCY_LIMIT;

/// Returned by [`AdmissionGate::acquire`] once the gate has been closed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("admission gate is closed")]
pub struct GateClosed;

// ----------------------------------------------------------------------------
// Gate State
// ----------------------------------------------------------------------------

/// Bookkeeping mutated only under the gate lock.
#[derive(Debug)]
struct GateState {
    capacity: u32,
    /// Held permits that must not go back to the semaphore when released.
    debt: u32,
}

struct GateInner {
    semaphore: Arc<Semaphore>,
    state: Mutex<GateState>,
    /// Mirror of `state.capacity` for lock-free reads.
    capacity: AtomicU32,
    in_use: AtomicUsize,
    waiting: AtomicUsize,
    acquired_total: AtomicU64,
    released_total: AtomicU64,
}

/// Point-in-time view of gate accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub capacity: u32,
    pub in_use: usize,
    pub waiting: usize,
    pub acquired_total: u64,
    pub released_total: u64,
    /// Permits still owed to a shrink that happened while they were held.
    pub pending_shrink: u32,
}

// ----------------------------------------------------------------------------
// Admission Gate
// ----------------------------------------------------------------------------

/// Resizable FIFO admission gate. Cloning shares the same gate.
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl AdmissionGate {
    /// Create a gate. A capacity of zero is clamped to one.
    pub fn new(capacity: u32) -> Self {
        let capacity = Self::clamp(i64::from(capacity));
        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(capacity as usize)),
                state: Mutex::new(GateState { capacity, debt: 0 }),
                capacity: AtomicU32::new(capacity),
                in_use: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                acquired_total: AtomicU64::new(0),
                released_total: AtomicU64::new(0),
            }),
        }
    }

    fn clamp(requested: i64) -> u32 {
        requested.clamp(1, i64::from(MAX_CONCURRENCY_LIMIT)) as u32
    }

    /// Wait for a permit under the current capacity.
    ///
    /// Waiters are served in arrival order. The one exception: a permit that
    /// comes back from an abandoned waiter while a shrink is still owed is
    /// retired, and the waiter that drew it queues again behind later
    /// arrivals. Dropping the returned future before it resolves leaves the
    /// gate untouched. The permit is released when the returned guard is
    /// dropped.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        let _waiting = WaitingGuard::enter(&self.inner.waiting);

        loop {
            let permit = self
                .inner
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| GateClosed)?;

            // A permit assigned to an abandoned waiter goes back to the
            // semaphore without passing through `GatePermit::drop`, so it can
            // surface while a shrink is still owed. Retire it and wait again.
            let retired = {
                let mut state = self.inner.state.lock();
                if state.debt > 0 {
                    state.debt -= 1;
                    true
                } else {
                    self.inner.in_use.fetch_add(1, AtomicOrdering::AcqRel);
                    false
                }
            };

            if retired {
                permit.forget();
                continue;
            }

            self.inner.acquired_total.fetch_add(1, AtomicOrdering::Relaxed);
            return Ok(GatePermit {
                permit: Some(permit),
                gate: self.inner.clone(),
            });
        }
    }

    /// Set the capacity to `requested`, clamped to `1..=MAX_CONCURRENCY_LIMIT`.
    ///
    /// Returns the effective capacity. Never revokes granted permits and
    /// never disturbs queued waiters.
    pub fn resize(&self, requested: i64) -> u32 {
        let new_capacity = Self::clamp(requested);
        let mut state = self.inner.state.lock();
        let old_capacity = state.capacity;

        if new_capacity > old_capacity {
            let grow = new_capacity - old_capacity;
            let repaid = grow.min(state.debt);
            state.debt -= repaid;
            self.inner.semaphore.add_permits((grow - repaid) as usize);
        } else if new_capacity < old_capacity {
            let shrink = old_capacity - new_capacity;
            let forgotten = self.inner.semaphore.forget_permits(shrink as usize) as u32;
            state.debt += shrink - forgotten;
        }

        state.capacity = new_capacity;
        self.inner.capacity.store(new_capacity, AtomicOrdering::Release);

        info!(
            target: "aaw::gate",
            requested,
            old = old_capacity,
            new = new_capacity,
            pending_shrink = state.debt,
            "Admission gate resized"
        );

        new_capacity
    }

    /// Current capacity. Lock-free.
    pub fn capacity(&self) -> u32 {
        self.inner.capacity.load(AtomicOrdering::Acquire)
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(AtomicOrdering::Acquire)
    }

    /// Reject every queued and future `acquire`. Held permits stay valid.
    pub fn close(&self) {
        self.inner.semaphore.close();
        info!(target: "aaw::gate", in_use = self.in_use(), "Admission gate closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    pub fn stats(&self) -> GateStats {
        let pending_shrink = self.inner.state.lock().debt;
        GateStats {
            capacity: self.capacity(),
            in_use: self.in_use(),
            waiting: self.inner.waiting.load(AtomicOrdering::Acquire),
            acquired_total: self.inner.acquired_total.load(AtomicOrdering::Relaxed),
            released_total: self.inner.released_total.load(AtomicOrdering::Relaxed),
            pending_shrink,
        }
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("stats", &self.stats())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Permit
// ----------------------------------------------------------------------------

/// A granted admission. Dropping it releases the permit exactly once.
pub struct GatePermit {
    permit: Option<OwnedSemaphorePermit>,
    gate: Arc<GateInner>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };

        // Held across the hand-back so a concurrent resize sees either the
        // permit as in use or as returned, never both.
        let mut state = self.gate.state.lock();
        self.gate.in_use.fetch_sub(1, AtomicOrdering::AcqRel);
        self.gate.released_total.fetch_add(1, AtomicOrdering::Relaxed);

        if state.debt > 0 {
            state.debt -= 1;
            permit.forget();
            debug!(target: "aaw::gate", pending_shrink = state.debt, "Permit retired by shrink");
        } else {
            drop(permit);
        }
    }
}

impl fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePermit")
            .field("held", &self.permit.is_some())
            .finish()
    }
}

/// Keeps the waiting counter right when an `acquire` future is dropped.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, AtomicOrdering::AcqRel);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, AtomicOrdering::AcqRel);
    }
}

// ============================================================================
// TESTS
// ============================================================================
