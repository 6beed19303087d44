//! Transaction accounting
//!
//! The coordinator hands out unit-of-work ids and counts outcomes. It takes
//! no part in conflict detection: that is the storage engine's job on the
//! pessimistic path and the adapter's job on the optimistic path.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of transaction counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionMetrics {
    /// Units of work that committed
    pub total_committed: u64,
    /// Units of work that rolled back or were abandoned
    pub total_aborted: u64,
    /// Aborts caused by a lost race (serialization failure or version conflict)
    pub total_conflicts: u64,
    /// Units of work currently open
    pub active_count: u64,
    /// committed / (committed + aborted), 1.0 when nothing finished yet
    pub commit_rate: f64,
}

/// Shared by every unit of work created from one factory
#[derive(Debug)]
pub struct TransactionCoordinator {
    /// Next unit-of-work id
    next_id: AtomicU64,
    active: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicts: AtomicU64,
}

impl TransactionCoordinator {
    /// Create a coordinator with zeroed counters
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Register a new unit of work and return its id
    pub fn begin(&self) -> u64 {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn record_abort(&self) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
    }

    /// Current counters
    pub fn metrics(&self) -> TransactionMetrics {
        let total_committed = self.committed.load(Ordering::SeqCst);
        let total_aborted = self.aborted.load(Ordering::SeqCst);
        let finished = total_committed + total_aborted;
        TransactionMetrics {
            total_committed,
            total_aborted,
            total_conflicts: self.conflicts.load(Ordering::SeqCst),
            active_count: self.active.load(Ordering::SeqCst),
            commit_rate: if finished == 0 {
                1.0
            } else {
                total_committed as f64 / finished as f64
            },
        }
    }
}

impl Default for TransactionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
