//! Global closed-transaction state.
//!
//! Every transaction start reads this state, so reads must never block:
//! the current [`TransactionIdSnapshot`] is published through an
//! epoch-protected atomic pointer and readers only pin, load and clone.
//! Writers (transaction close) are serialized by a mutex and swap in a new
//! snapshot; the old one is reclaimed once no reader can still hold it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use parking_lot::Mutex;

use super::snapshot::TransactionIdSnapshot;

/// Where version contexts get their view of global transaction state.
///
/// Implemented by [`ClosedTransactionTracker`]. Tests can implement it with
/// fixed values to get deterministic snapshots.
pub trait TransactionIdSource: Send + Sync {
    /// Current closed-transaction snapshot.
    fn snapshot(&self) -> TransactionIdSnapshot;

    /// Ids below this are not needed by any open context.
    fn oldest_visible_transaction_number(&self) -> u64;
}

#[derive(Debug)]
struct CloseState {
    last_closed: u64,
    highest_seen: u64,
    /// Ids below `highest_seen` that have not closed yet.
    in_flight: BTreeSet<u64>,
}

/// Tracks closed transactions and publishes snapshots of them.
///
/// # Example
/// ```
/// use tidemark::concurrency::{ClosedTransactionTracker, TransactionIdSource};
///
/// let tracker = ClosedTransactionTracker::new(1);
/// let a = tracker.next_committing_tx_id();
/// let b = tracker.next_committing_tx_id();
///
/// tracker.transaction_closed(b);
/// let snapshot = tracker.snapshot();
/// assert_eq!(snapshot.last_closed_tx_id(), 1);
/// assert_eq!(snapshot.not_visible(), &[a]);
///
/// tracker.transaction_closed(a);
/// assert_eq!(tracker.snapshot().last_closed_tx_id(), b);
/// ```
pub struct ClosedTransactionTracker {
    next_tx_id: AtomicU64,
    oldest_visible: AtomicU64,
    state: Mutex<CloseState>,
    current: Atomic<TransactionIdSnapshot>,
}

impl ClosedTransactionTracker {
    /// Start tracking from a store whose transactions are closed up to and
    /// including `last_closed_tx_id`.
    pub fn new(last_closed_tx_id: u64) -> Self {
        Self {
            next_tx_id: AtomicU64::new(last_closed_tx_id + 1),
            oldest_visible: AtomicU64::new(last_closed_tx_id),
            state: Mutex::new(CloseState {
                last_closed: last_closed_tx_id,
                highest_seen: last_closed_tx_id,
                in_flight: BTreeSet::new(),
            }),
            current: Atomic::new(TransactionIdSnapshot::closed(last_closed_tx_id)),
        }
    }

    /// Allocate the id for a committing transaction.
    #[inline]
    pub fn next_committing_tx_id(&self) -> u64 {
        self.next_tx_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record that `tx_id` has closed.
    ///
    /// Returns false, and changes nothing, if the id was already closed.
    pub fn transaction_closed(&self, tx_id: u64) -> bool {
        let mut locked = self.state.lock();
        let state = &mut *locked;
        let reopened_gap = tx_id <= state.highest_seen && !state.in_flight.remove(&tx_id);
        if tx_id <= state.last_closed || reopened_gap {
            tracing::warn!(tx_id, last_closed = state.last_closed, "transaction closed twice");
            return false;
        }
        if tx_id > state.highest_seen {
            state.in_flight.extend(state.highest_seen + 1..tx_id);
            state.highest_seen = tx_id;
        }
        state.last_closed = match state.in_flight.first() {
            Some(&oldest) => oldest - 1,
            None => state.highest_seen,
        };

        let gaps: Vec<u64> = state.in_flight.iter().copied().collect();
        let snapshot = TransactionIdSnapshot::new(state.last_closed, state.highest_seen, gaps);
        tracing::trace!(?snapshot, "publishing closed transaction snapshot");

        // Publish while still holding the lock so snapshots never go backwards.
        let guard = epoch::pin();
        let previous = self.current.swap(Owned::new(snapshot), Ordering::AcqRel, &guard);
        // SAFETY: `previous` is no longer reachable through `current`; readers
        // that loaded it are pinned and reclamation waits for them.
        unsafe { guard.defer_destroy(previous) };
        true
    }

    /// Raise the oldest-visible transaction number. Never moves it backwards.
    pub fn advance_oldest_visible(&self, tx_id: u64) {
        self.oldest_visible.fetch_max(tx_id, Ordering::AcqRel);
    }

    /// Shortcut for `snapshot().last_closed_tx_id()`.
    pub fn last_closed_tx_id(&self) -> u64 {
        self.snapshot().last_closed_tx_id()
    }
}

impl TransactionIdSource for ClosedTransactionTracker {
    fn snapshot(&self) -> TransactionIdSnapshot {
        let guard = epoch::pin();
        let current = self.current.load(Ordering::Acquire, &guard);
        // SAFETY: `current` is never null and is only destroyed after every
        // guard pinned before its replacement has been dropped.
        unsafe { current.deref() }.clone()
    }

    fn oldest_visible_transaction_number(&self) -> u64 {
        self.oldest_visible.load(Ordering::Acquire)
    }
}

impl Drop for ClosedTransactionTracker {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can be reading `current`.
        unsafe {
            let current = self.current.load(Ordering::Relaxed, epoch::unprotected());
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

impl fmt::Debug for ClosedTransactionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosedTransactionTracker")
            .field("next_tx_id", &self.next_tx_id.load(Ordering::Relaxed))
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
