//! Point-in-time summary of closed transactions.

use std::fmt;
use std::sync::Arc;

/// Returns true if `tx_id` is in the sorted gap list `not_visible_ids`.
///
/// The list must be sorted and duplicate-free.
#[inline]
pub fn is_not_visible(not_visible_ids: &[u64], tx_id: u64) -> bool {
    if not_visible_ids.is_empty() {
        return false;
    }
    not_visible_ids.binary_search(&tx_id).is_ok()
}

/// Immutable view of which transactions were closed when it was taken.
///
/// - `last_closed_tx_id`: every id at or below it is closed.
/// - `highest_ever_seen`: highest id closed so far, possibly with gaps below.
/// - `not_visible`: ids between the two that are still in flight.
///
/// Snapshot engines only look at `last_closed_tx_id`. Multi-versioned stores
/// use `highest_ever_seen` together with `not_visible`; see
/// [`is_visible`](Self::is_visible).
///
/// Cloning is cheap: the gap list is shared.
#[derive(Clone, PartialEq, Eq)]
pub struct TransactionIdSnapshot {
    last_closed_tx_id: u64,
    highest_ever_seen: u64,
    not_visible: Arc<[u64]>,
}

impl TransactionIdSnapshot {
    /// Build a snapshot from a reverse scan of closed transaction state.
    ///
    /// `not_visible` must already be sorted and duplicate-free; the order is
    /// kept as given.
    pub fn new(last_closed_tx_id: u64, highest_ever_seen: u64, not_visible: Vec<u64>) -> Self {
        debug_assert!(
            not_visible.windows(2).all(|w| w[0] < w[1]),
            "not_visible ids must be sorted and unique"
        );
        debug_assert!(last_closed_tx_id <= highest_ever_seen);
        Self {
            last_closed_tx_id,
            highest_ever_seen,
            not_visible: not_visible.into(),
        }
    }

    /// Snapshot with no transactions in flight below `tx_id`.
    pub fn closed(tx_id: u64) -> Self {
        Self::new(tx_id, tx_id, Vec::new())
    }

    /// Highest id such that every id at or below it is closed.
    #[inline]
    pub fn last_closed_tx_id(&self) -> u64 {
        self.last_closed_tx_id
    }

    /// Highest id observed closed.
    #[inline]
    pub fn highest_ever_seen(&self) -> u64 {
        self.highest_ever_seen
    }

    /// In-flight ids below `highest_ever_seen`, sorted.
    #[inline]
    pub fn not_visible(&self) -> &[u64] {
        &self.not_visible
    }

    /// True when nothing below the high-water mark is in flight.
    #[inline]
    pub fn is_gap_free(&self) -> bool {
        self.not_visible.is_empty()
    }

    /// Multi-versioned visibility of the transaction that produced a version.
    #[inline]
    pub fn is_visible(&self, tx_id: u64) -> bool {
        tx_id <= self.highest_ever_seen && !is_not_visible(&self.not_visible, tx_id)
    }
}

impl fmt::Debug for TransactionIdSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionIdSnapshot")
            .field("last_closed_tx_id", &self.last_closed_tx_id)
            .field("highest_ever_seen", &self.highest_ever_seen)
            .field("not_visible", &&*self.not_visible)
            .finish()
    }
}
