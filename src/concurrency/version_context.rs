//! Per-operation visibility state.
//!
//! A [`VersionContext`] is created once per logical operation (one per
//! running transaction or read), re-initialized on reuse, and never shared
//! between threads. Two independent pieces of state live on it:
//!
//! - snapshot-engine visibility: the read snapshot's
//!   `last_closed_tx_id`, plus the dirty flag a reader checks at the end of
//!   its operation to decide whether to retry;
//! - multi-versioned visibility: `highest_closed` and the not-visible ids,
//!   plus chain-head tracking for pages whose newest version is invisible.

use std::fmt;
use std::sync::Arc;

use crate::common::NO_TRANSACTION_ID;

use super::snapshot::TransactionIdSnapshot;
use super::tracker::TransactionIdSource;

#[derive(Clone)]
enum Mode {
    Uninitialized,
    Read(TransactionIdSnapshot),
    Write(u64),
}

/// Visibility state machine for one operation.
///
/// # Lifecycle
/// ```text
/// Uninitialized ──init_read()──▶ Read(snapshot)
///       │                          │  ▲
///       └──init_write(tx)──▶ Write(tx) ┘ (either init resets the context)
/// ```
///
/// Accessors for the wrong mode panic: reaching one means the caller's
/// transaction lifecycle is broken.
pub struct VersionContext {
    source: Arc<dyn TransactionIdSource>,
    mode: Mode,
    last_committing_tx_id: u64,
    oldest_visible_transaction_number: u64,
    dirty: bool,
    observed_invisible_head: bool,
    head_version: i64,
}

impl VersionContext {
    /// Create an uninitialized context reading from `source`.
    pub fn new(source: Arc<dyn TransactionIdSource>) -> Self {
        Self {
            source,
            mode: Mode::Uninitialized,
            last_committing_tx_id: NO_TRANSACTION_ID,
            oldest_visible_transaction_number: NO_TRANSACTION_ID,
            dirty: false,
            observed_invisible_head: false,
            head_version: -1,
        }
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Pin this context to the latest closed-transaction snapshot.
    pub fn init_read(&mut self) {
        self.mode = Mode::Read(self.source.snapshot());
        self.reset_operation_state();
    }

    /// Prepare this context for a committing transaction.
    ///
    /// # Panics
    /// Panics if `committing_tx_id` is 0, which is never a valid id.
    pub fn init_write(&mut self, committing_tx_id: u64) {
        assert_ne!(
            committing_tx_id, NO_TRANSACTION_ID,
            "0 is not a valid committing transaction id"
        );
        debug_assert!(
            committing_tx_id >= self.last_committing_tx_id,
            "committing transaction id went backwards: {} -> {}",
            self.last_committing_tx_id,
            committing_tx_id
        );
        self.mode = Mode::Write(committing_tx_id);
        self.last_committing_tx_id = committing_tx_id;
        self.oldest_visible_transaction_number = self.source.oldest_visible_transaction_number();
        self.reset_operation_state();
    }

    fn reset_operation_state(&mut self) {
        self.dirty = false;
        self.reset_obsolete_head_state();
    }

    // ========================================================================
    // Write mode
    // ========================================================================

    /// Whether [`init_write`](Self::init_write) was the last init.
    #[inline]
    pub fn initialized_for_write(&self) -> bool {
        self.committing_tx_id_or_sentinel() != NO_TRANSACTION_ID
    }

    /// Id of the transaction this context is committing.
    ///
    /// # Panics
    /// Panics unless the context was initialized for write.
    pub fn committing_transaction_id(&self) -> u64 {
        match self.mode {
            Mode::Write(tx_id) => tx_id,
            _ => panic!("committing_transaction_id() requires init_write()"),
        }
    }

    fn committing_tx_id_or_sentinel(&self) -> u64 {
        match self.mode {
            Mode::Write(tx_id) => tx_id,
            _ => NO_TRANSACTION_ID,
        }
    }

    /// Floor below which no context needs old versions.
    ///
    /// Refreshed by [`init_write`](Self::init_write).
    #[inline]
    pub fn oldest_visible_transaction_number(&self) -> u64 {
        self.oldest_visible_transaction_number
    }

    // ========================================================================
    // Read mode
    // ========================================================================

    fn read_snapshot(&self, accessor: &str) -> &TransactionIdSnapshot {
        match &self.mode {
            Mode::Read(snapshot) => snapshot,
            _ => panic!("{accessor}() requires init_read()"),
        }
    }

    /// Gap-free closed boundary of the read snapshot. Used by snapshot
    /// engines.
    pub fn last_closed_transaction_id(&self) -> u64 {
        self.read_snapshot("last_closed_transaction_id").last_closed_tx_id()
    }

    /// Highest closed id of the read snapshot. Used by multi-versioned
    /// stores together with [`not_visible_transaction_ids`](Self::not_visible_transaction_ids).
    pub fn highest_closed(&self) -> u64 {
        self.read_snapshot("highest_closed").highest_ever_seen()
    }

    /// Ids below [`highest_closed`](Self::highest_closed) still in flight.
    pub fn not_visible_transaction_ids(&self) -> &[u64] {
        self.read_snapshot("not_visible_transaction_ids").not_visible()
    }

    /// Multi-versioned visibility of a version produced by `tx_id`.
    pub fn is_visible(&self, tx_id: u64) -> bool {
        self.read_snapshot("is_visible").is_visible(tx_id)
    }

    // ========================================================================
    // Dirty tracking
    // ========================================================================

    /// Record that page content from a transaction outside the snapshot was
    /// observed. Stays set until the next init.
    #[inline]
    pub fn mark_as_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether the operation must be retried with a fresh snapshot.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ========================================================================
    // Chain-head tracking
    // ========================================================================

    /// Remember the version at the head of the chain just read.
    #[inline]
    pub fn observed_chain_head(&mut self, head_version: i64) {
        self.head_version = head_version;
    }

    /// The observed chain head was produced by an invisible transaction.
    #[inline]
    pub fn mark_head_invisible(&mut self) {
        self.observed_invisible_head = true;
    }

    /// Whether an invisible chain head was seen during this operation.
    #[inline]
    pub fn invisible_head_observed(&self) -> bool {
        self.observed_invisible_head
    }

    /// Forget chain-head state so the context can be reused.
    #[inline]
    pub fn reset_obsolete_head_state(&mut self) {
        self.observed_invisible_head = false;
        self.head_version = -1;
    }

    /// Version of the invisible chain head.
    ///
    /// # Panics
    /// Panics unless [`invisible_head_observed`](Self::invisible_head_observed)
    /// is true.
    pub fn chain_head_version(&self) -> i64 {
        assert!(
            self.observed_invisible_head,
            "chain_head_version() read without an invisible head"
        );
        self.head_version
    }
}

impl fmt::Debug for VersionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VersionContext");
        match &self.mode {
            Mode::Uninitialized => s.field("mode", &"uninitialized"),
            Mode::Read(snapshot) => s.field("read", snapshot),
            Mode::Write(tx_id) => s.field("write", tx_id),
        };
        s.field("dirty", &self.dirty)
            .field("observed_invisible_head", &self.observed_invisible_head)
            .finish()
    }
}

/// Produces version contexts that all read the same transaction-id source.
#[derive(Clone)]
pub struct VersionContextSupplier {
    source: Arc<dyn TransactionIdSource>,
}

impl VersionContextSupplier {
    /// Wrap a shared transaction-id source.
    pub fn new(source: Arc<dyn TransactionIdSource>) -> Self {
        Self { source }
    }

    /// A fresh, uninitialized context.
    pub fn create_version_context(&self) -> VersionContext {
        VersionContext::new(Arc::clone(&self.source))
    }
}

impl fmt::Debug for VersionContextSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionContextSupplier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Source whose values the test sets directly.
    struct FixedSource {
        snapshot: Mutex<TransactionIdSnapshot>,
        oldest: Mutex<u64>,
    }

    impl FixedSource {
        fn new(snapshot: TransactionIdSnapshot, oldest: u64) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(snapshot),
                oldest: Mutex::new(oldest),
            })
        }
    }

    impl TransactionIdSource for FixedSource {
        fn snapshot(&self) -> TransactionIdSnapshot {
            self.snapshot.lock().clone()
        }

        fn oldest_visible_transaction_number(&self) -> u64 {
            *self.oldest.lock()
        }
    }

    fn context(source: &Arc<FixedSource>) -> VersionContext {
        VersionContextSupplier::new(source.clone()).create_version_context()
    }

    #[test]
    fn test_not_initialized_for_write_before_init() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let ctx = context(&source);
        assert!(!ctx.initialized_for_write());
        assert!(!ctx.is_dirty());
        assert!(!ctx.invisible_head_observed());
    }

    #[test]
    fn test_init_write() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 2);
        let mut ctx = context(&source);

        ctx.init_write(7);
        assert!(ctx.initialized_for_write());
        assert_eq!(ctx.committing_transaction_id(), 7);
        assert_eq!(ctx.oldest_visible_transaction_number(), 2);

        *source.oldest.lock() = 5;
        ctx.init_write(8);
        assert_eq!(ctx.committing_transaction_id(), 8);
        assert_eq!(ctx.oldest_visible_transaction_number(), 5);
    }

    #[test]
    fn test_init_read_captures_snapshot() {
        let source = FixedSource::new(TransactionIdSnapshot::new(10, 14, vec![11, 13]), 1);
        let mut ctx = context(&source);

        ctx.init_read();
        assert!(!ctx.initialized_for_write());
        assert_eq!(ctx.last_closed_transaction_id(), 10);
        assert_eq!(ctx.highest_closed(), 14);
        assert_eq!(ctx.not_visible_transaction_ids(), &[11, 13]);
        assert!(ctx.is_visible(12));
        assert!(!ctx.is_visible(13));

        // Later global progress does not leak into a pinned read
        *source.snapshot.lock() = TransactionIdSnapshot::closed(20);
        assert_eq!(ctx.last_closed_transaction_id(), 10);

        ctx.init_read();
        assert_eq!(ctx.last_closed_transaction_id(), 20);
    }

    #[test]
    fn test_write_after_read_leaves_read_mode() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let mut ctx = context(&source);
        ctx.init_read();
        ctx.init_write(4);
        assert!(ctx.initialized_for_write());
        ctx.init_read();
        assert!(!ctx.initialized_for_write());
    }

    #[test]
    fn test_dirty_is_sticky_until_init() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let mut ctx = context(&source);
        ctx.init_read();

        ctx.mark_as_dirty();
        for _ in 0..5 {
            let _ = ctx.last_closed_transaction_id();
            assert!(ctx.is_dirty());
        }
        ctx.reset_obsolete_head_state();
        assert!(ctx.is_dirty());

        ctx.init_read();
        assert!(!ctx.is_dirty());

        ctx.mark_as_dirty();
        ctx.init_write(9);
        assert!(!ctx.is_dirty());
    }

    #[test]
    fn test_chain_head_tracking() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let mut ctx = context(&source);
        ctx.init_read();

        ctx.observed_chain_head(42);
        assert!(!ctx.invisible_head_observed());

        ctx.mark_head_invisible();
        assert!(ctx.invisible_head_observed());
        assert_eq!(ctx.chain_head_version(), 42);

        ctx.reset_obsolete_head_state();
        assert!(!ctx.invisible_head_observed());
    }

    #[test]
    fn test_init_clears_chain_head_state() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let mut ctx = context(&source);
        ctx.init_read();
        ctx.observed_chain_head(5);
        ctx.mark_head_invisible();

        ctx.init_read();
        assert!(!ctx.invisible_head_observed());
    }

    #[test]
    #[should_panic(expected = "requires init_read")]
    fn test_read_accessor_before_init_panics() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let ctx = context(&source);
        ctx.last_closed_transaction_id();
    }

    #[test]
    #[should_panic(expected = "requires init_read")]
    fn test_read_accessor_in_write_mode_panics() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let mut ctx = context(&source);
        ctx.init_write(4);
        ctx.highest_closed();
    }

    #[test]
    #[should_panic(expected = "requires init_write")]
    fn test_committing_id_in_read_mode_panics() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let mut ctx = context(&source);
        ctx.init_read();
        ctx.committing_transaction_id();
    }

    #[test]
    #[should_panic(expected = "not a valid committing transaction id")]
    fn test_init_write_rejects_sentinel() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let mut ctx = context(&source);
        ctx.init_write(0);
    }

    #[test]
    #[should_panic(expected = "without an invisible head")]
    fn test_chain_head_version_without_invisible_head_panics() {
        let source = FixedSource::new(TransactionIdSnapshot::closed(3), 1);
        let mut ctx = context(&source);
        ctx.init_read();
        ctx.observed_chain_head(3);
        ctx.chain_head_version();
    }
}
