//! Scoped page access context for one operation.
//!
//! A [`CursorContext`] pairs the operation's [`VersionContext`] with a
//! [`PageCursorTracer`]. Closing the context publishes the tracer's counters
//! into the global [`PageCacheStats`]; this is the only way an operation's
//! statistics become visible. Dropping the context closes it, so early
//! returns and unwinding still publish exactly once.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::concurrency::{VersionContext, VersionContextSupplier};

use super::cursor_tracer::PageCursorTracer;
use super::stats::{PageCacheStats, StatsSnapshot};

/// A version context shared by related cursor contexts of one transaction.
///
/// The mutex is uncontended in practice: related contexts belong to the same
/// logical operation and are not used concurrently.
pub type SharedVersionContext = Arc<Mutex<VersionContext>>;

/// Page access context for one operation.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tidemark::buffer::{CursorContextFactory, PageCacheStats};
/// use tidemark::concurrency::{ClosedTransactionTracker, VersionContextSupplier};
///
/// let tracker = Arc::new(ClosedTransactionTracker::new(1));
/// let stats = Arc::new(PageCacheStats::new());
/// let factory = CursorContextFactory::new(Arc::clone(&stats), VersionContextSupplier::new(tracker));
///
/// {
///     let mut ctx = factory.create("lookup");
///     ctx.version_context().init_read();
///     ctx.cursor_tracer_mut().pin(true);
///     // ctx drops here, counters are published
/// }
/// assert_eq!(stats.snapshot().pins, 1);
/// ```
pub struct CursorContext {
    stats: Arc<PageCacheStats>,
    version_context: SharedVersionContext,
    tracer: PageCursorTracer,
    closed: bool,
}

impl CursorContext {
    fn new(
        stats: Arc<PageCacheStats>,
        version_context: SharedVersionContext,
        tag: &'static str,
    ) -> Self {
        Self {
            stats,
            version_context,
            tracer: PageCursorTracer::new(tag),
            closed: false,
        }
    }

    /// Label of the operation.
    #[inline]
    pub fn tag(&self) -> &'static str {
        self.tracer.tag()
    }

    /// Lock the version context for inspection or update.
    #[inline]
    pub fn version_context(&self) -> MutexGuard<'_, VersionContext> {
        self.version_context.lock()
    }

    /// Handle to the version context, for creating contexts that share it.
    pub fn shared_version_context(&self) -> SharedVersionContext {
        Arc::clone(&self.version_context)
    }

    #[inline]
    pub fn cursor_tracer(&self) -> &PageCursorTracer {
        &self.tracer
    }

    #[inline]
    pub fn cursor_tracer_mut(&mut self) -> &mut PageCursorTracer {
        &mut self.tracer
    }

    /// A context for a sub-operation of the same transaction: same version
    /// context, separate tracer.
    pub fn create_related(&self, tag: &'static str) -> CursorContext {
        CursorContext::new(Arc::clone(&self.stats), self.shared_version_context(), tag)
    }

    /// Fold counters captured elsewhere into this context.
    pub fn merge(&mut self, snapshot: &StatsSnapshot) {
        debug_assert!(!self.closed, "merge into closed cursor context '{}'", self.tag());
        self.tracer.merge(snapshot);
    }

    /// Publish this context's counters into the global aggregate.
    ///
    /// Only the first call has an effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let counts = self.tracer.drain();
        tracing::trace!(tag = self.tag(), %counts, "closing cursor context");
        self.stats.absorb(&counts);
    }

    /// Whether [`close`](Self::close) already ran.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for CursorContext {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CursorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorContext")
            .field("tag", &self.tag())
            .field("counts", &self.tracer.snapshot())
            .field("closed", &self.closed)
            .finish()
    }
}

/// The single place cursor contexts are made.
///
/// Owns the global statistics aggregate and the version context supplier,
/// so every context an engine hands out reads the same transaction state and
/// reports into the same statistics.
#[derive(Debug, Clone)]
pub struct CursorContextFactory {
    stats: Arc<PageCacheStats>,
    supplier: VersionContextSupplier,
}

impl CursorContextFactory {
    pub fn new(stats: Arc<PageCacheStats>, supplier: VersionContextSupplier) -> Self {
        Self { stats, supplier }
    }

    /// A context with a fresh version context.
    pub fn create(&self, tag: &'static str) -> CursorContext {
        let version_context = Arc::new(Mutex::new(self.supplier.create_version_context()));
        CursorContext::new(Arc::clone(&self.stats), version_context, tag)
    }

    /// A context reusing the caller's version context.
    pub fn create_with_version_context(
        &self,
        tag: &'static str,
        version_context: SharedVersionContext,
    ) -> CursorContext {
        CursorContext::new(Arc::clone(&self.stats), version_context, tag)
    }

    /// Global statistics aggregate.
    pub fn stats(&self) -> &Arc<PageCacheStats> {
        &self.stats
    }
}
