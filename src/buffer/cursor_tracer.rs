//! Per-operation page access recorder.

use super::stats::StatsSnapshot;

/// Counts page accesses for one operation.
///
/// Plain counters, no atomics: a tracer belongs to exactly one
/// [`CursorContext`](super::CursorContext) and is only published when that
/// context closes.
#[derive(Debug)]
pub struct PageCursorTracer {
    tag: &'static str,
    counts: StatsSnapshot,
}

impl PageCursorTracer {
    /// Create an empty tracer labelled with `tag`.
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            counts: StatsSnapshot::default(),
        }
    }

    /// Label of the operation this tracer belongs to.
    #[inline]
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// A page was pinned. `hit` is false when it had to be loaded.
    #[inline]
    pub fn pin(&mut self, hit: bool) {
        self.counts.pins += 1;
        if hit {
            self.counts.hits += 1;
        } else {
            self.counts.faults += 1;
        }
    }

    #[inline]
    pub fn unpin(&mut self) {
        self.counts.unpins += 1;
    }

    #[inline]
    pub fn bytes_read(&mut self, bytes: u64) {
        self.counts.bytes_read += bytes;
    }

    #[inline]
    pub fn bytes_written(&mut self, bytes: u64) {
        self.counts.bytes_written += bytes;
    }

    #[inline]
    pub fn eviction(&mut self) {
        self.counts.evictions += 1;
    }

    #[inline]
    pub fn flush(&mut self) {
        self.counts.flushes += 1;
    }

    /// Current counters.
    #[inline]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.counts
    }

    /// Fold counters captured elsewhere (typically on another thread) into
    /// this tracer.
    pub fn merge(&mut self, other: &StatsSnapshot) {
        self.counts.merge(other);
    }

    /// Take the counters, leaving the tracer empty.
    pub(crate) fn drain(&mut self) -> StatsSnapshot {
        std::mem::take(&mut self.counts)
    }
}
