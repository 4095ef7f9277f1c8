//! Page cache statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global page access statistics, aggregated from closed cursor contexts.
///
/// All fields are atomic for lock-free, thread-safe updates. Per-operation
/// counting happens in a [`PageCursorTracer`](super::PageCursorTracer) and
/// only reaches this aggregate when the owning context closes.
///
/// # Memory Ordering
/// `Ordering::Relaxed` everywhere: counters are independent and only need
/// atomicity, not ordering against each other.
///
/// # Example
/// ```
/// use tidemark::buffer::{PageCacheStats, StatsSnapshot};
///
/// let stats = PageCacheStats::new();
/// stats.absorb(&StatsSnapshot { pins: 2, hits: 1, faults: 1, ..Default::default() });
/// assert_eq!(stats.snapshot().pins, 2);
/// ```
#[derive(Debug, Default)]
pub struct PageCacheStats {
    /// Number of page pins.
    pub pins: AtomicU64,

    /// Number of page unpins.
    pub unpins: AtomicU64,

    /// Pins that found the page already cached.
    pub hits: AtomicU64,

    /// Pins that had to load the page from storage.
    pub faults: AtomicU64,

    /// Bytes read from storage.
    pub bytes_read: AtomicU64,

    /// Bytes written to storage.
    pub bytes_written: AtomicU64,

    /// Pages evicted to make room.
    pub evictions: AtomicU64,

    /// Pages flushed.
    pub flushes: AtomicU64,

    /// Cursor contexts merged into this aggregate.
    pub contexts_closed: AtomicU64,
}

impl PageCacheStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one operation's counters into the aggregate.
    pub fn absorb(&self, snapshot: &StatsSnapshot) {
        self.pins.fetch_add(snapshot.pins, Ordering::Relaxed);
        self.unpins.fetch_add(snapshot.unpins, Ordering::Relaxed);
        self.hits.fetch_add(snapshot.hits, Ordering::Relaxed);
        self.faults.fetch_add(snapshot.faults, Ordering::Relaxed);
        self.bytes_read.fetch_add(snapshot.bytes_read, Ordering::Relaxed);
        self.bytes_written.fetch_add(snapshot.bytes_written, Ordering::Relaxed);
        self.evictions.fetch_add(snapshot.evictions, Ordering::Relaxed);
        self.flushes.fetch_add(snapshot.flushes, Ordering::Relaxed);
        self.contexts_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Calculate hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        self.snapshot().hit_ratio()
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pins: self.pins.load(Ordering::Relaxed),
            unpins: self.unpins.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Number of contexts merged so far.
    pub fn contexts_closed(&self) -> u64 {
        self.contexts_closed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.pins.store(0, Ordering::Relaxed);
        self.unpins.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.faults.store(0, Ordering::Relaxed);
        self.bytes_read.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
        self.contexts_closed.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time copy of page access counters.
///
/// Used both for the global aggregate and for moving one operation's
/// counters between threads; snapshots merge by addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub pins: u64,
    pub unpins: u64,
    pub hits: u64,
    pub faults: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub evictions: u64,
    pub flushes: u64,
}

impl StatsSnapshot {
    /// Calculate hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.faults;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Add another snapshot's counters to this one.
    pub fn merge(&mut self, other: &StatsSnapshot) {
        self.pins += other.pins;
        self.unpins += other.unpins;
        self.hits += other.hits;
        self.faults += other.faults;
        self.bytes_read += other.bytes_read;
        self.bytes_written += other.bytes_written;
        self.evictions += other.evictions;
        self.flushes += other.flushes;
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        *self == StatsSnapshot::default()
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ pins: {}, hits: {}, faults: {}, flushes: {}, hit_ratio: {:.2}% }}",
            self.pins,
            self.hits,
            self.faults,
            self.flushes,
            self.hit_ratio() * 100.0
        )
    }
}
