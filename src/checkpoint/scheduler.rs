//! Checkpoint polling loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::common::Result;
use crate::io::IoLimiter;

use super::threshold::CheckpointThreshold;

/// The storage side of a checkpoint.
pub trait CheckpointFlusher: Send + Sync {
    /// Id of the last committed transaction.
    fn last_committed_tx_id(&self) -> u64;

    /// Flush and force every dirty page, consulting `limiter` after each
    /// batch of writes.
    fn flush_and_force(&self, limiter: &IoLimiter) -> Result<()>;
}

/// Polls a [`CheckpointThreshold`] and runs checkpoints when it is reached.
///
/// Checkpoints are serialized, threshold decisions included, so
/// `checkpoint_happened` is only ever called by one thread at a time,
/// strictly after its flush completed, and with non-decreasing ids.
pub struct CheckpointScheduler<F> {
    threshold: CheckpointThreshold,
    limiter: Arc<IoLimiter>,
    flusher: F,
    checkpoint_lock: Mutex<()>,
    last_checkpointed: AtomicU64,
}

impl<F: CheckpointFlusher> CheckpointScheduler<F> {
    pub fn new(threshold: CheckpointThreshold, limiter: Arc<IoLimiter>, flusher: F) -> Self {
        Self {
            threshold,
            limiter,
            flusher,
            checkpoint_lock: Mutex::new(()),
            last_checkpointed: AtomicU64::new(0),
        }
    }

    /// Set the baseline from the store's last checkpoint.
    pub fn initialize(&self, tx_id: u64) {
        self.threshold.initialize(tx_id);
        self.last_checkpointed.store(tx_id, Ordering::Release);
    }

    /// Check the threshold once and checkpoint if it is reached.
    ///
    /// The decision is made under the checkpoint lock, so a checkpoint that
    /// completes in the meantime is always seen.
    ///
    /// Returns the checkpointed transaction id, or `None` if nothing was due.
    ///
    /// # Errors
    /// Returns the flusher's error. The baseline is left where it was, so
    /// the next poll tries again.
    pub fn tick(&self) -> Result<Option<u64>> {
        let _serialized = self.checkpoint_lock.lock();
        let last_committed = self.flusher.last_committed_tx_id();
        if !self.threshold.threshold_reached(last_committed) {
            return Ok(None);
        }
        let reason = self.threshold.description();
        self.checkpoint(last_committed, &reason).map(Some)
    }

    /// Checkpoint now, with I/O limiting off for its duration.
    pub fn force_checkpoint(&self, reason: &str) -> Result<u64> {
        let _rush = self.limiter.begin_temporary_rush();
        let _serialized = self.checkpoint_lock.lock();
        let last_committed = self.flusher.last_committed_tx_id();
        self.checkpoint(last_committed, reason)
    }

    /// Flush and move the baseline. Caller holds `checkpoint_lock`.
    ///
    /// The baseline never moves backwards: if `tx_id` is older than the last
    /// checkpoint, the pages are still flushed but the threshold is left
    /// alone and the newer id is returned.
    fn checkpoint(&self, tx_id: u64, reason: &str) -> Result<u64> {
        tracing::info!(tx_id, reason, "checkpoint started");
        let started = Instant::now();

        if let Err(err) = self.flusher.flush_and_force(&self.limiter) {
            tracing::error!(tx_id, error = %err, "checkpoint failed");
            return Err(err);
        }

        let previous = self.last_checkpointed.fetch_max(tx_id, Ordering::AcqRel);
        if tx_id < previous {
            tracing::warn!(tx_id, previous, "checkpoint older than the last one, baseline kept");
            return Ok(previous);
        }
        self.threshold.checkpoint_happened(tx_id);
        tracing::info!(tx_id, elapsed = ?started.elapsed(), "checkpoint completed");
        Ok(tx_id)
    }

    /// Poll until `stop` is set.
    ///
    /// Sleeps [`check_frequency_millis`](CheckpointThreshold::check_frequency_millis)
    /// between polls; set `stop` and unpark the running thread to end early.
    pub fn run(&self, stop: &AtomicBool) {
        while !stop.load(Ordering::Acquire) {
            // Failures are logged in checkpoint(); the next poll retries.
            let _ = self.tick();
            if stop.load(Ordering::Acquire) {
                break;
            }
            std::thread::park_timeout(Duration::from_millis(
                self.threshold.check_frequency_millis(),
            ));
        }
    }

    /// Transaction id of the last successful checkpoint.
    pub fn last_checkpointed_tx_id(&self) -> u64 {
        self.last_checkpointed.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> &CheckpointThreshold {
        &self.threshold
    }

    pub fn limiter(&self) -> &Arc<IoLimiter> {
        &self.limiter
    }

    pub fn flusher(&self) -> &F {
        &self.flusher
    }
}

impl<F> fmt::Debug for CheckpointScheduler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointScheduler")
            .field("threshold", &self.threshold)
            .field("limiter", &self.limiter)
            .field("last_checkpointed", &self.last_checkpointed.load(Ordering::Relaxed))
            .finish()
    }
}
