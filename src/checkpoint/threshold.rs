//! Checkpoint threshold policies.
//!
//! A threshold decides, from the id of the last committed transaction,
//! whether enough has happened since the last checkpoint to warrant another
//! one, and how often it wants to be asked. The scheduler thread is the only
//! writer (`initialize`, `checkpoint_happened`); `threshold_reached` is a
//! pure read and may be called at any rate.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::config::{CONTINUOUS_CHECKING_FREQUENCY_MILLIS, DEFAULT_CHECKING_FREQUENCY_MILLIS};
use crate::common::{CheckpointPolicy, Result, Settings, BASE_TX_ID};
use crate::io::IoClock;

/// Transaction log pruning, as seen by the volumetric policy.
pub trait LogPruning: Send + Sync {
    /// True when pruning is held back only by a missing checkpoint.
    fn might_have_logs_to_prune(&self) -> bool;
}

/// Checkpoint after every commit.
#[derive(Debug)]
pub struct ContinuousThreshold {
    next_target: AtomicU64,
}

impl ContinuousThreshold {
    pub fn new() -> Self {
        Self {
            next_target: AtomicU64::new(BASE_TX_ID),
        }
    }

    fn reset(&self, tx_id: u64) {
        self.next_target.store(tx_id + 1, Ordering::Release);
    }

    fn reached(&self, last_committed_tx_id: u64) -> bool {
        last_committed_tx_id >= self.next_target.load(Ordering::Acquire)
    }
}

impl Default for ContinuousThreshold {
    fn default() -> Self {
        Self::new()
    }
}

/// Checkpoint when log pruning is waiting on one. All state lives in the
/// pruning collaborator.
pub struct VolumetricThreshold {
    pruning: Arc<dyn LogPruning>,
}

impl VolumetricThreshold {
    pub fn new(pruning: Arc<dyn LogPruning>) -> Self {
        Self { pruning }
    }
}

impl fmt::Debug for VolumetricThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumetricThreshold").finish_non_exhaustive()
    }
}

/// Checkpoint every `interval_tx` transactions, or every `interval_time` if
/// anything committed at all, whichever comes first.
pub struct PeriodicThreshold {
    interval_tx: u64,
    interval_time: Duration,
    clock: Arc<dyn IoClock>,
    last_tx_id: AtomicU64,
    last_millis: AtomicU64,
}

impl PeriodicThreshold {
    pub fn new(interval_tx: u64, interval_time: Duration, clock: Arc<dyn IoClock>) -> Self {
        let now = clock.now_millis();
        Self {
            interval_tx: interval_tx.max(1),
            interval_time,
            clock,
            last_tx_id: AtomicU64::new(BASE_TX_ID),
            last_millis: AtomicU64::new(now),
        }
    }

    fn reset(&self, tx_id: u64) {
        self.last_millis.store(self.clock.now_millis(), Ordering::Release);
        self.last_tx_id.store(tx_id, Ordering::Release);
    }

    fn reached(&self, last_committed_tx_id: u64) -> bool {
        let since = last_committed_tx_id.saturating_sub(self.last_tx_id.load(Ordering::Acquire));
        if since >= self.interval_tx {
            return true;
        }
        let elapsed = self
            .clock
            .now_millis()
            .saturating_sub(self.last_millis.load(Ordering::Acquire));
        since > 0 && elapsed >= self.interval_time.as_millis() as u64
    }

    fn frequency_millis(&self) -> u64 {
        (self.interval_time.as_millis() as u64)
            .clamp(CONTINUOUS_CHECKING_FREQUENCY_MILLIS, DEFAULT_CHECKING_FREQUENCY_MILLIS)
    }
}

impl fmt::Debug for PeriodicThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicThreshold")
            .field("interval_tx", &self.interval_tx)
            .field("interval_time", &self.interval_time)
            .field("last_tx_id", &self.last_tx_id.load(Ordering::Relaxed))
            .finish()
    }
}

/// The checkpoint policy of one store.
#[derive(Debug)]
pub enum CheckpointThreshold {
    Continuous(ContinuousThreshold),
    Volumetric(VolumetricThreshold),
    Periodic(PeriodicThreshold),
}

impl CheckpointThreshold {
    pub fn continuous() -> Self {
        CheckpointThreshold::Continuous(ContinuousThreshold::new())
    }

    pub fn volumetric(pruning: Arc<dyn LogPruning>) -> Self {
        CheckpointThreshold::Volumetric(VolumetricThreshold::new(pruning))
    }

    pub fn periodic(interval_tx: u64, interval_time: Duration, clock: Arc<dyn IoClock>) -> Self {
        CheckpointThreshold::Periodic(PeriodicThreshold::new(interval_tx, interval_time, clock))
    }

    /// Build the policy the settings ask for.
    ///
    /// # Errors
    /// `Error::InvalidSetting` if the settings fail validation.
    pub fn from_settings(
        settings: &Settings,
        pruning: Arc<dyn LogPruning>,
        clock: Arc<dyn IoClock>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(match settings.checkpoint_policy {
            CheckpointPolicy::Continuous => Self::continuous(),
            CheckpointPolicy::Volumetric => Self::volumetric(pruning),
            CheckpointPolicy::Periodic => Self::periodic(
                settings.checkpoint_interval_tx,
                settings.checkpoint_interval_time,
                clock,
            ),
        })
    }

    /// Set the baseline as if a checkpoint had just happened at `tx_id`.
    pub fn initialize(&self, tx_id: u64) {
        match self {
            CheckpointThreshold::Continuous(t) => t.reset(tx_id),
            CheckpointThreshold::Volumetric(_) => {}
            CheckpointThreshold::Periodic(t) => t.reset(tx_id),
        }
    }

    /// A checkpoint at `tx_id` completed. Scheduler thread only.
    pub fn checkpoint_happened(&self, tx_id: u64) {
        match self {
            CheckpointThreshold::Continuous(t) => t.reset(tx_id),
            CheckpointThreshold::Volumetric(_) => {}
            CheckpointThreshold::Periodic(t) => t.reset(tx_id),
        }
    }

    /// Whether a checkpoint is due. Has no side effects.
    pub fn threshold_reached(&self, last_committed_tx_id: u64) -> bool {
        match self {
            CheckpointThreshold::Continuous(t) => t.reached(last_committed_tx_id),
            CheckpointThreshold::Volumetric(t) => t.pruning.might_have_logs_to_prune(),
            CheckpointThreshold::Periodic(t) => t.reached(last_committed_tx_id),
        }
    }

    /// How often the scheduler should poll. A hint, not a guarantee.
    pub fn check_frequency_millis(&self) -> u64 {
        match self {
            CheckpointThreshold::Continuous(_) => CONTINUOUS_CHECKING_FREQUENCY_MILLIS,
            CheckpointThreshold::Volumetric(_) => DEFAULT_CHECKING_FREQUENCY_MILLIS,
            CheckpointThreshold::Periodic(t) => t.frequency_millis(),
        }
    }

    /// Why this policy triggers, for log lines.
    pub fn description(&self) -> String {
        match self {
            CheckpointThreshold::Continuous(_) => "continuous threshold".to_string(),
            CheckpointThreshold::Volumetric(_) => {
                "volumetric threshold: transaction logs waiting to be pruned".to_string()
            }
            CheckpointThreshold::Periodic(t) => format!(
                "periodic threshold: every {} transactions or {:?}",
                t.interval_tx, t.interval_time
            ),
        }
    }
}
