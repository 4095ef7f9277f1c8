//! Configuration constants and settings for tidemark.
//!
//! The storage engine's configuration loader owns parsing; this module only
//! holds the values the checkpoint and I/O limiting layers read, plus the
//! dynamic I/Os-per-second setting that can change at runtime.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::common::error::{Error, Result};

/// Length of one I/O limiter quantum in milliseconds.
pub const QUANTUM_MILLIS: u64 = 100;

/// Number of limiter quantums in one second.
pub const QUANTUMS_PER_SECOND: u64 = 1000 / QUANTUM_MILLIS;

/// Default checkpoint I/Os per second.
///
/// An I/O here is one mostly-sequential page write.
pub const DEFAULT_CHECKPOINT_IOPS: i64 = 600;

/// How often thresholds without a tighter requirement are polled.
pub const DEFAULT_CHECKING_FREQUENCY_MILLIS: u64 = 10_000;

/// How often the continuous policy is polled.
pub const CONTINUOUS_CHECKING_FREQUENCY_MILLIS: u64 = 100;

/// Default number of committed transactions between periodic checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL_TX: u64 = 100_000;

/// Default time between periodic checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL_TIME: Duration = Duration::from_secs(15 * 60);

/// Which checkpoint threshold policy a store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointPolicy {
    /// Checkpoint after every commit.
    Continuous,
    /// Checkpoint when transaction log pruning is blocked on a checkpoint.
    Volumetric,
    /// Checkpoint every N transactions or every T, whichever comes first.
    #[default]
    Periodic,
}

impl FromStr for CheckpointPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(CheckpointPolicy::Continuous),
            "volumetric" | "volume" => Ok(CheckpointPolicy::Volumetric),
            "periodic" => Ok(CheckpointPolicy::Periodic),
            _ => Err(Error::UnknownCheckpointPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for CheckpointPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckpointPolicy::Continuous => "continuous",
            CheckpointPolicy::Volumetric => "volumetric",
            CheckpointPolicy::Periodic => "periodic",
        };
        f.write_str(name)
    }
}

type Listener<T> = Box<dyn Fn(T, T) + Send + Sync>;

/// A setting whose value may change while the database is running.
///
/// Listeners receive `(old, new)` after every [`set`](Self::set), in
/// subscription order. They are invoked outside the value lock, so a
/// listener may call [`get`](Self::get), but inside the listener lock, so
/// notifications follow the order of the writes.
pub struct DynamicSetting<T> {
    name: &'static str,
    value: RwLock<T>,
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T: Copy + fmt::Debug> DynamicSetting<T> {
    /// Create a setting with an initial value.
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: RwLock::new(value),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Setting name, used in log lines and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> T {
        *self.value.read()
    }

    /// Replace the value and notify listeners. Returns the previous value.
    ///
    /// Concurrent calls are serialized through the listener lock, so the
    /// last notification a listener receives is always the current value.
    /// A listener must not call `set` or `subscribe` on the same setting.
    pub fn set(&self, new_value: T) -> T {
        let listeners = self.listeners.lock();
        let old = std::mem::replace(&mut *self.value.write(), new_value);
        tracing::debug!(setting = self.name, ?old, new = ?new_value, "setting changed");
        for listener in listeners.iter() {
            listener(old, new_value);
        }
        old
    }

    /// Register a change listener.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(T, T) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }
}

impl<T: fmt::Debug + Copy> fmt::Debug for DynamicSetting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicSetting")
            .field("name", &self.name)
            .field("value", &*self.value.read())
            .finish()
    }
}

/// Checkpoint related settings for one store.
#[derive(Debug)]
pub struct Settings {
    /// Threshold policy.
    pub checkpoint_policy: CheckpointPolicy,

    /// Committed transactions between periodic checkpoints.
    pub checkpoint_interval_tx: u64,

    /// Time between periodic checkpoints.
    pub checkpoint_interval_time: Duration,

    /// Checkpoint I/Os per second. Values below 1 disable limiting.
    pub checkpoint_iops_limit: DynamicSetting<i64>,
}

impl Settings {
    /// Settings with every value at its default.
    pub fn new() -> Self {
        Self {
            checkpoint_policy: CheckpointPolicy::default(),
            checkpoint_interval_tx: DEFAULT_CHECKPOINT_INTERVAL_TX,
            checkpoint_interval_time: DEFAULT_CHECKPOINT_INTERVAL_TIME,
            checkpoint_iops_limit: DynamicSetting::new(
                "checkpoint.iops.limit",
                DEFAULT_CHECKPOINT_IOPS,
            ),
        }
    }

    /// Set the checkpoint policy.
    pub fn with_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint_policy = policy;
        self
    }

    /// Set the initial checkpoint I/Os per second.
    pub fn with_iops_limit(self, iops: i64) -> Self {
        self.checkpoint_iops_limit.set(iops);
        self
    }

    /// Set both periodic intervals.
    pub fn with_periodic_interval(mut self, tx: u64, time: Duration) -> Self {
        self.checkpoint_interval_tx = tx;
        self.checkpoint_interval_time = time;
        self
    }

    /// Check values that cannot be normalized.
    ///
    /// The iops limit is never rejected; anything below 1 just means
    /// "unlimited".
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval_tx == 0 {
            return Err(Error::InvalidSetting {
                name: "checkpoint.interval.tx",
                value: self.checkpoint_interval_tx.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_quantum_constants() {
        assert_eq!(QUANTUMS_PER_SECOND, 10);
        assert_eq!(QUANTUM_MILLIS * QUANTUMS_PER_SECOND, 1000);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("continuous".parse::<CheckpointPolicy>().unwrap(), CheckpointPolicy::Continuous);
        assert_eq!(" Volumetric ".parse::<CheckpointPolicy>().unwrap(), CheckpointPolicy::Volumetric);
        assert_eq!("PERIODIC".parse::<CheckpointPolicy>().unwrap(), CheckpointPolicy::Periodic);
        assert!(matches!(
            "hourly".parse::<CheckpointPolicy>(),
            Err(Error::UnknownCheckpointPolicy(name)) if name == "hourly"
        ));
    }

    #[test]
    fn test_policy_display_roundtrips() {
        for policy in [
            CheckpointPolicy::Continuous,
            CheckpointPolicy::Volumetric,
            CheckpointPolicy::Periodic,
        ] {
            assert_eq!(policy.to_string().parse::<CheckpointPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_dynamic_setting_notifies() {
        let setting = DynamicSetting::new("iops", 600i64);
        let seen = Arc::new(AtomicI64::new(0));

        let seen_clone = Arc::clone(&seen);
        setting.subscribe(move |old, new| {
            assert_eq!(old, 600);
            seen_clone.store(new, Ordering::SeqCst);
        });

        assert_eq!(setting.set(200), 600);
        assert_eq!(setting.get(), 200);
        assert_eq!(seen.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn test_concurrent_sets_notify_in_write_order() {
        let setting = DynamicSetting::new("iops", 0i64);
        let last_notified = Arc::new(Mutex::new(0i64));

        let last = Arc::clone(&last_notified);
        setting.subscribe(move |old, new| {
            let mut last = last.lock();
            // Each notification continues from the one before it
            assert_eq!(old, *last);
            *last = new;
        });

        std::thread::scope(|s| {
            for t in 0..4i64 {
                let setting = &setting;
                s.spawn(move || {
                    for i in 1..=250 {
                        setting.set(t * 1_000 + i);
                    }
                });
            }
        });

        assert_eq!(*last_notified.lock(), setting.get());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.checkpoint_policy, CheckpointPolicy::Periodic);
        assert_eq!(settings.checkpoint_iops_limit.get(), DEFAULT_CHECKPOINT_IOPS);
        assert_eq!(settings.checkpoint_interval_tx, DEFAULT_CHECKPOINT_INTERVAL_TX);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_rejects_zero_tx_interval() {
        let settings = Settings::new().with_periodic_interval(0, Duration::from_secs(1));
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidSetting { name: "checkpoint.interval.tx", .. })
        ));
    }

    #[test]
    fn test_negative_iops_is_accepted() {
        let settings = Settings::new().with_iops_limit(-1);
        assert_eq!(settings.checkpoint_iops_limit.get(), -1);
        assert!(settings.validate().is_ok());
    }
}
