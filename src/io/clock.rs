//! Time source for I/O limiting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Millisecond clock plus a bounded pause.
pub trait IoClock: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> u64;

    /// Pause the calling thread for at most `duration`.
    fn park(&self, duration: Duration);
}

/// Wall clock; pauses with [`std::thread::park_timeout`], so another thread
/// can cut a pause short with `Thread::unpark`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl IoClock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn park(&self, duration: Duration) {
        std::thread::park_timeout(duration);
    }
}

/// Clock that only moves when told to. Parking advances it by the requested
/// duration and records the pause.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tidemark::io::{IoClock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.park(Duration::from_millis(40));
/// assert_eq!(clock.now_millis(), 1_040);
/// assert_eq!(clock.pauses(), vec![Duration::from_millis(40)]);
/// ```
pub struct ManualClock {
    now: AtomicU64,
    pauses: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
            pauses: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        self.now.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every pause requested so far, in order.
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().clone()
    }
}

impl IoClock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn park(&self, duration: Duration) {
        self.pauses.lock().push(duration);
        self.advance(duration);
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now_millis())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let before = clock.now_millis();
        assert!(before > 0);
        let started = Instant::now();
        clock.park(Duration::from_millis(5));
        assert!(started.elapsed() <= Duration::from_secs(1));
        assert!(clock.now_millis() >= before);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(0);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_millis(), 250);
        assert!(clock.pauses().is_empty());
    }
}
