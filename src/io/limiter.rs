//! Checkpoint I/O rate limiting.
//!
//! The limiter divides time into 100 ms quantums and allows `iopq` I/Os per
//! quantum. Once the flush loop has done that many, it parks for what is left
//! of the quantum. It is best effort: overshoot inside a quantum is accepted
//! and never paid back in later quantums.
//!
//! # State word
//! ```text
//!  63                               32 31                                0
//! ┌──────────────────────────────────┬───────────────────────────────────┐
//! │         disabled counter         │               iopq                │
//! │  bit 32: disabled by config      │      I/Os allowed per quantum     │
//! │  bits 33..: overrides × 2        │                                   │
//! └──────────────────────────────────┴───────────────────────────────────┘
//! ```
//! Both halves change together in one compare-and-swap, so the sticky
//! config bit, the override depth and `iopq` never disagree.
//!
//! # Stamp
//! The flush loop carries a stamp between calls: the low 32 bits are the
//! quantum start time in milliseconds (truncated), the high 32 bits count
//! I/Os done in that quantum.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::config::{QUANTUMS_PER_SECOND, QUANTUM_MILLIS};
use crate::common::Settings;

use super::clock::{IoClock, SystemClock};

/// Stamp meaning "no throttling state to carry forward".
pub const INITIAL_STAMP: u64 = 0;

const HALF_BITS: u32 = 32;
const LOW_MASK: u64 = (1 << HALF_BITS) - 1;
const CONFIG_DISABLED_BIT: u32 = 1;
const OVERRIDE_STEP: u32 = 2;

/// Decoded limiter state word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimiterState {
    /// Override depth × 2, plus the config-disabled bit.
    pub disabled_counter: u32,
    /// I/Os allowed per quantum.
    pub iopq: u32,
}

impl LimiterState {
    #[inline]
    pub fn encode(self) -> u64 {
        (u64::from(self.disabled_counter) << HALF_BITS) | u64::from(self.iopq)
    }

    #[inline]
    pub fn decode(word: u64) -> Self {
        Self {
            disabled_counter: (word >> HALF_BITS) as u32,
            iopq: (word & LOW_MASK) as u32,
        }
    }

    /// Disabled by configuration, not by an override.
    #[inline]
    pub fn config_disabled(self) -> bool {
        self.disabled_counter & CONFIG_DISABLED_BIT != 0
    }

    /// Number of outstanding `disable_limit` calls, rushes included.
    #[inline]
    pub fn overrides(self) -> u32 {
        self.disabled_counter / OVERRIDE_STEP
    }

    /// One more outstanding override, or `None` if the counter is full.
    #[inline]
    fn with_override_added(self) -> Option<Self> {
        self.disabled_counter
            .checked_add(OVERRIDE_STEP)
            .map(|disabled_counter| LimiterState { disabled_counter, ..self })
    }

    /// Whether `maybe_limit_io` would throttle.
    #[inline]
    pub fn is_limiting(self) -> bool {
        self.disabled_counter == 0 && self.iopq > 0
    }
}

/// Hook the flush loop passes in to hear about pauses.
pub trait FlushEvent {
    /// Called right before the limiter parks for `pause`.
    fn report_io_limited(&mut self, pause: Duration);
}

impl FlushEvent for () {
    fn report_io_limited(&mut self, _pause: Duration) {}
}

/// Pause counters for one limiter.
#[derive(Debug, Default)]
pub struct LimiterStats {
    pauses: AtomicU64,
    paused_millis: AtomicU64,
}

impl LimiterStats {
    /// Number of times the flush loop was paused.
    pub fn pauses(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }

    /// Total time actually spent parked. May be less than requested, since
    /// a park can end early.
    pub fn paused(&self) -> Duration {
        Duration::from_millis(self.paused_millis.load(Ordering::Relaxed))
    }

    fn record(&self, pause: Duration) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
        self.paused_millis
            .fetch_add(pause.as_millis() as u64, Ordering::Relaxed);
    }
}

/// Rate limiter for checkpoint flush I/O.
///
/// # Usage
/// ```
/// use tidemark::io::{IoLimiter, INITIAL_STAMP};
///
/// let limiter = IoLimiter::new(600);
/// let mut stamp = INITIAL_STAMP;
/// for _batch in 0..3 {
///     // ... write 10 pages ...
///     stamp = limiter.maybe_limit_io(stamp, 10, &mut ());
/// }
/// ```
pub struct IoLimiter {
    state: AtomicU64,
    clock: Arc<dyn IoClock>,
    stats: LimiterStats,
}

impl IoLimiter {
    /// Limiter allowing `iops` I/Os per second on the wall clock.
    pub fn new(iops: i64) -> Self {
        Self::with_clock(iops, Arc::new(SystemClock))
    }

    /// Limiter with an explicit clock.
    pub fn with_clock(iops: i64, clock: Arc<dyn IoClock>) -> Self {
        Self {
            state: AtomicU64::new(Self::configured_state(LimiterState::default(), iops).encode()),
            clock,
            stats: LimiterStats::default(),
        }
    }

    /// Limiter that never throttles.
    pub fn unlimited() -> Self {
        Self::new(-1)
    }

    /// Limiter following the store's dynamic iops setting.
    ///
    /// Later changes to the setting reconfigure the limiter. The
    /// subscription holds a weak reference, so it does not keep the limiter
    /// alive.
    pub fn from_settings(settings: &Settings, clock: Arc<dyn IoClock>) -> Arc<Self> {
        let setting = &settings.checkpoint_iops_limit;
        let limiter = Arc::new(Self::with_clock(setting.get(), clock));
        let weak = Arc::downgrade(&limiter);
        setting.subscribe(move |_, iops| {
            if let Some(limiter) = weak.upgrade() {
                limiter.configure(iops);
            }
        });
        limiter
    }

    // ========================================================================
    // Throttling
    // ========================================================================

    /// Account for `recently_completed_ios` and pause if the quantum's
    /// budget is used up.
    ///
    /// Returns the stamp to pass to the next call.
    pub fn maybe_limit_io(
        &self,
        previous_stamp: u64,
        recently_completed_ios: u32,
        flush_event: &mut dyn FlushEvent,
    ) -> u64 {
        let state = self.state();
        if !state.is_limiting() {
            return INITIAL_STAMP;
        }

        let now = self.clock.now_millis() & LOW_MASK;
        let then = previous_stamp & LOW_MASK;
        let elapsed = now.wrapping_sub(then) & LOW_MASK;
        if elapsed > QUANTUM_MILLIS {
            return compose_stamp(now, u64::from(recently_completed_ios));
        }

        let io_sum = (previous_stamp >> HALF_BITS) + u64::from(recently_completed_ios);
        if io_sum >= u64::from(state.iopq) {
            let pause = Duration::from_millis(QUANTUM_MILLIS - elapsed);
            tracing::trace!(io_sum, iopq = state.iopq, ?pause, "checkpoint I/O limited");
            flush_event.report_io_limited(pause);
            let parked_at = self.clock.now_millis();
            self.clock.park(pause);
            let woke_at = self.clock.now_millis();
            self.stats.record(Duration::from_millis(woke_at.saturating_sub(parked_at)));
            return compose_stamp(woke_at & LOW_MASK, 0);
        }

        compose_stamp(then, io_sum)
    }

    // ========================================================================
    // Configuration and overrides
    // ========================================================================

    /// Apply a new I/Os-per-second setting. Below 1 means unlimited.
    pub fn configure(&self, iops: i64) {
        let state = self.update(|state| Self::configured_state(state, iops));
        tracing::debug!(
            iops,
            iopq = state.iopq,
            config_disabled = state.config_disabled(),
            "checkpoint I/O limit configured"
        );
    }

    fn configured_state(state: LimiterState, iops: i64) -> LimiterState {
        if iops < 1 {
            LimiterState {
                disabled_counter: state.disabled_counter | CONFIG_DISABLED_BIT,
                iopq: 0,
            }
        } else {
            let iopq = (iops as u64 / QUANTUMS_PER_SECOND).min(u64::from(u32::MAX)) as u32;
            LimiterState {
                disabled_counter: state.disabled_counter & !CONFIG_DISABLED_BIT,
                iopq,
            }
        }
    }

    /// Suspend limiting until the matching [`enable_limit`](Self::enable_limit).
    ///
    /// A full override counter already keeps limiting off, so an override
    /// past that is dropped with an error log.
    pub fn disable_limit(&self) {
        let mut saturated = false;
        self.update(|state| match state.with_override_added() {
            Some(next) => {
                saturated = false;
                next
            }
            None => {
                saturated = true;
                state
            }
        });
        debug_assert!(!saturated, "too many outstanding disable_limit() calls");
        if saturated {
            tracing::error!("checkpoint I/O override counter saturated");
        }
    }

    /// Undo one [`disable_limit`](Self::disable_limit). Never clears the
    /// config-disabled bit.
    pub fn enable_limit(&self) {
        let mut unpaired = false;
        self.update(|state| {
            unpaired = state.overrides() == 0;
            if unpaired {
                state
            } else {
                LimiterState {
                    disabled_counter: state.disabled_counter - OVERRIDE_STEP,
                    ..state
                }
            }
        });
        if unpaired {
            tracing::warn!("enable_limit() without a matching disable_limit()");
        }
    }

    /// Bypass limiting until the returned guard is closed or dropped.
    pub fn begin_temporary_rush(&self) -> RushGuard<'_> {
        self.disable_limit();
        tracing::debug!("checkpoint I/O rush started");
        RushGuard {
            limiter: self,
            closed: false,
        }
    }

    fn update<F>(&self, mut f: F) -> LimiterState
    where
        F: FnMut(LimiterState) -> LimiterState,
    {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = f(LimiterState::decode(current));
            match self.state.compare_exchange_weak(
                current,
                next.encode(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Decoded current state.
    #[inline]
    pub fn state(&self) -> LimiterState {
        LimiterState::decode(self.state.load(Ordering::Acquire))
    }

    /// Whether the next `maybe_limit_io` call could throttle.
    #[inline]
    pub fn is_limited(&self) -> bool {
        self.state().is_limiting()
    }

    /// Configured I/Os per quantum.
    #[inline]
    pub fn io_per_quantum(&self) -> u32 {
        self.state().iopq
    }

    pub fn stats(&self) -> &LimiterStats {
        &self.stats
    }
}

impl fmt::Debug for IoLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoLimiter")
            .field("state", &self.state())
            .field("stats", &self.stats)
            .finish()
    }
}

#[inline]
fn compose_stamp(quantum_start: u64, ios: u64) -> u64 {
    (ios << HALF_BITS) | (quantum_start & LOW_MASK)
}

/// Keeps I/O limiting off while alive.
///
/// Rushes nest: limiting resumes only once every guard is gone.
#[must_use = "the rush ends as soon as the guard is dropped"]
pub struct RushGuard<'a> {
    limiter: &'a IoLimiter,
    closed: bool,
}

impl RushGuard<'_> {
    /// End the rush. Only the first call has an effect.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.limiter.enable_limit();
            tracing::debug!("checkpoint I/O rush ended");
        }
    }
}

impl Drop for RushGuard<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for RushGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RushGuard").field("closed", &self.closed).finish()
    }
}
