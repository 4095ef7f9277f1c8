//! Checkpoint I/O control.
//!
//! - [`IoLimiter`] - Quantum-based flush rate limiter with rush override
//! - [`IoClock`] - Time source the limiter reads and parks on

mod clock;
mod limiter;

pub use clock::{IoClock, ManualClock, SystemClock};
pub use limiter::{FlushEvent, IoLimiter, LimiterState, LimiterStats, RushGuard, INITIAL_STAMP};
