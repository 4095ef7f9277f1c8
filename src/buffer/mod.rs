//! Page access contexts and statistics.
//!
//! Every page access an operation makes goes through a [`CursorContext`],
//! which carries the operation's visibility state and counts its page
//! accesses until it closes.
//!
//! # Components
//! - [`CursorContextFactory`] - The only place contexts are created
//! - [`CursorContext`] - Scoped per-operation context
//! - [`PageCursorTracer`] - Per-operation page access counters
//! - [`PageCacheStats`] - Global aggregate of closed contexts

mod cursor_context;
mod cursor_tracer;
mod stats;

pub use cursor_context::{CursorContext, CursorContextFactory, SharedVersionContext};
pub use cursor_tracer::PageCursorTracer;
pub use stats::{PageCacheStats, StatsSnapshot};
