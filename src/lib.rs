//! tidemark - snapshot visibility and checkpoint scheduling for a
//! page-cache-backed storage engine.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            tidemark                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │            Page Access Layer (buffer/)                   │   │
//! │  │   CursorContextFactory → CursorContext → PageCacheStats  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Visibility Layer (concurrency/)                │   │
//! │  │  ClosedTransactionTracker → Snapshot → VersionContext    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                                                                 │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │            Durability Layer (checkpoint/)                │   │
//! │  │   CheckpointScheduler polls CheckpointThreshold          │   │
//! │  │   ┌─────────────────────────────────────────────────┐   │   │
//! │  │   │  Policies: Continuous | Volumetric | Periodic   │   │   │
//! │  │   └─────────────────────────────────────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │             I/O Control (io/)                            │   │
//! │  │   IoLimiter (100 ms quantums) + RushGuard + IoClock      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (Error, Settings, constants)
//! - [`concurrency`] - Transaction snapshots and version contexts
//! - [`buffer`] - Cursor contexts and page access statistics
//! - [`checkpoint`] - Checkpoint thresholds and scheduler
//! - [`io`] - Checkpoint I/O limiting
//!
//! # Quick Start
//! ```
//! use std::sync::Arc;
//! use tidemark::buffer::{CursorContextFactory, PageCacheStats};
//! use tidemark::concurrency::{ClosedTransactionTracker, VersionContextSupplier};
//!
//! let tracker = Arc::new(ClosedTransactionTracker::new(1));
//! let factory = CursorContextFactory::new(
//!     Arc::new(PageCacheStats::new()),
//!     VersionContextSupplier::new(tracker.clone()),
//! );
//!
//! // A writer commits transaction 2
//! let tx_id = tracker.next_committing_tx_id();
//! let writer = factory.create("commit");
//! writer.version_context().init_write(tx_id);
//! tracker.transaction_closed(tx_id);
//!
//! // A reader now sees it
//! let reader = factory.create("read");
//! reader.version_context().init_read();
//! assert_eq!(reader.version_context().last_closed_transaction_id(), tx_id);
//! ```

pub mod buffer;
pub mod checkpoint;
pub mod common;
pub mod concurrency;
pub mod io;

pub use common::{Error, Result, Settings};

pub use buffer::{CursorContext, CursorContextFactory, PageCacheStats, StatsSnapshot};
pub use checkpoint::{CheckpointScheduler, CheckpointThreshold};
pub use concurrency::{
    ClosedTransactionTracker, TransactionIdSnapshot, VersionContext, VersionContextSupplier,
};
pub use io::{IoLimiter, RushGuard, INITIAL_STAMP};
