//! Transaction visibility.
//!
//! # Components
//! - [`TransactionIdSnapshot`] - Immutable view of closed transactions
//! - [`ClosedTransactionTracker`] - Global closed-transaction state
//! - [`VersionContext`] - Per-operation read/write visibility state
//! - [`VersionContextSupplier`] - Threads one id source into every context

mod snapshot;
mod tracker;
mod version_context;

pub use snapshot::{is_not_visible, TransactionIdSnapshot};
pub use tracker::{ClosedTransactionTracker, TransactionIdSource};
pub use version_context::{VersionContext, VersionContextSupplier};
