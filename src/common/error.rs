//! Error types for tidemark.
//!
//! Most of this crate is in-memory coordination state and has no recoverable
//! error surface. Lifecycle misuse (reading a visibility accessor before the
//! matching `init_*`) panics instead of returning an error, since it is a bug
//! in the caller's transaction lifecycle.

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All recoverable errors in tidemark.
#[derive(Debug, Error)]
pub enum Error {
    /// A checkpoint policy name that does not match any known policy.
    #[error("unknown checkpoint policy '{0}' (expected continuous, volumetric or periodic)")]
    UnknownCheckpointPolicy(String),

    /// A setting value that cannot be normalized into something usable.
    #[error("invalid value '{value}' for setting '{name}'")]
    InvalidSetting {
        /// Setting name.
        name: &'static str,
        /// Offending value, rendered for display.
        value: String,
    },

    /// The external flusher failed to flush and force dirty pages.
    #[error("checkpoint flush failed: {0}")]
    Flush(String),
}
