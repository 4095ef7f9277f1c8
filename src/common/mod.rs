//! Common types and utilities shared across tidemark.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and dynamic settings
//! - Error types
//! - Transaction id constants

pub mod config;
pub mod error;

pub use config::{CheckpointPolicy, DynamicSetting, Settings};
pub use error::{Error, Result};

/// Sentinel meaning "no transaction". Never a valid transaction id.
pub const NO_TRANSACTION_ID: u64 = 0;

/// The first transaction id a fresh store closes.
pub const BASE_TX_ID: u64 = 1;
