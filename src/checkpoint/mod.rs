//! Checkpoint scheduling.
//!
//! # Components
//! - [`CheckpointThreshold`] - When a checkpoint is due (continuous, volumetric, periodic)
//! - [`CheckpointScheduler`] - Polls the threshold and runs throttled checkpoints

mod scheduler;
mod threshold;

pub use scheduler::{CheckpointFlusher, CheckpointScheduler};
pub use threshold::{
    CheckpointThreshold, ContinuousThreshold, LogPruning, PeriodicThreshold, VolumetricThreshold,
};
