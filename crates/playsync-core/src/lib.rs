//! # playsync-core
//!
//! Core types and error definitions shared across all playsync crates.
//!
//! This crate provides:
//! - The published playback snapshot
//! - Clock time representation
//! - Common error types

pub mod error;
pub mod snapshot;
pub mod time;

pub use error::{ClockError, ControlError, Error, PipelineError, Result};
pub use snapshot::Snapshot;
pub use time::ClockTime;
