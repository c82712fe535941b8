//! # playsync-pipeline
//!
//! Boundary to the local media pipeline driven by the sync client.
//!
//! This crate provides:
//! - The [`MediaPipeline`] command interface
//! - Pipeline status events and the [`BusWatcher`] they are posted to
//! - Seek flags and state-change results
//! - [`SimulatedPipeline`], an in-memory implementation

mod events;
mod simulated;
mod state;
mod traits;

pub use events::{BusWatcher, EventSource, PipelineEvent, SyncHandler};
pub use simulated::{Command, SimulatedPipeline};
pub use state::{PipelineState, SeekFlags, StateChange};
pub use traits::MediaPipeline;
