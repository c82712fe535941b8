//! # playsync-client
//!
//! Keeps a local media pipeline in step with a shared playback timeline.
//!
//! This crate provides:
//! - Snapshot reconciliation (minimal pipeline commands per change)
//! - A corrective seek when playback starts late
//! - Clock sync gating and event reporting
//!
//! ## Example
//!
//! ```ignore
//! use playsync_client::{ChannelControlClient, ClientBuilder, Snapshot};
//! use playsync_pipeline::SimulatedPipeline;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (control, publisher) = ChannelControlClient::channel();
//!     let mut client = ClientBuilder::new()
//!         .pipeline(Arc::new(SimulatedPipeline::new()))
//!         .control_client(control)
//!         .build()?;
//!
//!     client.start("127.0.0.1", 9000).await?;
//!     publisher.publish(Snapshot::new("file:///clip.mp4"));
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

mod builder;
mod client;
mod control;
mod events;
mod reconcile;
mod seek;

pub use builder::ClientBuilder;
pub use client::SyncClient;
pub use control::{ChannelControlClient, ControlClient, SnapshotPublisher};
pub use events::{spawn_dispatcher, CallbackHandler, ClientEvent, EventHandler, EventReporter};
pub use reconcile::{
    plan_transition, EngineConfig, Reconciler, RestartReason, Transition, DEFAULT_SYNC_TIMEOUT,
};
pub use seek::{SeekCoordinator, SeekDecision, SeekOutcome, SeekPhase, DEFAULT_SEEK_TOLERANCE};

// Re-export commonly used types
pub use playsync_core::{ClockTime, Error, Result, Snapshot};
