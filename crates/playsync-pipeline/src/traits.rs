//! Media pipeline boundary (enables mocking in tests).

use crate::{BusWatcher, PipelineState, SeekFlags, StateChange};
use playsync_core::error::Result;
use playsync_core::ClockTime;
use playsync_timing::ReferenceClock;
use std::sync::Arc;

/// A playback pipeline that decodes and renders one source.
///
/// Commands may be issued from any thread. Status events are posted to the
/// attached [`BusWatcher`].
#[cfg_attr(test, mockall::automock)]
pub trait MediaPipeline: Send + Sync {
    /// Set the source locator and target latency.
    fn configure(&self, uri: &str, latency: ClockTime) -> Result<()>;

    /// Command a state change.
    fn set_state(&self, state: PipelineState) -> Result<StateChange>;

    /// Last state commanded successfully.
    fn current_state(&self) -> PipelineState;

    /// Request a seek to `position` in stream time.
    ///
    /// Completion is reported later with `SeekCompleted`, never from inside
    /// this call on the calling thread.
    fn seek(&self, position: ClockTime, flags: SeekFlags) -> Result<()>;

    /// Current stream position.
    fn query_position(&self) -> Result<ClockTime>;

    /// Reference clock time at which stream position zero renders.
    fn set_base_time(&self, base_time: ClockTime);

    /// Render against `clock` instead of a local clock.
    fn use_clock(&self, clock: Arc<dyn ReferenceClock>);

    /// Start posting status events to `watcher`.
    fn attach(&self, watcher: BusWatcher);

    /// Stop posting status events.
    fn detach(&self);
}
