//! In-memory pipeline that behaves like a real one at the boundary.
//!
//! Records every command, posts status events the way a playback pipeline
//! would, and lands key-unit seeks on the next key unit. Used by the demo
//! and tests, and handy for running a client without any media stack.

use crate::{BusWatcher, EventSource, MediaPipeline, PipelineEvent, PipelineState, SeekFlags, StateChange};
use playsync_core::error::{PipelineError, Result};
use playsync_core::ClockTime;
use playsync_timing::ReferenceClock;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// A command received by the simulated pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Configure { uri: String, latency: ClockTime },
    SetState(PipelineState),
    Seek { position: ClockTime, flags: SeekFlags },
    SetBaseTime(ClockTime),
    UseClock,
}

struct SimInner {
    state: PipelineState,
    uri: Option<String>,
    base_time: Option<ClockTime>,
    position: Option<ClockTime>,
    commands: Vec<Command>,
    live: bool,
    key_unit_interval: ClockTime,
    fail_state_changes: bool,
    reject_seeks: bool,
    fail_position_query: bool,
    seek_completion_delay: Option<Duration>,
    has_clock: bool,
}

/// Simulated media pipeline.
pub struct SimulatedPipeline {
    inner: Mutex<SimInner>,
    watcher: Mutex<Option<BusWatcher>>,
}

impl SimulatedPipeline {
    /// Create a pipeline for a non-live source with 1 s key units.
    ///
    /// Seeks do not complete until [`complete_seek`](Self::complete_seek)
    /// is called, unless a completion delay is configured.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimInner {
                state: PipelineState::Idle,
                uri: None,
                base_time: None,
                position: None,
                commands: Vec::new(),
                live: false,
                key_unit_interval: ClockTime::from_secs(1),
                fail_state_changes: false,
                reject_seeks: false,
                fail_position_query: false,
                seek_completion_delay: None,
                has_clock: false,
            }),
            watcher: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn watcher(&self) -> Option<BusWatcher> {
        self.watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn post(&self, event: PipelineEvent) {
        if let Some(watcher) = self.watcher() {
            watcher.post(event);
        }
    }

    /// Behave like a live source (paused without preroll).
    pub fn set_live(&self, live: bool) {
        self.lock().live = live;
    }

    /// Spacing of key units that `KEY_UNIT` seeks snap to. Zero disables snapping.
    pub fn set_key_unit_interval(&self, interval: ClockTime) {
        self.lock().key_unit_interval = interval;
    }

    /// Refuse every state change except to idle.
    pub fn set_fail_state_changes(&self, fail: bool) {
        self.lock().fail_state_changes = fail;
    }

    pub fn set_reject_seeks(&self, reject: bool) {
        self.lock().reject_seeks = reject;
    }

    pub fn set_fail_position_query(&self, fail: bool) {
        self.lock().fail_position_query = fail;
    }

    /// Complete seeks on a separate thread after `delay`.
    pub fn set_seek_completion_delay(&self, delay: Option<Duration>) {
        self.lock().seek_completion_delay = delay;
    }

    /// Override the position reported by position queries.
    pub fn set_position(&self, position: ClockTime) {
        self.lock().position = Some(position);
    }

    /// Post seek completion from the calling thread.
    pub fn complete_seek(&self) {
        self.post(PipelineEvent::SeekCompleted);
    }

    /// Post end-of-stream for the pipeline.
    pub fn finish_stream(&self) {
        self.post(PipelineEvent::EndOfStream {
            source: EventSource::Pipeline,
        });
    }

    /// Post an arbitrary event.
    pub fn emit(&self, event: PipelineEvent) {
        self.post(event);
    }

    /// All commands received so far.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    /// Drop the command log.
    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// State commands only, in order.
    pub fn state_commands(&self) -> Vec<PipelineState> {
        self.lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::SetState(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Seek targets requested, in order.
    pub fn seeks(&self) -> Vec<ClockTime> {
        self.lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Seek { position, .. } => Some(*position),
                _ => None,
            })
            .collect()
    }

    pub fn uri(&self) -> Option<String> {
        self.lock().uri.clone()
    }

    pub fn base_time(&self) -> Option<ClockTime> {
        self.lock().base_time
    }

    pub fn has_clock(&self) -> bool {
        self.lock().has_clock
    }

    pub fn is_attached(&self) -> bool {
        self.watcher().is_some()
    }
}

impl Default for SimulatedPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Round `position` up to the next multiple of `interval`.
fn snap_after(position: ClockTime, interval: ClockTime) -> ClockTime {
    if interval == ClockTime::ZERO {
        return position;
    }
    let step = interval.nanos();
    let units = position.nanos().div_ceil(step);
    ClockTime::from_nanos(units.saturating_mul(step))
}

impl MediaPipeline for SimulatedPipeline {
    fn configure(&self, uri: &str, latency: ClockTime) -> Result<()> {
        if uri.is_empty() {
            return Err(PipelineError::Configuration("empty uri".to_string()).into());
        }
        let mut inner = self.lock();
        inner.uri = Some(uri.to_string());
        inner.commands.push(Command::Configure {
            uri: uri.to_string(),
            latency,
        });
        Ok(())
    }

    fn set_state(&self, state: PipelineState) -> Result<StateChange> {
        let (old, result) = {
            let mut inner = self.lock();
            inner.commands.push(Command::SetState(state));

            if inner.fail_state_changes && state != PipelineState::Idle {
                return Err(PipelineError::StateChange {
                    target: state.as_str(),
                }
                .into());
            }

            let old = inner.state;
            inner.state = state;

            let result = match (old, state) {
                (_, PipelineState::Paused) if inner.live => StateChange::NoPreroll,
                (PipelineState::Idle, PipelineState::Paused) => StateChange::Async,
                _ => StateChange::Success,
            };

            match state {
                PipelineState::Idle => inner.position = None,
                _ if inner.position.is_none() => inner.position = Some(ClockTime::ZERO),
                _ => {}
            }

            (old, result)
        };

        debug!(%old, new = %state, ?result, "Simulated state change");

        if old != state {
            self.post(PipelineEvent::StateChanged {
                source: EventSource::Pipeline,
                old,
                new: state,
            });
        }

        Ok(result)
    }

    fn current_state(&self) -> PipelineState {
        self.lock().state
    }

    fn seek(&self, position: ClockTime, flags: SeekFlags) -> Result<()> {
        let delay = {
            let mut inner = self.lock();
            inner.commands.push(Command::Seek { position, flags });

            if inner.reject_seeks || inner.state == PipelineState::Idle {
                return Err(PipelineError::SeekRejected { position }.into());
            }

            let landing = if flags.contains(SeekFlags::KEY_UNIT | SeekFlags::SNAP_AFTER) {
                snap_after(position, inner.key_unit_interval)
            } else {
                position
            };
            inner.position = Some(landing);
            inner.seek_completion_delay
        };

        if let Some(delay) = delay {
            if let Some(watcher) = self.watcher() {
                thread::spawn(move || {
                    thread::sleep(delay);
                    watcher.post(PipelineEvent::SeekCompleted);
                });
            }
        }

        Ok(())
    }

    fn query_position(&self) -> Result<ClockTime> {
        let inner = self.lock();
        if inner.fail_position_query {
            return Err(PipelineError::PositionUnavailable.into());
        }
        inner
            .position
            .ok_or_else(|| PipelineError::PositionUnavailable.into())
    }

    fn set_base_time(&self, base_time: ClockTime) {
        let mut inner = self.lock();
        inner.base_time = Some(base_time);
        inner.commands.push(Command::SetBaseTime(base_time));
    }

    fn use_clock(&self, _clock: Arc<dyn ReferenceClock>) {
        let mut inner = self.lock();
        inner.has_clock = true;
        inner.commands.push(Command::UseClock);
    }

    fn attach(&self, watcher: BusWatcher) {
        *self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(watcher);
    }

    fn detach(&self) {
        self.watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}
