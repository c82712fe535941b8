//! Reconciliation of published snapshots against the local pipeline.
//!
//! Each snapshot is diffed against the previously applied one and the
//! smallest set of pipeline commands is issued to converge on it. Pipeline
//! status events (play transition, seek completion, end of stream) and
//! clock sync status are handled here as well, since they all act on the
//! same state.

use crate::events::{ClientEvent, EventReporter};
use crate::seek::{SeekCoordinator, SeekOutcome, SeekPhase, DEFAULT_SEEK_TOLERANCE};
use playsync_core::{ClockError, ClockTime, Result, Snapshot};
use playsync_pipeline::{EventSource, MediaPipeline, PipelineEvent, PipelineState, StateChange};
use playsync_timing::{ClockConnector, ReferenceClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long to wait for the reference clock before giving up on a start.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Largest lag at the play transition that is left uncorrected.
    pub seek_tolerance: Duration,
    /// Bound on the wait for reference clock synchronisation.
    pub sync_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seek_tolerance: DEFAULT_SEEK_TOLERANCE,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

/// Why the pipeline had to be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    StoppedChanged,
    UriChanged,
    BaseTimeChanged,
}

/// Outcome of diffing two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First snapshot: pipeline configured, clock connected.
    Initialize,
    /// Tear down and start again from the new snapshot.
    Restart(RestartReason),
    Pause,
    Resume,
    /// Nothing that needs a pipeline command changed.
    Unchanged,
}

/// Decide how to get from `old` to `new`. The first matching rule wins.
pub fn plan_transition(old: &Snapshot, new: &Snapshot) -> Transition {
    if old.stopped != new.stopped {
        Transition::Restart(RestartReason::StoppedChanged)
    } else if old.uri != new.uri {
        Transition::Restart(RestartReason::UriChanged)
    } else if old.paused != new.paused {
        if new.paused {
            Transition::Pause
        } else {
            Transition::Resume
        }
    } else if old.base_time != new.base_time {
        Transition::Restart(RestartReason::BaseTimeChanged)
    } else {
        Transition::Unchanged
    }
}

#[derive(Debug, Default)]
struct InfoState {
    current: Option<Arc<Snapshot>>,
    seek_offset: ClockTime,
    live: bool,
}

/// Keeps the pipeline converged on the latest snapshot.
///
/// Snapshot application and time-base updates happen under one info lock.
/// The seek phase is atomic and is always checked before that lock is
/// taken, so events that do not apply return without contending.
///
/// The pipeline must not post `SeekCompleted` from inside its own `seek`
/// call on the calling thread: the play transition handler holds the info
/// lock across that call.
pub struct Reconciler {
    pipeline: Arc<dyn MediaPipeline>,
    connector: Arc<dyn ClockConnector>,
    config: EngineConfig,
    info: Mutex<InfoState>,
    clock: Mutex<Option<Arc<dyn ReferenceClock>>>,
    seek: SeekCoordinator,
    /// Set only once the bounded sync wait has succeeded.
    synchronized: AtomicBool,
    /// A sync wait is in flight.
    sync_pending: AtomicBool,
    shutdown: AtomicBool,
    reporter: EventReporter,
}

impl Reconciler {
    pub fn new(
        pipeline: Arc<dyn MediaPipeline>,
        connector: Arc<dyn ClockConnector>,
        config: EngineConfig,
        reporter: EventReporter,
    ) -> Self {
        Self {
            pipeline,
            connector,
            config,
            info: Mutex::new(InfoState::default()),
            clock: Mutex::new(None),
            seek: SeekCoordinator::new(config.seek_tolerance),
            synchronized: AtomicBool::new(false),
            sync_pending: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            reporter,
        }
    }

    fn lock_info(&self) -> MutexGuard<'_, InfoState> {
        self.info.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_clock(&self) -> MutexGuard<'_, Option<Arc<dyn ReferenceClock>>> {
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Apply a freshly published snapshot.
    ///
    /// Only failures to initialise from the first snapshot are returned;
    /// command failures after that are logged and reported as events, and
    /// the next snapshot is the recovery path.
    pub fn apply(&self, snapshot: Snapshot) -> Result<Transition> {
        if self.is_shut_down() {
            return Ok(Transition::Unchanged);
        }

        debug!(
            uri = %snapshot.uri,
            base_time = %snapshot.base_time,
            base_time_offset = snapshot.base_time_offset,
            latency = %snapshot.latency,
            stopped = snapshot.stopped,
            paused = snapshot.paused,
            clock_address = %snapshot.clock_address,
            clock_port = snapshot.clock_port,
            "Got sync information"
        );

        let snapshot = Arc::new(snapshot);
        let mut info = self.lock_info();

        let Some(old) = info.current.clone() else {
            self.initialize(&snapshot)?;
            info.current = Some(snapshot);
            self.reporter
                .report(ClientEvent::SnapshotApplied(Transition::Initialize));
            return Ok(Transition::Initialize);
        };

        let transition = plan_transition(&old, &snapshot);
        info.current = Some(snapshot);

        if !self.is_synchronized() {
            debug!(?transition, "Clock not synchronised yet, deferring");
            self.reporter.report(ClientEvent::SnapshotApplied(transition));
            return Ok(transition);
        }

        match transition {
            Transition::Restart(reason) => {
                debug!(?reason, "Restarting pipeline");
                if let Err(e) = self.pipeline.set_state(PipelineState::Idle) {
                    warn!(error = %e, "Error while stopping pipeline");
                }
                self.refresh(&mut info);
            }
            Transition::Pause => {
                debug!("Pausing");
                self.command(PipelineState::Paused);
            }
            Transition::Resume => {
                debug!("Resuming");
                self.apply_base_time(&info);
                self.command(PipelineState::Playing);
            }
            Transition::Initialize | Transition::Unchanged => {}
        }

        self.reporter.report(ClientEvent::SnapshotApplied(transition));
        Ok(transition)
    }

    fn initialize(&self, snapshot: &Snapshot) -> Result<()> {
        self.pipeline.configure(&snapshot.uri, snapshot.latency)?;

        let clock = self
            .connector
            .connect(&snapshot.clock_address, snapshot.clock_port)?;
        self.pipeline.use_clock(Arc::clone(&clock));
        *self.lock_clock() = Some(clock);

        info!(
            address = %snapshot.clock_address,
            port = snapshot.clock_port,
            "Connected reference clock, waiting for sync"
        );
        Ok(())
    }

    /// (Re)start the pipeline from the stored snapshot. Info lock held.
    fn refresh(&self, info: &mut InfoState) {
        let Some(snapshot) = info.current.clone() else {
            return;
        };

        if let Err(e) = self.pipeline.configure(&snapshot.uri, snapshot.latency) {
            warn!(uri = %snapshot.uri, error = %e, "Could not configure pipeline");
            self.reporter.report(ClientEvent::Error(e.to_string()));
            return;
        }

        if snapshot.stopped {
            if let Err(e) = self.pipeline.set_state(PipelineState::Idle) {
                warn!(error = %e, "Error while stopping pipeline");
            }
            return;
        }

        let live = match self.pipeline.set_state(PipelineState::Paused) {
            Ok(StateChange::NoPreroll) => {
                debug!("Detected live pipeline");
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(uri = %snapshot.uri, error = %e, "Could not play uri");
                self.reporter.report(ClientEvent::Error(e.to_string()));
                return;
            }
        };

        info.live = live;
        info.seek_offset = ClockTime::ZERO;
        self.seek.reset(live);

        if snapshot.is_playing() {
            self.apply_base_time(info);
            self.command(PipelineState::Playing);
        }
    }

    fn command(&self, state: PipelineState) {
        if let Err(e) = self.pipeline.set_state(state) {
            warn!(%state, error = %e, "State change failed");
            self.reporter.report(ClientEvent::Error(e.to_string()));
        }
    }

    /// Hand the effective base time to the pipeline. Info lock held.
    fn apply_base_time(&self, info: &InfoState) -> Option<ClockTime> {
        let snapshot = info.current.as_ref()?;
        let base_time = snapshot.effective_base_time(info.seek_offset);

        debug!(
            base_time = %snapshot.base_time,
            offset = snapshot.base_time_offset,
            seek_offset = %info.seek_offset,
            effective = %base_time,
            "Setting base time"
        );
        self.pipeline.set_base_time(base_time);
        self.reporter.report(ClientEvent::BaseTimeUpdated(base_time));
        Some(base_time)
    }

    /// Handle an event taken off the bus queue.
    pub async fn handle_event(&self, event: PipelineEvent) {
        if self.is_shut_down() {
            return;
        }

        match event {
            PipelineEvent::ClockSyncStatus(synced) => self.on_clock_status(synced).await,
            ref ev if ev.is_play_transition() => self.on_play_transition(),
            PipelineEvent::StateChanged { .. } => {}
            PipelineEvent::SeekCompleted => self.on_seek_completed(),
            PipelineEvent::EndOfStream {
                source: EventSource::Pipeline,
            } => self.on_end_of_stream(),
            PipelineEvent::EndOfStream { .. } => {}
        }
    }

    /// Handle an event on the thread that posted it.
    pub fn handle_sync_event(&self, event: &PipelineEvent) {
        if let PipelineEvent::SeekCompleted = event {
            self.on_seek_completed();
        }
    }

    async fn on_clock_status(&self, synced: bool) {
        if !synced || self.is_synchronized() || self.sync_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let Some(clock) = self.clock() else {
            self.sync_pending.store(false, Ordering::Release);
            return;
        };

        // The gate in `apply` stays closed for the whole wait.
        if !clock.wait_for_sync(self.config.sync_timeout).await {
            let e = ClockError::SyncTimeout(self.config.sync_timeout);
            error!(error = %e, "Could not synchronise clock");
            self.sync_pending.store(false, Ordering::Release);
            self.reporter.report(ClientEvent::ClockSyncFailed);
            self.reporter.report(ClientEvent::Error(e.to_string()));
            return;
        }

        let mut info = self.lock_info();
        self.sync_pending.store(false, Ordering::Release);
        if self.is_shut_down() {
            return;
        }

        self.synchronized.store(true, Ordering::Release);
        info!("Clock synchronised, starting playback");
        self.reporter.report(ClientEvent::ClockSynchronized);
        self.refresh(&mut info);
    }

    fn on_play_transition(&self) {
        if !self.seek.is(SeekPhase::NeedSeek) {
            return;
        }
        let Some(clock) = self.clock() else {
            return;
        };
        let now = clock.now();

        let info = self.lock_info();
        let Some(snapshot) = info.current.clone() else {
            return;
        };

        match self.seek.start(&snapshot, now, self.pipeline.as_ref()) {
            SeekOutcome::Issued(position) => {
                self.reporter.report(ClientEvent::SeekStarted(position));
            }
            SeekOutcome::Skipped(position_ns) => {
                self.reporter.report(ClientEvent::SeekSkipped(position_ns));
            }
            SeekOutcome::Rejected(position) => {
                self.reporter.report(ClientEvent::SeekFailed(position));
            }
        }
    }

    fn on_seek_completed(&self) {
        if self.is_shut_down() || !self.seek.is(SeekPhase::InSeek) {
            return;
        }

        match self.pipeline.query_position() {
            Ok(position) => {
                info!(%position, "Adding seek offset to base time");
                let mut info = self.lock_info();
                info.seek_offset = position;
                self.apply_base_time(&info);
                self.reporter.report(ClientEvent::SeekCompleted(position));
            }
            Err(e) => {
                warn!(error = %e, "Could not query position after seek");
                self.reporter.report(ClientEvent::PositionQueryFailed);
            }
        }

        self.seek.finish();
    }

    fn on_end_of_stream(&self) {
        info!("Got end of stream");
        let _info = self.lock_info();
        if let Err(e) = self.pipeline.set_state(PipelineState::Idle) {
            warn!(error = %e, "Error while stopping pipeline");
        }
        self.reporter.report(ClientEvent::EndOfStream);
    }

    /// Make every handler a no-op, release the clock and stop the pipeline.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        let _info = self.lock_info();
        self.lock_clock().take();
        if let Err(e) = self.pipeline.set_state(PipelineState::Idle) {
            warn!(error = %e, "Error while stopping pipeline");
        }
        debug!("Reconciler shut down");
    }

    /// Connected reference clock, if any.
    pub fn clock(&self) -> Option<Arc<dyn ReferenceClock>> {
        self.lock_clock().clone()
    }

    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.lock_info().current.clone()
    }

    pub fn seek_phase(&self) -> SeekPhase {
        self.seek.phase()
    }

    pub fn seek_offset(&self) -> ClockTime {
        self.lock_info().seek_offset
    }

    pub fn is_live(&self) -> bool {
        self.lock_info().live
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::Acquire)
    }

    /// Base time the pipeline should currently be running against.
    pub fn effective_base_time(&self) -> Option<ClockTime> {
        let info = self.lock_info();
        info.current
            .as_ref()
            .map(|s| s.effective_base_time(info.seek_offset))
    }
}
