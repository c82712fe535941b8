//! Corrective seek after a play transition.
//!
//! Starting playback takes time: by the time the pipeline goes from
//! paused to playing, the shared timeline has moved on. When the pipeline
//! is behind by more than the tolerance we seek forward, and once the seek
//! has landed the actual landing position is folded into the base time.
//!
//! The phase lives in an atomic so it can be checked from any delivery
//! context without taking the reconciler's info lock.

use playsync_core::{ClockTime, Snapshot};
use playsync_pipeline::{MediaPipeline, SeekFlags};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Pipeline positions within this distance of the target are left alone.
pub const DEFAULT_SEEK_TOLERANCE: Duration = Duration::from_millis(200);

/// Progress through the corrective seek for one play cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SeekPhase {
    /// Waiting for the paused to playing transition.
    NeedSeek = 0,
    /// Seek requested, waiting for it to complete.
    InSeek = 1,
    /// Nothing more to do until the next restart.
    DoneSeek = 2,
}

impl SeekPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SeekPhase::NeedSeek,
            1 => SeekPhase::InSeek,
            _ => SeekPhase::DoneSeek,
        }
    }
}

/// What to do at the play transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDecision {
    /// Seek to this stream position.
    Seek(ClockTime),
    /// Close enough; signed position in nanoseconds.
    WithinTolerance(i64),
}

/// Result of handling the play transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Issued(ClockTime),
    Skipped(i64),
    Rejected(ClockTime),
}

/// Seek sub-state-machine.
#[derive(Debug)]
pub struct SeekCoordinator {
    phase: AtomicU8,
    tolerance: Duration,
}

impl SeekCoordinator {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            phase: AtomicU8::new(SeekPhase::NeedSeek as u8),
            tolerance,
        }
    }

    pub fn phase(&self) -> SeekPhase {
        SeekPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is(&self, phase: SeekPhase) -> bool {
        self.phase() == phase
    }

    fn set(&self, phase: SeekPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Arm for a freshly started pipeline. Live sources never seek.
    pub fn reset(&self, live: bool) {
        self.set(if live {
            SeekPhase::DoneSeek
        } else {
            SeekPhase::NeedSeek
        });
    }

    /// Seek iff the position is strictly past the tolerance.
    pub fn decide(&self, position_ns: i64) -> SeekDecision {
        let tolerance_ns = self.tolerance.as_nanos().min(i64::MAX as u128) as i64;
        if position_ns > tolerance_ns {
            SeekDecision::Seek(ClockTime::from_nanos(position_ns as u64))
        } else {
            SeekDecision::WithinTolerance(position_ns)
        }
    }

    /// Handle the paused to playing transition at reference time `now`.
    ///
    /// The caller has already checked the phase is `NeedSeek`.
    pub fn start(
        &self,
        snapshot: &Snapshot,
        now: ClockTime,
        pipeline: &dyn MediaPipeline,
    ) -> SeekOutcome {
        self.set(SeekPhase::InSeek);

        match self.decide(snapshot.position_at(now)) {
            SeekDecision::Seek(position) => {
                info!(%position, "Seeking");
                match pipeline.seek(position, SeekFlags::CORRECTIVE) {
                    Ok(()) => SeekOutcome::Issued(position),
                    Err(e) => {
                        warn!(%position, error = %e, "Could not perform seek");
                        self.set(SeekPhase::DoneSeek);
                        SeekOutcome::Rejected(position)
                    }
                }
            }
            SeekDecision::WithinTolerance(position_ns) => {
                // Base time is only corrected after a real seek
                info!(position_ns, "Not seeking as we're within the threshold");
                self.set(SeekPhase::DoneSeek);
                SeekOutcome::Skipped(position_ns)
            }
        }
    }

    /// Close the cycle once the seek completion has been handled.
    pub fn finish(&self) {
        self.set(SeekPhase::DoneSeek);
    }
}

impl Default for SeekCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_SEEK_TOLERANCE)
    }
}
