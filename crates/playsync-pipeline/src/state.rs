//! Pipeline states, state-change results and seek flags.

use std::fmt;
use std::ops::BitOr;

/// Target states a pipeline can be commanded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Torn down, no resources held.
    Idle,
    /// Prerolled and holding the current position.
    Paused,
    /// Rendering against the clock.
    Playing,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "IDLE",
            PipelineState::Paused => "PAUSED",
            PipelineState::Playing => "PLAYING",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful outcome of a state command. Failure is reported as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Reached the target state.
    Success,
    /// Will reach the target state asynchronously.
    Async,
    /// Reached paused without prerolling: the source is live.
    NoPreroll,
}

/// Seek behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeekFlags(pub u32);

impl SeekFlags {
    pub const NONE: SeekFlags = SeekFlags(0);
    /// Discard queued data so the seek takes effect immediately.
    pub const FLUSH: SeekFlags = SeekFlags(1 << 0);
    /// Land on a decodable key unit.
    pub const KEY_UNIT: SeekFlags = SeekFlags(1 << 1);
    /// With `KEY_UNIT`, pick the key unit at or after the target.
    pub const SNAP_AFTER: SeekFlags = SeekFlags(1 << 2);

    /// Flags used for the catch-up seek after starting playback.
    pub const CORRECTIVE: SeekFlags =
        SeekFlags(Self::FLUSH.0 | Self::KEY_UNIT.0 | Self::SNAP_AFTER.0);

    pub fn contains(&self, other: SeekFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SeekFlags {
    type Output = SeekFlags;

    fn bitor(self, rhs: SeekFlags) -> SeekFlags {
        SeekFlags(self.0 | rhs.0)
    }
}
