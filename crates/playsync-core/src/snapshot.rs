//! Shared playback state as published by the sync server.

use crate::time::ClockTime;
use serde::{Deserialize, Serialize};

/// One published description of what every client should be playing.
///
/// Snapshots are never edited in place: each update from the server is a
/// whole new value that replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Media locator to play.
    pub uri: String,
    /// Reference clock time at which stream position zero is rendered.
    pub base_time: ClockTime,
    /// Extra signed offset added to `base_time`, in nanoseconds.
    pub base_time_offset: i64,
    /// Target pipeline latency.
    pub latency: ClockTime,
    /// Playback torn down. Takes precedence over `paused`.
    pub stopped: bool,
    /// Playback held at its current position.
    pub paused: bool,
    /// Reference clock host.
    pub clock_address: String,
    /// Reference clock port.
    pub clock_port: u16,
}

impl Snapshot {
    /// Create a playing snapshot for `uri` with everything else zeroed.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            base_time: ClockTime::ZERO,
            base_time_offset: 0,
            latency: ClockTime::ZERO,
            stopped: false,
            paused: false,
            clock_address: String::new(),
            clock_port: 0,
        }
    }

    pub fn with_base_time(mut self, base_time: ClockTime) -> Self {
        self.base_time = base_time;
        self
    }

    pub fn with_base_time_offset(mut self, offset_ns: i64) -> Self {
        self.base_time_offset = offset_ns;
        self
    }

    pub fn with_latency(mut self, latency: ClockTime) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_stopped(mut self, stopped: bool) -> Self {
        self.stopped = stopped;
        self
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn with_clock(mut self, address: impl Into<String>, port: u16) -> Self {
        self.clock_address = address.into();
        self.clock_port = port;
        self
    }

    /// Whether the pipeline should be rendering right now.
    pub fn is_playing(&self) -> bool {
        !self.stopped && !self.paused
    }

    /// Base time handed to the pipeline once `seek_offset` is folded in.
    ///
    /// `base_time + base_time_offset + seek_offset`, clamped at zero.
    pub fn effective_base_time(&self, seek_offset: ClockTime) -> ClockTime {
        self.base_time
            .offset_by(self.base_time_offset)
            .saturating_add(seek_offset)
    }

    /// Stream position that should be rendering at reference time `now`.
    ///
    /// Negative while the timeline origin is still in the future.
    pub fn position_at(&self, now: ClockTime) -> i64 {
        now.signed_diff(self.base_time)
            .saturating_sub(self.base_time_offset)
    }
}
