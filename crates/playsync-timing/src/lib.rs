//! # playsync-timing
//!
//! Reference clock abstraction for synchronised playback.
//!
//! This crate provides:
//! - The [`ReferenceClock`] capability consumed by the sync client
//! - Connectors that open a clock for a published clock endpoint
//! - A local system clock, an offset-corrected slaved clock and a
//!   manually driven clock
//!
//! The network time-sync protocol itself is not implemented here; a
//! [`SlavedClock`] is fed offsets by whatever protocol the host runs.

mod clock;
mod traits;

pub use clock::{
    wall_clock_ns, ClockOffset, ManualClock, SharedClockConnector, SlavedClock, SystemClock,
    SystemClockConnector,
};
pub use traits::{ClockConnector, ReferenceClock};
