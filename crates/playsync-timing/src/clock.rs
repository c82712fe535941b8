//! Reference clock implementations.

use crate::{ClockConnector, ReferenceClock};
use playsync_core::error::Result;
use playsync_core::ClockTime;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, info};

/// Clock offset between local and remote.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockOffset {
    /// Offset in nanoseconds (positive = remote ahead).
    pub offset_ns: i64,
    /// Estimated error in nanoseconds.
    pub error_ns: u64,
    /// Round-trip time in nanoseconds.
    pub rtt_ns: u64,
}

/// Current wall-clock time in nanoseconds since Unix epoch.
pub fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

/// Clamp `candidate` so a clock never reports a time before `last`.
fn monotonic(last: &AtomicU64, candidate: u64) -> ClockTime {
    let prev = last.fetch_max(candidate, Ordering::AcqRel);
    ClockTime::from_nanos(prev.max(candidate))
}

/// Local wall clock, treated as already synchronised.
///
/// Suitable when every client runs on hosts whose system clocks are
/// disciplined externally (or all on one host).
pub struct SystemClock {
    last_ns: AtomicU64,
    status: watch::Sender<bool>,
}

impl SystemClock {
    pub fn new() -> Self {
        let (status, _) = watch::channel(true);
        Self {
            last_ns: AtomicU64::new(0),
            status,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceClock for SystemClock {
    fn now(&self) -> ClockTime {
        monotonic(&self.last_ns, wall_clock_ns())
    }

    fn is_synchronized(&self) -> bool {
        true
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }
}

/// Connector handing out a fresh [`SystemClock`] for any endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClockConnector;

impl ClockConnector for SystemClockConnector {
    fn connect(&self, address: &str, port: u16) -> Result<Arc<dyn ReferenceClock>> {
        debug!(address, port, "Using local system clock as reference");
        Ok(Arc::new(SystemClock::new()))
    }
}

/// Local wall clock corrected by offsets from an external sync protocol.
///
/// The protocol itself lives elsewhere; it feeds measurements in through
/// [`SlavedClock::update`]. The clock reports synchronised from the first
/// measurement whose error is within `max_error`.
pub struct SlavedClock {
    offset_ns: AtomicI64,
    max_error: Duration,
    last_ns: AtomicU64,
    status: watch::Sender<bool>,
}

impl SlavedClock {
    pub fn new(max_error: Duration) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            offset_ns: AtomicI64::new(0),
            max_error,
            last_ns: AtomicU64::new(0),
            status,
        }
    }

    /// Apply a new offset measurement.
    pub fn update(&self, offset: ClockOffset) {
        self.offset_ns.store(offset.offset_ns, Ordering::Release);

        if !*self.status.borrow() && offset.error_ns <= self.max_error.as_nanos() as u64 {
            info!(
                offset_ns = offset.offset_ns,
                error_ns = offset.error_ns,
                "Reference clock synchronised"
            );
            self.status.send_replace(true);
        }
    }

    /// Follow offsets published on a watch channel until it closes.
    pub fn follow(
        clock: Arc<Self>,
        mut offsets: watch::Receiver<ClockOffset>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while offsets.changed().await.is_ok() {
                let offset = *offsets.borrow_and_update();
                clock.update(offset);
            }
            debug!("Clock offset feed closed");
        })
    }

    /// Current offset applied to local time.
    pub fn offset_ns(&self) -> i64 {
        self.offset_ns.load(Ordering::Acquire)
    }
}

impl ReferenceClock for SlavedClock {
    fn now(&self) -> ClockTime {
        let local = ClockTime::from_nanos(wall_clock_ns());
        monotonic(&self.last_ns, local.offset_by(self.offset_ns()).nanos())
    }

    fn is_synchronized(&self) -> bool {
        *self.status.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }
}

/// Clock driven entirely by hand, for simulations and tests.
pub struct ManualClock {
    now_ns: AtomicU64,
    status: watch::Sender<bool>,
}

impl ManualClock {
    /// Create an unsynchronised clock reading `start`.
    pub fn new(start: ClockTime) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            now_ns: AtomicU64::new(start.nanos()),
            status,
        }
    }

    /// Set the current time. Earlier times than the current one are ignored.
    pub fn set_time(&self, t: ClockTime) {
        self.now_ns.fetch_max(t.nanos(), Ordering::AcqRel);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ns
            .fetch_add(ClockTime::from(by).nanos(), Ordering::AcqRel);
    }

    pub fn set_synchronized(&self, synced: bool) {
        self.status.send_replace(synced);
    }
}

impl ReferenceClock for ManualClock {
    fn now(&self) -> ClockTime {
        ClockTime::from_nanos(self.now_ns.load(Ordering::Acquire))
    }

    fn is_synchronized(&self) -> bool {
        *self.status.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }
}

/// Connector that always hands back one pre-built clock.
///
/// For clocks whose sync protocol is wired up by the host application.
#[derive(Clone)]
pub struct SharedClockConnector {
    clock: Arc<dyn ReferenceClock>,
}

impl SharedClockConnector {
    pub fn new(clock: Arc<dyn ReferenceClock>) -> Self {
        Self { clock }
    }
}

impl ClockConnector for SharedClockConnector {
    fn connect(&self, address: &str, port: u16) -> Result<Arc<dyn ReferenceClock>> {
        debug!(address, port, "Handing out shared reference clock");
        Ok(Arc::clone(&self.clock))
    }
}
