//! Pipeline status events and the watcher they are posted to.

use crate::PipelineState;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Where a status event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    /// The top-level pipeline.
    Pipeline,
    /// A named element inside the pipeline.
    Element(String),
}

/// Status events emitted by a media pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// An object finished a state transition.
    StateChanged {
        source: EventSource,
        old: PipelineState,
        new: PipelineState,
    },
    /// A previously requested seek has fully completed.
    SeekCompleted,
    /// No more data to render.
    EndOfStream { source: EventSource },
    /// Reference clock synchronisation status.
    ClockSyncStatus(bool),
}

impl PipelineEvent {
    /// The pipeline itself just went from paused to playing.
    pub fn is_play_transition(&self) -> bool {
        matches!(
            self,
            PipelineEvent::StateChanged {
                source: EventSource::Pipeline,
                old: PipelineState::Paused,
                new: PipelineState::Playing,
            }
        )
    }

    /// Delivered to the sync handler on the posting thread as well as
    /// through the queue.
    pub fn is_sync(&self) -> bool {
        matches!(self, PipelineEvent::SeekCompleted)
    }
}

/// Handler run on the posting thread for sync events.
pub type SyncHandler = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Where a pipeline posts its status events.
///
/// Every event is queued for the watch loop. Sync events (seek
/// completion) are additionally handed to the sync handler first, from
/// the thread that posted them, before they are queued.
#[derive(Clone)]
pub struct BusWatcher {
    queue: mpsc::UnboundedSender<PipelineEvent>,
    sync_handler: Option<SyncHandler>,
}

impl BusWatcher {
    pub fn new(queue: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self {
            queue,
            sync_handler: None,
        }
    }

    /// Create a watcher together with the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn with_sync_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.sync_handler = Some(Arc::new(handler));
        self
    }

    /// Post an event. Returns `false` once the watch loop has gone away.
    pub fn post(&self, event: PipelineEvent) -> bool {
        if event.is_sync() {
            if let Some(ref handler) = self.sync_handler {
                handler(&event);
            }
        }
        self.queue.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl fmt::Debug for BusWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusWatcher")
            .field("closed", &self.queue.is_closed())
            .field("sync_handler", &self.sync_handler.is_some())
            .finish()
    }
}
