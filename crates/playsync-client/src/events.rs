//! Client events and handlers.

use crate::Transition;
use async_trait::async_trait;
use playsync_core::ClockTime;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A snapshot was received and diffed.
    SnapshotApplied(Transition),
    /// Reference clock synchronised; playback may start.
    ClockSynchronized,
    /// Reference clock did not synchronise within the timeout.
    ClockSyncFailed,
    /// Corrective seek requested.
    SeekStarted(ClockTime),
    /// Position was within tolerance; no seek needed. Signed nanoseconds.
    SeekSkipped(i64),
    /// Corrective seek rejected by the pipeline.
    SeekFailed(ClockTime),
    /// Corrective seek landed at this position.
    SeekCompleted(ClockTime),
    /// Position could not be read after a seek.
    PositionQueryFailed,
    /// New base time handed to the pipeline.
    BaseTimeUpdated(ClockTime),
    /// Pipeline ran out of data.
    EndOfStream,
    /// Error occurred.
    Error(String),
}

/// Handler for client events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    async fn on_event(&self, event: ClientEvent);
}

/// Callback-based event handler.
pub struct CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    async fn on_event(&self, event: ClientEvent) {
        (self.callback)(event);
    }
}

/// Non-blocking sink for events raised inside pipeline callbacks.
///
/// Events are queued and handed to the [`EventHandler`] by a dispatcher
/// task, so reporting never waits on the handler.
#[derive(Clone, Default)]
pub struct EventReporter {
    tx: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl EventReporter {
    pub fn new(tx: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Reporter that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, event: ClientEvent) {
        if let Some(ref tx) = self.tx {
            // Receiver gone means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}

/// Forward queued events to `handler` until every reporter is dropped.
pub fn spawn_dispatcher(
    mut rx: mpsc::UnboundedReceiver<ClientEvent>,
    handler: Arc<dyn EventHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            handler.on_event(event).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    mod client_event {
        use super::*;
        use crate::RestartReason;

        #[test]
        fn all_events_constructible() {
            let _ = ClientEvent::SnapshotApplied(Transition::Restart(RestartReason::UriChanged));
            let _ = ClientEvent::ClockSynchronized;
            let _ = ClientEvent::ClockSyncFailed;
            let _ = ClientEvent::SeekStarted(ClockTime::from_millis(300));
            let _ = ClientEvent::SeekSkipped(-5);
            let _ = ClientEvent::SeekFailed(ClockTime::from_millis(300));
            let _ = ClientEvent::SeekCompleted(ClockTime::from_millis(310));
            let _ = ClientEvent::PositionQueryFailed;
            let _ = ClientEvent::BaseTimeUpdated(ClockTime::from_millis(1310));
            let _ = ClientEvent::EndOfStream;
            let _ = ClientEvent::Error("test error".to_string());
        }

        #[test]
        fn events_are_debug() {
            let event = ClientEvent::SnapshotApplied(Transition::Pause);
            let debug_str = format!("{:?}", event);
            assert!(debug_str.contains("SnapshotApplied"));
        }
    }

    mod callback_handler {
        use super::*;

        #[tokio::test]
        async fn invokes_callback() {
            let called = Arc::new(AtomicBool::new(false));
            let called_clone = Arc::clone(&called);

            let handler = CallbackHandler::new(move |_event| {
                called_clone.store(true, Ordering::SeqCst);
            });

            handler.on_event(ClientEvent::EndOfStream).await;
            assert!(called.load(Ordering::SeqCst));
        }
    }

    mod reporter {
        use super::*;

        #[test]
        fn disabled_reporter_drops_events() {
            EventReporter::disabled().report(ClientEvent::EndOfStream);
        }

        #[test]
        fn report_survives_closed_receiver() {
            let (tx, rx) = mpsc::unbounded_channel();
            drop(rx);
            EventReporter::new(tx).report(ClientEvent::EndOfStream);
        }

        #[tokio::test]
        async fn dispatcher_forwards_in_order() {
            let count = Arc::new(AtomicUsize::new(0));
            let count_clone = Arc::clone(&count);
            let handler = Arc::new(CallbackHandler::new(move |event| {
                if let ClientEvent::SeekCompleted(_) = event {
                    assert_eq!(count_clone.load(Ordering::SeqCst), 1);
                }
                count_clone.fetch_add(1, Ordering::SeqCst);
            }));

            let (tx, rx) = mpsc::unbounded_channel();
            let task = spawn_dispatcher(rx, handler);
            let reporter = EventReporter::new(tx);
            reporter.report(ClientEvent::SeekStarted(ClockTime::from_millis(300)));
            reporter.report(ClientEvent::SeekCompleted(ClockTime::from_millis(310)));
            drop(reporter);

            task.await.unwrap();
            assert_eq!(count.load(Ordering::SeqCst), 2);
        }
    }
}
