//! Main synchronised playback client API.

use crate::control::ControlClient;
use crate::events::{spawn_dispatcher, EventHandler, EventReporter};
use crate::reconcile::{EngineConfig, Reconciler, Transition};
use playsync_core::error::{ControlError, Result};
use playsync_core::Snapshot;
use playsync_pipeline::{BusWatcher, MediaPipeline, PipelineEvent};
use playsync_timing::{ClockConnector, ReferenceClock};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Keeps a local media pipeline in step with a published playback timeline.
pub struct SyncClient {
    pipeline: Arc<dyn MediaPipeline>,
    clock_connector: Arc<dyn ClockConnector>,
    control: Box<dyn ControlClient>,
    event_handler: Option<Arc<dyn EventHandler>>,
    config: EngineConfig,
    /// Present while running; recreated on every start.
    engine: Option<Arc<Reconciler>>,
    tasks: Vec<JoinHandle<()>>,
    /// Clock status forwarder, spawned once the clock is connected.
    clock_forwarder: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncClient {
    pub(crate) fn new(
        pipeline: Arc<dyn MediaPipeline>,
        clock_connector: Arc<dyn ClockConnector>,
        control: Box<dyn ControlClient>,
        event_handler: Option<Arc<dyn EventHandler>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pipeline,
            clock_connector,
            control,
            event_handler,
            config,
            engine: None,
            tasks: Vec::new(),
            clock_forwarder: Arc::new(Mutex::new(None)),
        }
    }

    /// Connect to the control server and start following its snapshots.
    pub async fn start(&mut self, address: &str, port: u16) -> Result<()> {
        if self.engine.is_some() {
            return Err(ControlError::AlreadyStarted.into());
        }

        let reporter = match self.event_handler {
            Some(ref handler) => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.tasks.push(spawn_dispatcher(rx, Arc::clone(handler)));
                EventReporter::new(tx)
            }
            None => EventReporter::disabled(),
        };

        let engine = Arc::new(Reconciler::new(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.clock_connector),
            self.config,
            reporter,
        ));

        // The pipeline only holds a weak handle back to the engine.
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        let sync_engine = Arc::downgrade(&engine);
        let watcher = BusWatcher::new(bus_tx.clone()).with_sync_handler(move |event| {
            if let Some(engine) = sync_engine.upgrade() {
                engine.handle_sync_event(event);
            }
        });
        self.pipeline.attach(watcher);

        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.control.start(address, port, snapshot_tx).await {
            error!(address, port, error = %e, "Could not start control client");
            self.pipeline.detach();
            self.abort_tasks();
            return Err(e);
        }

        self.tasks
            .push(tokio::spawn(run_watch_loop(Arc::clone(&engine), bus_rx)));
        self.tasks.push(tokio::spawn(run_snapshot_loop(
            Arc::clone(&engine),
            snapshot_rx,
            bus_tx,
            Arc::clone(&self.clock_forwarder),
        )));

        info!(address, port, "Sync client started");
        self.engine = Some(engine);
        Ok(())
    }

    /// Stop following snapshots and leave the pipeline idle.
    ///
    /// A seek that completes after this is ignored.
    pub async fn stop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };

        engine.shutdown();
        self.control.stop().await;
        self.pipeline.detach();
        self.abort_tasks();
        info!("Sync client stopped");
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = take_task(&self.clock_forwarder) {
            task.abort();
        }
    }

    /// Pipeline being driven.
    pub fn pipeline(&self) -> &Arc<dyn MediaPipeline> {
        &self.pipeline
    }

    /// Reconciler state for the current run.
    pub fn engine(&self) -> Option<&Arc<Reconciler>> {
        self.engine.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown();
            self.pipeline.detach();
        }
        self.abort_tasks();
    }
}

async fn run_watch_loop(engine: Arc<Reconciler>, mut events: mpsc::UnboundedReceiver<PipelineEvent>) {
    while let Some(event) = events.recv().await {
        engine.handle_event(event).await;
    }
    debug!("Bus watch loop finished");
}

fn take_task(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

async fn run_snapshot_loop(
    engine: Arc<Reconciler>,
    mut snapshots: mpsc::UnboundedReceiver<Snapshot>,
    bus: mpsc::UnboundedSender<PipelineEvent>,
    forwarder: Arc<Mutex<Option<JoinHandle<()>>>>,
) {
    while let Some(snapshot) = snapshots.recv().await {
        match engine.apply(snapshot) {
            Ok(Transition::Initialize) => {
                if let Some(clock) = engine.clock() {
                    let task = tokio::spawn(forward_clock_status(clock.subscribe(), bus.clone()));
                    let previous = forwarder
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .replace(task);
                    if let Some(previous) = previous {
                        previous.abort();
                    }
                }
            }
            Ok(transition) => debug!(?transition, "Snapshot applied"),
            Err(e) => error!(error = %e, "Could not apply snapshot"),
        }
    }
    debug!("Snapshot loop finished");
}

/// Relay clock sync status onto the bus until the bus goes away.
async fn forward_clock_status(mut status: watch::Receiver<bool>, bus: mpsc::UnboundedSender<PipelineEvent>) {
    loop {
        let synced = *status.borrow_and_update();
        if bus.send(PipelineEvent::ClockSyncStatus(synced)).is_err() {
            return;
        }
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = bus.closed() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MockControlClient;
    use crate::{ChannelControlClient, ClientBuilder};
    use playsync_core::{ClockTime, Error};
    use playsync_pipeline::{PipelineState, SimulatedPipeline};
    use playsync_timing::{ManualClock, SharedClockConnector};
    use std::time::Duration;

    async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn start_attaches_and_stop_detaches() {
            let pipeline = Arc::new(SimulatedPipeline::new());
            let (control, _publisher) = ChannelControlClient::channel();
            let mut client = ClientBuilder::new()
                .pipeline(Arc::clone(&pipeline))
                .control_client(control)
                .build()
                .unwrap();

            client.start("127.0.0.1", 9000).await.unwrap();
            assert!(client.is_running());
            assert!(pipeline.is_attached());

            client.stop().await;
            assert!(!client.is_running());
            assert!(!pipeline.is_attached());
            assert_eq!(pipeline.current_state(), PipelineState::Idle);
        }

        #[tokio::test]
        async fn start_twice_fails() {
            let (control, _publisher) = ChannelControlClient::channel();
            let mut client = ClientBuilder::new()
                .pipeline(Arc::new(SimulatedPipeline::new()))
                .control_client(control)
                .build()
                .unwrap();

            client.start("127.0.0.1", 9000).await.unwrap();
            let result = client.start("127.0.0.1", 9000).await;
            assert!(matches!(
                result,
                Err(Error::Control(ControlError::AlreadyStarted))
            ));
        }

        #[tokio::test]
        async fn control_failure_surfaces_from_start() {
            let pipeline = Arc::new(SimulatedPipeline::new());
            let mut control = MockControlClient::new();
            control.expect_start().times(1).returning(|_, _, _| {
                Box::pin(async { Err(ControlError::ConnectFailed("refused".to_string()).into()) })
            });

            let mut client = ClientBuilder::new()
                .pipeline(Arc::clone(&pipeline))
                .control_client(control)
                .build()
                .unwrap();

            let result = client.start("10.0.0.1", 9000).await;
            assert!(matches!(
                result,
                Err(Error::Control(ControlError::ConnectFailed(_)))
            ));
            assert!(!client.is_running());
            assert!(!pipeline.is_attached());
        }

        #[tokio::test]
        async fn stop_aborts_clock_forwarder() {
            let pipeline = Arc::new(SimulatedPipeline::new());
            let clock = Arc::new(ManualClock::new(ClockTime::from_millis(1000)));
            let (control, publisher) = ChannelControlClient::channel();
            let mut client = ClientBuilder::new()
                .pipeline(Arc::clone(&pipeline))
                .clock_connector(SharedClockConnector::new(clock.clone()))
                .control_client(control)
                .build()
                .unwrap();

            client.start("127.0.0.1", 9000).await.unwrap();
            publisher.publish(Snapshot::new("file:///clip.mp4"));
            let slot = Arc::clone(&client.clock_forwarder);
            assert!(wait_until(|| slot.lock().unwrap().is_some()).await);
            let forwarder = slot.lock().unwrap().as_ref().unwrap().abort_handle();
            assert!(!forwarder.is_finished());

            client.stop().await;

            assert!(slot.lock().unwrap().is_none());
            assert!(wait_until(|| forwarder.is_finished()).await);
        }

        #[tokio::test]
        async fn stop_when_not_running_is_noop() {
            let pipeline = Arc::new(SimulatedPipeline::new());
            let (control, _publisher) = ChannelControlClient::channel();
            let mut client = ClientBuilder::new()
                .pipeline(Arc::clone(&pipeline))
                .control_client(control)
                .build()
                .unwrap();

            client.stop().await;
            assert!(pipeline.commands().is_empty());
        }
    }

    mod flow {
        use super::*;

        #[tokio::test]
        async fn follows_published_snapshot() {
            let pipeline = Arc::new(SimulatedPipeline::new());
            let clock = Arc::new(ManualClock::new(ClockTime::from_millis(1100)));
            clock.set_synchronized(true);
            let (control, publisher) = ChannelControlClient::channel();
            let mut client = ClientBuilder::new()
                .pipeline(Arc::clone(&pipeline))
                .clock_connector(SharedClockConnector::new(clock.clone()))
                .control_client(control)
                .build()
                .unwrap();

            client.start("127.0.0.1", 9000).await.unwrap();
            publisher.publish(
                Snapshot::new("file:///clip.mp4").with_base_time(ClockTime::from_millis(1000)),
            );

            assert!(wait_until(|| pipeline.current_state() == PipelineState::Playing).await);
            assert_eq!(pipeline.base_time(), Some(ClockTime::from_millis(1000)));
            assert!(pipeline.seeks().is_empty());

            publisher.publish(
                Snapshot::new("file:///clip.mp4")
                    .with_base_time(ClockTime::from_millis(1000))
                    .with_paused(true),
            );
            assert!(wait_until(|| pipeline.current_state() == PipelineState::Paused).await);

            client.stop().await;
        }
    }

    #[tokio::test]
    async fn forwarder_exits_when_bus_closes() {
        let (status_tx, status_rx) = watch::channel(false);
        let (bus_tx, mut bus_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward_clock_status(status_rx, bus_tx));

        assert_eq!(bus_rx.recv().await, Some(PipelineEvent::ClockSyncStatus(false)));
        status_tx.send_replace(true);
        assert_eq!(bus_rx.recv().await, Some(PipelineEvent::ClockSyncStatus(true)));

        drop(bus_rx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
