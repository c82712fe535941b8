//! Client builder for configuration.

use crate::{ControlClient, EngineConfig, EventHandler, Result, SyncClient};
use playsync_core::error::{ControlError, PipelineError};
use playsync_pipeline::MediaPipeline;
use playsync_timing::{ClockConnector, SystemClockConnector};
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring SyncClient.
pub struct ClientBuilder {
    pipeline: Option<Arc<dyn MediaPipeline>>,
    clock_connector: Arc<dyn ClockConnector>,
    control_client: Option<Box<dyn ControlClient>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    config: EngineConfig,
}

impl ClientBuilder {
    /// Create new builder with defaults.
    pub fn new() -> Self {
        Self {
            pipeline: None,
            clock_connector: Arc::new(SystemClockConnector),
            control_client: None,
            event_handler: None,
            config: EngineConfig::default(),
        }
    }

    /// Pipeline to keep in sync. Required.
    pub fn pipeline<P: MediaPipeline + 'static>(mut self, pipeline: Arc<P>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// How to reach the reference clock named in snapshots.
    ///
    /// Defaults to the local system clock.
    pub fn clock_connector(mut self, connector: impl ClockConnector + 'static) -> Self {
        self.clock_connector = Arc::new(connector);
        self
    }

    /// Where snapshots come from. Required.
    pub fn control_client(mut self, client: impl ControlClient + 'static) -> Self {
        self.control_client = Some(Box::new(client));
        self
    }

    /// Set event handler.
    pub fn event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.event_handler = Some(Arc::new(handler));
        self
    }

    /// Largest lag at play time that is left uncorrected. Default is 200ms.
    pub fn seek_tolerance(mut self, tolerance: Duration) -> Self {
        self.config.seek_tolerance = tolerance;
        self
    }

    /// How long to wait for clock sync before giving up. Default is 10s.
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.config.sync_timeout = timeout;
        self
    }

    /// Replace all tunables at once.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<SyncClient> {
        let pipeline = self
            .pipeline
            .ok_or_else(|| PipelineError::Construction("no pipeline configured".to_string()))?;
        let control = self.control_client.ok_or(ControlError::NotConfigured)?;

        Ok(SyncClient::new(
            pipeline,
            self.clock_connector,
            control,
            self.event_handler,
            self.config,
        ))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelControlClient;
    use playsync_core::Error;
    use playsync_pipeline::SimulatedPipeline;

    mod builder {
        use super::*;

        #[test]
        fn new_has_defaults() {
            let builder = ClientBuilder::new();
            assert_eq!(builder.config, EngineConfig::default());
            assert_eq!(builder.config.seek_tolerance, Duration::from_millis(200));
            assert_eq!(builder.config.sync_timeout, Duration::from_secs(10));
            assert!(builder.pipeline.is_none());
            assert!(builder.control_client.is_none());
        }

        #[test]
        fn seek_tolerance_sets_value() {
            let builder = ClientBuilder::new().seek_tolerance(Duration::from_millis(50));
            assert_eq!(builder.config.seek_tolerance, Duration::from_millis(50));
        }

        #[test]
        fn sync_timeout_sets_value() {
            let builder = ClientBuilder::new().sync_timeout(Duration::from_secs(2));
            assert_eq!(builder.config.sync_timeout, Duration::from_secs(2));
        }

        #[test]
        fn build_without_pipeline_fails() {
            let (control, _publisher) = ChannelControlClient::channel();
            let result = ClientBuilder::new().control_client(control).build();
            assert!(matches!(
                result,
                Err(Error::Pipeline(PipelineError::Construction(_)))
            ));
        }

        #[test]
        fn build_without_control_client_fails() {
            let result = ClientBuilder::new()
                .pipeline(Arc::new(SimulatedPipeline::new()))
                .build();
            assert!(matches!(
                result,
                Err(Error::Control(ControlError::NotConfigured))
            ));
        }

        #[test]
        fn build_creates_client() {
            let (control, _publisher) = ChannelControlClient::channel();
            let client = ClientBuilder::new()
                .pipeline(Arc::new(SimulatedPipeline::new()))
                .control_client(control)
                .build()
                .unwrap();
            assert!(!client.is_running());
        }
    }
}
