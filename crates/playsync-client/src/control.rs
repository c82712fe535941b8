//! Control channel that delivers published snapshots.

use async_trait::async_trait;
use playsync_core::error::{ControlError, Result};
use playsync_core::Snapshot;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Connection to whatever publishes the shared playback state.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ControlClient: Send + Sync {
    /// Connect and start forwarding every received snapshot to `updates`.
    async fn start(
        &mut self,
        address: &str,
        port: u16,
        updates: mpsc::UnboundedSender<Snapshot>,
    ) -> Result<()>;

    /// Disconnect. No snapshot is forwarded afterwards.
    async fn stop(&mut self);
}

/// Publishing side of an in-process control channel.
#[derive(Debug)]
pub struct SnapshotPublisher {
    tx: watch::Sender<Option<Snapshot>>,
}

impl SnapshotPublisher {
    /// Replace the published snapshot. Subscribers only see the latest one.
    pub fn publish(&self, snapshot: Snapshot) {
        self.tx.send_replace(Some(snapshot));
    }

    /// Currently published snapshot.
    pub fn current(&self) -> Option<Snapshot> {
        self.tx.borrow().clone()
    }
}

/// In-process control client fed by a [`SnapshotPublisher`].
///
/// The address and port are informational; there is no transport.
#[derive(Debug)]
pub struct ChannelControlClient {
    rx: watch::Receiver<Option<Snapshot>>,
    task: Option<JoinHandle<()>>,
}

impl ChannelControlClient {
    /// Create a connected client/publisher pair.
    pub fn channel() -> (Self, SnapshotPublisher) {
        let (tx, rx) = watch::channel(None);
        (Self { rx, task: None }, SnapshotPublisher { tx })
    }
}

#[async_trait]
impl ControlClient for ChannelControlClient {
    async fn start(
        &mut self,
        address: &str,
        port: u16,
        updates: mpsc::UnboundedSender<Snapshot>,
    ) -> Result<()> {
        if self.task.is_some() {
            return Err(ControlError::AlreadyStarted.into());
        }
        if self.rx.has_changed().is_err() {
            return Err(ControlError::ConnectFailed("publisher dropped".to_string()).into());
        }

        debug!(address, port, "Subscribing to in-process snapshots");

        let mut rx = self.rx.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                let current = rx.borrow_and_update().clone();
                if let Some(snapshot) = current {
                    if updates.send(snapshot).is_err() {
                        break;
                    }
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }));

        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ChannelControlClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playsync_core::{ClockTime, Error};
    use std::time::Duration;

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Snapshot>) -> Option<Snapshot> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    mod channel_client {
        use super::*;

        #[tokio::test]
        async fn forwards_existing_and_new_snapshots() {
            let (mut client, publisher) = ChannelControlClient::channel();
            publisher.publish(Snapshot::new("file:///a.mp4"));

            let (tx, mut rx) = mpsc::unbounded_channel();
            client.start("127.0.0.1", 9000, tx).await.unwrap();

            assert_eq!(recv(&mut rx).await.unwrap().uri, "file:///a.mp4");

            publisher.publish(Snapshot::new("file:///a.mp4").with_paused(true));
            assert!(recv(&mut rx).await.unwrap().paused);
        }

        #[tokio::test]
        async fn nothing_before_first_publish() {
            let (mut client, publisher) = ChannelControlClient::channel();
            let (tx, mut rx) = mpsc::unbounded_channel();
            client.start("127.0.0.1", 9000, tx).await.unwrap();

            assert!(rx.try_recv().is_err());
            publisher.publish(Snapshot::new("file:///b.mp4").with_latency(ClockTime::from_millis(5)));
            assert_eq!(recv(&mut rx).await.unwrap().latency, ClockTime::from_millis(5));
            assert!(publisher.current().is_some());
        }

        #[tokio::test]
        async fn start_twice_fails() {
            let (mut client, _publisher) = ChannelControlClient::channel();
            let (tx, _rx) = mpsc::unbounded_channel();
            client.start("127.0.0.1", 9000, tx.clone()).await.unwrap();

            let result = client.start("127.0.0.1", 9000, tx).await;
            assert!(matches!(
                result,
                Err(Error::Control(ControlError::AlreadyStarted))
            ));
        }

        #[tokio::test]
        async fn start_without_publisher_fails() {
            let (mut client, publisher) = ChannelControlClient::channel();
            drop(publisher);
            let (tx, _rx) = mpsc::unbounded_channel();

            let result = client.start("127.0.0.1", 9000, tx).await;
            assert!(matches!(
                result,
                Err(Error::Control(ControlError::ConnectFailed(_)))
            ));
        }

        #[tokio::test]
        async fn stop_ends_forwarding() {
            let (mut client, publisher) = ChannelControlClient::channel();
            let (tx, mut rx) = mpsc::unbounded_channel();
            client.start("127.0.0.1", 9000, tx).await.unwrap();

            client.stop().await;
            publisher.publish(Snapshot::new("file:///a.mp4"));

            assert!(recv(&mut rx).await.is_none());
        }
    }

    mod mock {
        use super::*;

        #[tokio::test]
        async fn mock_control_client_connect_failure() {
            let mut mock = MockControlClient::new();
            mock.expect_start().times(1).returning(|_, port, _| {
                let reason = format!("refused on {}", port);
                Box::pin(async move { Err(ControlError::ConnectFailed(reason).into()) })
            });

            let (tx, _rx) = mpsc::unbounded_channel();
            let result = mock.start("10.0.0.1", 9000, tx).await;
            assert!(matches!(
                result,
                Err(Error::Control(ControlError::ConnectFailed(_)))
            ));
        }
    }
}
