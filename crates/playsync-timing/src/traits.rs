//! Traits for reference clock abstraction.

use async_trait::async_trait;
use playsync_core::error::Result;
use playsync_core::ClockTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Shared time authority that every client renders against.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ReferenceClock: Send + Sync {
    /// Current reference time. Never goes backwards.
    fn now(&self) -> ClockTime;

    /// Check if synchronised with the remote reference.
    fn is_synchronized(&self) -> bool;

    /// Watch synchronisation status changes.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Wait until synchronised, giving up after `timeout`.
    async fn wait_for_sync(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe();
        let wait = async move {
            loop {
                if *rx.borrow_and_update() {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }
}

/// Opens a reference clock for a server-published clock endpoint.
#[cfg_attr(test, mockall::automock)]
pub trait ClockConnector: Send + Sync {
    /// Connect to the clock at `address:port`.
    ///
    /// Returns immediately; synchronisation progress is reported through
    /// [`ReferenceClock::subscribe`].
    fn connect(&self, address: &str, port: u16) -> Result<Arc<dyn ReferenceClock>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_reference_clock() {
        let mut mock = MockReferenceClock::new();

        mock.expect_now()
            .times(1)
            .returning(|| ClockTime::from_millis(1300));

        mock.expect_is_synchronized()
            .times(1)
            .returning(|| true);

        mock.expect_wait_for_sync()
            .times(1)
            .with(mockall::predicate::eq(Duration::from_secs(10)))
            .returning(|_| Box::pin(async { true }));

        assert_eq!(mock.now(), ClockTime::from_millis(1300));
        assert!(mock.is_synchronized());
        assert!(mock.wait_for_sync(Duration::from_secs(10)).await);
    }

    #[test]
    fn mock_connector_reports_failure() {
        let mut mock = MockClockConnector::new();

        mock.expect_connect()
            .times(1)
            .returning(|address, port| {
                assert_eq!(address, "10.0.0.1");
                Err(playsync_core::ClockError::Connect {
                    address: address.to_string(),
                    port,
                    reason: "unreachable".to_string(),
                }
                .into())
            });

        let result = mock.connect("10.0.0.1", 9999);
        assert!(result.is_err());
    }
}
