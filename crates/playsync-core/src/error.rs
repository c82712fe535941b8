//! Error types for the sync client.

use crate::time::ClockTime;
use std::time::Duration;
use thiserror::Error;

/// Primary error type for all playsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("Control channel error: {0}")]
    Control(#[from] ControlError),
}

/// Errors raised by the media pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline refused state change to {target}")]
    StateChange { target: &'static str },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Seek to {position} rejected")]
    SeekRejected { position: ClockTime },

    #[error("Position query failed")]
    PositionUnavailable,

    #[error("Could not construct pipeline: {0}")]
    Construction(String),
}

/// Errors from the reference clock.
#[derive(Error, Debug)]
pub enum ClockError {
    #[error("Clock not synchronised within {0:?}")]
    SyncTimeout(Duration),

    #[error("Could not connect to clock at {address}:{port}: {reason}")]
    Connect {
        address: String,
        port: u16,
        reason: String,
    },
}

/// Errors from the control channel carrying snapshots.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("No control client configured")]
    NotConfigured,

    #[error("Control client already started")]
    AlreadyStarted,

    #[error("Could not connect to control server: {0}")]
    ConnectFailed(String),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = Error::Pipeline(PipelineError::StateChange { target: "PAUSED" });
        assert!(err.to_string().contains("Pipeline error"));
        assert!(err.to_string().contains("PAUSED"));

        let err = Error::Pipeline(PipelineError::SeekRejected {
            position: ClockTime::from_millis(300),
        });
        assert!(err.to_string().contains("0:00:00.300000000"));

        let err = Error::Clock(ClockError::SyncTimeout(Duration::from_secs(10)));
        assert!(err.to_string().contains("not synchronised"));

        let err = Error::Clock(ClockError::Connect {
            address: "10.0.0.1".to_string(),
            port: 9999,
            reason: "refused".to_string(),
        });
        assert!(err.to_string().contains("10.0.0.1:9999"));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error as StdError;

        let err = Error::Clock(ClockError::SyncTimeout(Duration::from_millis(50)));
        assert!(err.source().is_some());

        let err = Error::Control(ControlError::AlreadyStarted);
        assert!(err.source().is_some());
    }

    #[test]
    fn error_conversions() {
        let err: Error = PipelineError::PositionUnavailable.into();
        assert!(matches!(err, Error::Pipeline(_)));

        let err: Error = ClockError::SyncTimeout(Duration::from_secs(10)).into();
        assert!(matches!(err, Error::Clock(_)));

        let err: Error = ControlError::NotConfigured.into();
        assert!(matches!(err, Error::Control(_)));
    }
}
